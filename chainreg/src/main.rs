//! Chain backend registry CLI.
//!
//! ```sh
//! chainreg init               # Generate default config.toml
//! chainreg probe              # Check every active chain's backend once
//! chainreg probe --watch 30   # Keep checking until interrupted
//! ```

mod cmd;
mod signal;
mod telemetry;

use clap::Parser;
use cmd::{Cli, Commands};
use dotenvy::dotenv;
use telemetry::Telemetry;

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() {
    // Credentials in the config may reference variables from .env.
    dotenv().ok();

    let cli = Cli::parse();
    Telemetry::new().with_log_level(cli.log_level).register();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Init { output, force } => cmd::init::run(&output, force).map_err(Into::into),
        Commands::Probe { config, watch } => cmd::probe::run(&config, watch).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
