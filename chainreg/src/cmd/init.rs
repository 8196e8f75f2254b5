//! `chainreg init`: write a default TOML configuration file.

use std::fs;
use std::path::Path;

use chainreg::Error;
use chainreg::config::generate_default_config;

/// Writes the default configuration template to `output`.
///
/// Refuses to overwrite an existing file unless `force` is `true`.
///
/// # Errors
///
/// Returns a configuration error if the file exists without `--force`, and a
/// resource error if writing fails.
#[allow(clippy::print_stderr)]
pub fn run(output: &Path, force: bool) -> Result<(), Error> {
    if output.exists() && !force {
        return Err(Error::config(format!(
            "'{}' already exists, use --force to overwrite",
            output.display()
        )));
    }

    fs::write(output, generate_default_config())
        .map_err(|e| Error::resource_with(format!("failed to write '{}'", output.display()), e))?;

    eprintln!("Config file written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use chainreg::ErrorKind;

    use super::*;

    #[test]
    fn writes_the_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        run(&path, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), generate_default_config());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "# mine").unwrap();

        assert_eq!(run(&path, false).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine");

        run(&path, true).unwrap();
        assert_ne!(fs::read_to_string(&path).unwrap(), "# mine");
    }
}
