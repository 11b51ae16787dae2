//! Engine configuration lookup for the CLI

use std::path::{Path, PathBuf};

use eyre::Result;
use rewind_engine::EngineConfig;
use tracing::debug;

/// Default configuration file, `~/.rewind.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
    Ok(home.join(".rewind.toml"))
}

/// Load the engine configuration.
///
/// An explicit path must exist. Without one, `~/.rewind.toml` is used when
/// present and the built-in defaults otherwise.
pub fn load_engine_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::load(path);
    }

    match default_config_path() {
        Ok(path) if path.exists() => EngineConfig::load(&path),
        Ok(path) => {
            debug!("No config file at {}, using defaults", path.display());
            Ok(EngineConfig::default())
        }
        Err(e) => {
            debug!("Using default config: {e}");
            Ok(EngineConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_config_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[playback]\nspeed_ms = 42").unwrap();
        let config = load_engine_config(Some(file.path())).unwrap();
        assert_eq!(config.playback.speed_ms, 42);
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        assert!(load_engine_config(Some(Path::new("/no/such/rewind.toml"))).is_err());
    }
}
