use super::Config;
use std::path::PathBuf;

impl Config {
    /// Apply `JOBBOX_DATABASE`, `JOBBOX_LOG` and `JOBBOX_TIMEOUT_SECS`.
    /// Empty or unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("JOBBOX_DATABASE")
            && !path.is_empty()
        {
            self.database_path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("JOBBOX_LOG")
            && !level.is_empty()
        {
            self.log_level = level;
        }

        if let Ok(raw) = std::env::var("JOBBOX_TIMEOUT_SECS")
            && let Ok(secs) = raw.parse::<u64>()
            && secs > 0
        {
            self.default_timeout_secs = secs;
        }
    }
}
