use lazy_static::lazy_static;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_PROMPT: &str = "mysh$ ";
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
pub const MAX_JOBS: usize = 16;

#[derive(Clone, Debug)]
pub struct Config {
    pub prompt: String,
    pub history_file: Option<PathBuf>,
    pub max_history_size: usize,
    pub max_jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: DEFAULT_PROMPT.to_string(),
            history_file: dirs::home_dir().map(|home| home.join(".mysh_history")),
            max_history_size: 1000,
            max_jobs: MAX_JOBS,
        }
    }
}

impl Config {
    /// Defaults overridden by `MYSH_*` variables from the process environment
    /// (which includes anything loaded from `.env`).
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(prompt) = env::var("MYSH_PROMPT") {
            config.prompt = prompt;
        }
        if let Ok(history) = env::var("MYSH_HISTORY") {
            config.history_file = if history.is_empty() {
                None
            } else {
                Some(PathBuf::from(history))
            };
        }
        if let Some(size) = env::var("MYSH_HISTORY_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config.max_history_size = size;
        }

        config
    }
}

lazy_static! {
    pub static ref CONFIG: Arc<Config> = Arc::new(Config::from_env());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.prompt, "mysh$ ");
        assert_eq!(config.max_jobs, 16);
    }
}
