use crate::config::{datadir_path, Config, ConfigError};

use std::{fs, os::unix::fs::DirBuilderExt, path::PathBuf, str::FromStr};

/// Everything we need to know once the configuration was parsed
pub struct LedgerState {
    pub data_dir: PathBuf,
    pub log_level: log::LevelFilter,
    pub log_to_file: bool,
    pub postgres_config: tokio_postgres::Config,
}

fn create_datadir(datadir_path: &PathBuf) -> Result<(), std::io::Error> {
    let mut builder = fs::DirBuilder::new();
    builder.mode(0o700).recursive(true).create(datadir_path)
}

impl LedgerState {
    pub fn from_config(config: Config) -> Result<LedgerState, Box<dyn std::error::Error>> {
        let log_level = match config.log_level {
            Some(ref level) => log::LevelFilter::from_str(level)
                .map_err(|e| ConfigError(format!("Invalid log level '{}': {}", level, e)))?,
            None => log::LevelFilter::Info,
        };

        let mut data_dir = match config.data_dir {
            Some(data_dir) => data_dir,
            None => datadir_path()?,
        };
        if !data_dir.as_path().exists() {
            if let Err(e) = create_datadir(&data_dir) {
                return Err(Box::from(ConfigError(format!(
                    "Could not create data dir '{:?}': {}.",
                    data_dir, e
                ))));
            }
        }
        data_dir = fs::canonicalize(data_dir)?;

        let postgres_config = tokio_postgres::Config::from_str(&config.postgres_uri)
            .map_err(|e| ConfigError(format!("Invalid 'postgres_uri': {}", e)))?;

        Ok(LedgerState {
            data_dir,
            log_level,
            log_to_file: config.log_to_file.unwrap_or(false),
            postgres_config,
        })
    }

    fn file_from_datadir(&self, file_name: &str) -> PathBuf {
        let mut path = self.data_dir.clone();
        path.push(file_name);
        path
    }

    pub fn log_file(&self) -> PathBuf {
        self.file_from_datadir("log")
    }
}
