use std::path::PathBuf;

use crate::types::LogLevel;

/// Application configuration resolved from the command line and environment.
pub struct Config {
    pub api_key: Option<String>,
    pub root_folder_id: Option<String>,
    pub api_base_url: String,
    pub cache_db: PathBuf,
    pub page_size: Option<u32>,
    pub log_level: LogLevel,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("root_folder_id", &self.root_folder_id)
            .field("api_base_url", &self.api_base_url)
            .field("cache_db", &self.cache_db)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Remote settings that must all be present to reach Drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig<'a> {
    pub api_key: &'a str,
    pub root_folder_id: &'a str,
    pub api_base_url: &'a str,
    pub page_size: Option<u32>,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_cli(cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        if cli.cache_db.trim().is_empty() {
            anyhow::bail!("--cache-db must not be empty");
        }
        if cli.drive.page_size == Some(0) {
            anyhow::bail!("--page-size must be at least 1");
        }

        Ok(Self {
            api_key: non_empty(cli.drive.api_key.clone()),
            root_folder_id: non_empty(cli.drive.root_folder_id.clone()),
            api_base_url: cli.drive.api_base_url.clone(),
            cache_db: expand_tilde(&cli.cache_db),
            page_size: cli.drive.page_size,
            log_level: cli.log_level,
        })
    }

    /// Remote settings, or an error naming the missing one.
    pub fn remote(&self) -> anyhow::Result<RemoteConfig<'_>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No Drive API key. Pass --api-key or set DRIVE_API_KEY.")
        })?;
        let root_folder_id = self.root_folder_id.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No gallery root folder. Pass --root-folder-id or set DRIVE_ROOT_FOLDER_ID."
            )
        })?;
        Ok(RemoteConfig {
            api_key,
            root_folder_id,
            api_base_url: &self.api_base_url,
            page_size: self.page_size,
        })
    }
}
