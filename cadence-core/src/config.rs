use std::{
    env::{self, VarError},
    fs::File,
    path::PathBuf,
    sync::Arc,
};

use platform_dirs::AppDirs;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    oauth::DEFAULT_SCOPES,
    store::{PreferenceStore, LAST_DEVICE_KEY},
};

const APP_NAME: &str = "Cadence";
const CONFIG_FILENAME: &str = "config.json";
const STORE_FILENAME: &str = "store.json";
const CLIENT_ID_ENV_VAR: &str = "CADENCE_CLIENT_ID";
const PROXY_ENV_VAR: &str = "HTTPS_PROXY";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub scopes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    fn app_dirs() -> Option<AppDirs> {
        const USE_XDG_ON_MACOS: bool = false;

        AppDirs::new(Some(APP_NAME), USE_XDG_ON_MACOS)
    }

    pub fn config_dir() -> Option<PathBuf> {
        Self::app_dirs().map(|dirs| dirs.config_dir)
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(CONFIG_FILENAME))
    }

    /// Location of the persistent key/value store next to the config file.
    pub fn store_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(STORE_FILENAME))
    }

    /// Load the config file, if any, and apply environment overrides.
    pub fn load() -> Result<Config, Error> {
        let mut config = match Self::config_path() {
            Some(path) => match File::open(&path) {
                Ok(file) => {
                    log::info!("loading config: {:?}", &path);
                    serde_json::from_reader(file)?
                }
                Err(_) => Config::default(),
            },
            None => Config::default(),
        };
        if let Ok(client_id) = env::var(CLIENT_ID_ENV_VAR) {
            config.client_id = client_id;
        }
        Ok(config)
    }

    pub fn client_id(&self) -> Option<&str> {
        let id = self.client_id.trim();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    pub fn proxy() -> Option<String> {
        env::var(PROXY_ENV_VAR).map_or_else(
            |err| match err {
                VarError::NotPresent => None,
                VarError::NotUnicode(_) => {
                    log::error!("proxy URL is not a valid unicode");
                    None
                }
            },
            Some,
        )
    }
}

/// Small user preferences kept in the host store, next to the credential.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    pub fn last_device(&self) -> Option<String> {
        self.store.get(LAST_DEVICE_KEY).filter(|name| !name.is_empty())
    }

    pub fn set_last_device(&self, name: &str) -> Result<(), Error> {
        self.store.set(LAST_DEVICE_KEY, name)
    }

    pub fn clear_last_device(&self) -> Result<(), Error> {
        self.store.remove(LAST_DEVICE_KEY)
    }
}
