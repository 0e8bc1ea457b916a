use crate::canvas::{CanvasConfig, DEFAULT_COURSES_ENDPOINT};
use crate::errors::{AppError, AppResult};
use crate::events::EVENTS_FILE_NAME;
use crate::fs::{read_json_file, write_json_file};
use crate::vault::VAULT_DIR_NAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.json";
const KEYRING_SERVICE: &str = "memoura";
const CANVAS_TOKEN_ACCOUNT: &str = "canvas";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub app_root: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(app_root: PathBuf, data_dir: PathBuf) -> Self {
        Self { app_root, data_dir }
    }

    /// Current directory as the application root and the per-user data
    /// directory for everything the app writes on its own behalf.
    pub fn discover() -> AppResult<Self> {
        let app_root = std::env::current_dir()?;
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join("memoura"))
            .ok_or_else(|| AppError::Unavailable("No per-user data directory on this platform".to_string()))?;
        Ok(Self { app_root, data_dir })
    }

    pub fn vault_root(&self) -> PathBuf {
        self.app_root.join(VAULT_DIR_NAME)
    }

    pub fn events_file(&self) -> PathBuf {
        self.data_dir.join(EVENTS_FILE_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub canvas_domain: Option<String>,
    pub canvas_courses_endpoint: String,
    pub ollama_host: String,
    pub ollama_model: String,
    pub ai_max_retries: u32,
    pub pdf_converter: Option<String>,
    pub pdf_timeout_ms: u64,
    pub save_debounce_ms: u64,
    /// Never persisted; comes from the environment or the OS keyring.
    #[serde(skip)]
    pub canvas_token: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            canvas_domain: None,
            canvas_courses_endpoint: DEFAULT_COURSES_ENDPOINT.to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "gemma3:1b".to_string(),
            ai_max_retries: 2,
            pdf_converter: None,
            pdf_timeout_ms: 30_000,
            save_debounce_ms: 1_000,
            canvas_token: None,
        }
    }
}

impl AppSettings {
    /// Settings file, then `.env` in the app root, then the process
    /// environment. A missing or malformed settings file yields defaults.
    pub fn load(paths: &AppPaths) -> Self {
        let mut settings = Self::read_file(&paths.settings_file());

        let env_file = paths.app_root.join(".env");
        if env_file.exists() {
            if let Err(error) = dotenvy::from_path(&env_file) {
                tracing::warn!(path = %env_file.to_string_lossy(), error = %error, "failed to load .env");
            }
        }
        settings.apply_env(|key| std::env::var(key).ok());

        if settings.canvas_token.is_none() {
            match load_canvas_token() {
                Ok(token) => settings.canvas_token = token,
                Err(error) => tracing::debug!(error = %error, "no canvas token in keyring"),
            }
        }
        settings
    }

    fn read_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match read_json_file::<Self>(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %error, "malformed settings; using defaults");
                Self::default()
            }
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());
        if let Some(domain) = lookup("CANVAS_DOMAIN") {
            self.canvas_domain = Some(domain);
        }
        if let Some(token) = lookup("CANVAS_API_KEY") {
            self.canvas_token = Some(token);
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama_host = host;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ollama_model = model;
        }
    }

    pub fn save(&self, paths: &AppPaths) -> AppResult<()> {
        write_json_file(&paths.settings_file(), self)
    }

    /// Deep-merges a JSON patch onto the current settings.
    pub fn merged(&self, update: serde_json::Value) -> AppResult<Self> {
        let mut merged = serde_json::to_value(self).map_err(|error| AppError::Internal(error.to_string()))?;
        merge_json(&mut merged, update);
        let mut settings: Self = serde_json::from_value(merged)?;
        settings.canvas_token = self.canvas_token.clone();
        Ok(settings)
    }

    /// Both the domain and a token are needed to talk to Canvas.
    pub fn canvas_config(&self) -> Option<CanvasConfig> {
        let domain = self.canvas_domain.as_ref().filter(|value| !value.trim().is_empty())?;
        let token = self.canvas_token.as_ref().filter(|value| !value.trim().is_empty())?;
        Some(CanvasConfig {
            domain: domain.trim().to_string(),
            token: token.trim().to_string(),
            courses_endpoint: self.canvas_courses_endpoint.clone(),
        })
    }
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

fn canvas_token_entry() -> AppResult<keyring::Entry> {
    keyring::Entry::new(KEYRING_SERVICE, CANVAS_TOKEN_ACCOUNT).map_err(|error| AppError::Io(error.to_string()))
}

pub fn load_canvas_token() -> AppResult<Option<String>> {
    match canvas_token_entry()?.get_password() {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
        Err(error) => Err(AppError::Io(error.to_string())),
    }
}

pub fn save_canvas_token(token: &str) -> AppResult<()> {
    canvas_token_entry()?
        .set_password(token)
        .map_err(|error| AppError::Io(error.to_string()))
}

pub fn clear_canvas_token() -> AppResult<()> {
    match canvas_token_entry()?.delete_credential() {
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(error) => Err(AppError::Io(error.to_string())),
    }
}
