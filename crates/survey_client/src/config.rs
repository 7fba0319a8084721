use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "survey_client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub survey: String,
    pub probe_timeout_ms: u64,
    pub probe_interval_ms: u64,
    pub upload_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".into(),
            survey: "test".into(),
            probe_timeout_ms: 5000,
            probe_interval_ms: 10_000,
            upload_timeout_ms: 30_000,
        }
    }
}

impl ClientSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    /// A probe must be able to answer before the next tick supersedes it.
    fn clamp_probe_interval(&mut self) {
        if self.probe_interval_ms <= self.probe_timeout_ms {
            let clamped = self.probe_timeout_ms.saturating_add(1000);
            warn!(
                probe_interval_ms = self.probe_interval_ms,
                probe_timeout_ms = self.probe_timeout_ms,
                clamped,
                "config: probe interval must exceed the probe timeout"
            );
            self.probe_interval_ms = clamped;
        }
    }
}

/// Defaults, then the TOML file (if present), then `SURVEY__*` environment variables.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(&raw)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            apply_file(&mut settings, &file_cfg);
        }
        Err(error) if explicit => {
            return Err(error).with_context(|| format!("failed to read '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings.clamp_probe_interval();
    Ok(settings)
}

fn apply_file(settings: &mut ClientSettings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("base_url").and_then(toml::Value::as_str) {
        settings.base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("survey").and_then(toml::Value::as_str) {
        settings.survey = v.to_string();
    }
    if let Some(v) = file_cfg.get("probe_timeout_ms").and_then(toml::Value::as_integer) {
        settings.probe_timeout_ms = v.max(0) as u64;
    }
    if let Some(v) = file_cfg.get("probe_interval_ms").and_then(toml::Value::as_integer) {
        settings.probe_interval_ms = v.max(0) as u64;
    }
    if let Some(v) = file_cfg.get("upload_timeout_ms").and_then(toml::Value::as_integer) {
        settings.upload_timeout_ms = v.max(0) as u64;
    }
}

fn apply_env(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SURVEY__BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = var("SURVEY__NAME") {
        settings.survey = v;
    }
    if let Some(v) = var("SURVEY__PROBE_TIMEOUT_MS") {
        match v.parse() {
            Ok(parsed) => settings.probe_timeout_ms = parsed,
            Err(_) => warn!(value = %v, "config: ignoring invalid SURVEY__PROBE_TIMEOUT_MS"),
        }
    }
    if let Some(v) = var("SURVEY__PROBE_INTERVAL_MS") {
        match v.parse() {
            Ok(parsed) => settings.probe_interval_ms = parsed,
            Err(_) => warn!(value = %v, "config: ignoring invalid SURVEY__PROBE_INTERVAL_MS"),
        }
    }
    if let Some(v) = var("SURVEY__UPLOAD_TIMEOUT_MS") {
        match v.parse() {
            Ok(parsed) => settings.upload_timeout_ms = parsed,
            Err(_) => warn!(value = %v, "config: ignoring invalid SURVEY__UPLOAD_TIMEOUT_MS"),
        }
    }
}
