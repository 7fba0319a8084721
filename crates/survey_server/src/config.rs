use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::SurveyDescriptor;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub surveys_file: Option<String>,
    pub static_dir: String,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5000".into(),
            surveys_file: None,
            static_dir: "./static".into(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("survey_server.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply_overrides(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    apply_overrides(&mut settings, |key| {
        std::env::var(format!("SURVEY__{}", key.to_ascii_uppercase())).ok()
    });

    settings
}

fn apply_overrides(settings: &mut Settings, value: impl Fn(&str) -> Option<String>) {
    if let Some(v) = value("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = value("surveys_file") {
        settings.surveys_file = Some(v);
    }
    if let Some(v) = value("static_dir") {
        settings.static_dir = v;
    }
    if let Some(v) = value("max_body_bytes") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_body_bytes = parsed;
        }
    }
}

/// Reads a JSON object mapping survey names to their descriptors.
pub fn load_surveys(path: Option<&str>) -> anyhow::Result<HashMap<String, SurveyDescriptor>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let path = Path::new(path);
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read surveys file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse surveys file '{}'", path.display()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
