use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use survey_client::SurveyCommand;

/// One scripted subject action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Personalia { fields: Vec<(String, String)> },
    ImageShown,
    Fill { target: String, color: String },
    Next,
    Previous,
    Pause { ms: u64 },
    Evaluation { fields: Vec<(String, String)> },
}

impl Step {
    /// The runtime command for this step; pauses have none.
    pub fn command(&self) -> Option<SurveyCommand> {
        Some(match self {
            Self::Personalia { fields } => SurveyCommand::SubmitPersonalia(fields.clone()),
            Self::ImageShown => SurveyCommand::ImageShown,
            Self::Fill { target, color } => SurveyCommand::ColorRegion {
                target: target.clone(),
                color: color.clone(),
            },
            Self::Next => SurveyCommand::Next,
            Self::Previous => SurveyCommand::Previous,
            Self::Evaluation { fields } => SurveyCommand::SubmitEvaluation(fields.clone()),
            Self::Pause { .. } => return None,
        })
    }

    pub fn pause(&self) -> Option<Duration> {
        match self {
            Self::Pause { ms } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn parse(raw: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(raw).context("script is not valid JSON")?;
        if script.steps.is_empty() {
            bail!("script has no steps");
        }
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read script '{}'", path.display()))?;
        Self::parse(&raw)
    }

    /// Number of evaluation submissions; each may queue one session.
    pub fn evaluations(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, Step::Evaluation { .. }))
            .count()
    }
}

#[cfg(test)]
#[path = "tests/script_tests.rs"]
mod tests;
