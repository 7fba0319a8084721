use survey_client::SurveyEvent;
use tracing::{info, warn};

/// Follows runtime events until every queued payload has been acknowledged.
///
/// `decisions` counts the commands that may queue payloads; each one resolves
/// as either `Queued` or `EvaluationRefused`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeliveryTracker {
    decisions: usize,
    queued: usize,
    delivered: usize,
}

impl DeliveryTracker {
    pub fn new(decisions: usize) -> Self {
        Self {
            decisions,
            ..Self::default()
        }
    }

    pub fn observe(&mut self, event: &SurveyEvent) {
        match event {
            SurveyEvent::Queued { payloads } => {
                self.decisions = self.decisions.saturating_sub(1);
                self.queued += payloads;
            }
            SurveyEvent::EvaluationRefused(state) => {
                self.decisions = self.decisions.saturating_sub(1);
                warn!(%state, "evaluation refused; survey not finished");
            }
            SurveyEvent::Delivered { payloads } => self.delivered += payloads,
            SurveyEvent::UploadError { batch, response } => {
                warn!(payloads = batch.len(), %response, "server flagged submitted payloads");
            }
            SurveyEvent::FormRejected(reason) => warn!(%reason, "personalia rejected"),
            SurveyEvent::Connectivity(state) => info!(%state, "connectivity"),
            SurveyEvent::Transfer(state) => info!(%state, "transfer"),
            SurveyEvent::Paging { state, index } => info!(%state, index, "paging"),
        }
    }

    pub fn done(&self) -> bool {
        self.decisions == 0 && self.delivered >= self.queued
    }

    pub fn queued(&self) -> usize {
        self.queued
    }
}

#[cfg(test)]
#[path = "tests/delivery_tests.rs"]
mod tests;
