use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use shared::{domain::SurveyDescriptor, protocol::SessionPayload, scoring::PageScore};
use tokio::sync::Mutex;

/// One payload as received, with its scores or the reason it was flagged.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StoredSubmission {
    pub(crate) survey: String,
    pub(crate) payload: SessionPayload,
    pub(crate) scores: Vec<PageScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rejection: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct AppState {
    pub(crate) surveys: Arc<HashMap<String, SurveyDescriptor>>,
    pub(crate) submissions: Arc<Mutex<Vec<StoredSubmission>>>,
}

impl AppState {
    pub(crate) fn new(surveys: HashMap<String, SurveyDescriptor>) -> Self {
        Self {
            surveys: Arc::new(surveys),
            submissions: Arc::default(),
        }
    }
}
