use std::collections::BTreeMap;

use shared::{
    domain::Page,
    protocol::{CommandRecord, PageRecord, SessionPayload, SubjectForm},
};
use tracing::warn;

/// Everything one subject produces during a survey run.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pages: Vec<Page>,
    record: PageRecord,
    subject: Option<SubjectForm>,
}

impl SessionContext {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            record: Vec::new(),
            subject: None,
        }
    }

    /// Forgets the previous subject and everything they recorded.
    pub fn reset(&mut self) {
        self.record.clear();
        self.subject = None;
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn record(&self) -> &PageRecord {
        &self.record
    }

    pub fn subject(&self) -> Option<&SubjectForm> {
        self.subject.as_ref()
    }

    pub fn set_subject(&mut self, subject: SubjectForm) {
        self.subject = Some(subject);
    }

    /// Stores the commands of a page that was just completed for the first time.
    pub fn store_page(&mut self, index: usize, commands: Vec<CommandRecord>) {
        if index < self.record.len() {
            self.record[index] = commands;
        } else {
            self.record.push(commands);
        }
    }

    /// Appends the commands of a resumed visit to what the page already holds.
    pub fn amend_page(&mut self, index: usize, commands: Vec<CommandRecord>) {
        match self.record.get_mut(index) {
            Some(stored) => stored.extend(commands),
            None => {
                warn!(index, "session: amending a page that was never stored");
                self.store_page(index, commands);
            }
        }
    }

    /// Freezes the session into the payload handed to the transfer machine.
    pub fn finish(&self, evaluation: BTreeMap<String, String>) -> SessionPayload {
        if self.subject.is_none() {
            warn!("session: finishing without personalia; the server will reject it");
        }
        SessionPayload {
            subject: self.subject.clone().unwrap_or_default(),
            results: self.record.clone(),
            evaluation,
        }
    }
}
