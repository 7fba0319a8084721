//! Fixtures shared by the unit tests.

use std::collections::BTreeMap;

use shared::{
    domain::Page,
    protocol::{LanguageLevel, SessionPayload, SubjectForm},
};

use crate::render::PageRenderer;

/// Renderer that remembers every call; snapshots are the fills on screen.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub started: Vec<(usize, bool)>,
    pub ended: usize,
    pub resets: usize,
    pub end_of_survey_shown: usize,
    pub fills: Vec<(String, String)>,
    pub on_screen: Vec<(String, String)>,
}

impl PageRenderer for RecordingRenderer {
    type Snapshot = Vec<(String, String)>;

    fn start_page(&mut self, index: usize, _page: &Page, resumed: Option<Self::Snapshot>) {
        self.started.push((index, resumed.is_some()));
        self.on_screen = resumed.unwrap_or_default();
    }

    fn end_page(&mut self) {
        self.ended += 1;
        self.on_screen.clear();
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.on_screen.clone()
    }

    fn fill(&mut self, target: &str, color: &str) {
        let fill = (target.to_string(), color.to_string());
        self.fills.push(fill.clone());
        self.on_screen.push(fill);
    }

    fn show_end_of_survey(&mut self) {
        self.end_of_survey_shown += 1;
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.on_screen.clear();
    }
}

pub fn pages(count: usize) -> Vec<Page> {
    (0..count)
        .map(|i| Page {
            name: format!("page{i}"),
            text: format!("Zin {i}"),
            image: format!("image{i}.svg"),
            audio: None,
            expected_targets: Vec::new(),
        })
        .collect()
}

pub fn subject(name: &str) -> SubjectForm {
    let mut subject = SubjectForm {
        languages: vec![LanguageLevel::new("Nederlands", Some(10))],
        ..SubjectForm::default()
    };
    subject.fields.insert("name".to_string(), name.to_string());
    subject.fields.insert("birth".to_string(), "2000-01-01".to_string());
    subject
}

pub fn payload(name: &str) -> SessionPayload {
    SessionPayload {
        subject: subject(name),
        results: Vec::new(),
        evaluation: BTreeMap::new(),
    }
}
