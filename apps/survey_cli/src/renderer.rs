use shared::domain::Page;
use survey_client::PageRenderer;
use tracing::info;

/// Renders pages as log lines; keeps the painted regions of the current page.
#[derive(Debug, Default)]
pub struct LogRenderer {
    painted: Vec<(String, String)>,
}

impl PageRenderer for LogRenderer {
    type Snapshot = Vec<(String, String)>;

    fn start_page(&mut self, index: usize, page: &Page, resumed: Option<Self::Snapshot>) {
        let restored = resumed.is_some();
        self.painted = resumed.unwrap_or_default();
        info!(index, image = %page.image, restored, "page: {}", page.text);
    }

    fn end_page(&mut self) {
        info!(painted = self.painted.len(), "page: hidden");
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.painted.clone()
    }

    fn fill(&mut self, target: &str, color: &str) {
        match self.painted.iter_mut().find(|(painted, _)| painted == target) {
            Some(entry) => entry.1 = color.to_string(),
            None => self.painted.push((target.to_string(), color.to_string())),
        }
        info!(target, color, "page: region filled");
    }

    fn show_end_of_survey(&mut self) {
        info!("survey: end reached, showing evaluation form");
    }

    fn reset(&mut self) {
        self.painted.clear();
        info!("survey: back to personalia form");
    }
}
