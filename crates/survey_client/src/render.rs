use shared::domain::Page;

/// The visual side of a survey page.
///
/// Implementations must reflect visibility changes synchronously: when
/// `start_page` returns the page is on screen, when `end_page` returns it is not.
pub trait PageRenderer: Send {
    /// Opaque copy of what is on screen, used to re-display a page on resumption.
    type Snapshot: Send + 'static;

    /// Shows `page`. With `resumed` set, the saved rendering is restored instead
    /// of loading the page afresh.
    fn start_page(&mut self, index: usize, page: &Page, resumed: Option<Self::Snapshot>);

    fn end_page(&mut self);

    fn snapshot(&self) -> Self::Snapshot;

    /// Paints `target` with `color` on the current page.
    fn fill(&mut self, target: &str, color: &str);

    fn show_end_of_survey(&mut self);

    /// Returns to the personalia form, discarding anything shown so far.
    fn reset(&mut self);
}
