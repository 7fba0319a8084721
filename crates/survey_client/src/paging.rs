use std::{collections::BTreeMap, fmt, mem};

use shared::{
    domain::Page,
    protocol::{SessionPayload, SubjectForm},
};
use tracing::{debug, info, warn};

use crate::{clock::Clock, command_log::CommandLog, render::PageRenderer, session::SessionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagingState {
    #[default]
    BeforeFirst,
    FirstPage,
    GoingForward,
    Resuming,
    PastEnd,
}

impl PagingState {
    pub fn shows_page(self) -> bool {
        matches!(self, Self::FirstPage | Self::GoingForward | Self::Resuming)
    }

    pub fn can_go_back(self) -> bool {
        matches!(self, Self::GoingForward | Self::PastEnd)
    }
}

impl fmt::Display for PagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeFirst => "beforeFirst",
            Self::FirstPage => "firstPage",
            Self::GoingForward => "goingForward",
            Self::Resuming => "resuming",
            Self::PastEnd => "pastEnd",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingEvent {
    Next,
    Previous,
}

/// Transition table. `index` is the page currently on screen (or `page_count`
/// once past the end). `None` means the event is ignored.
pub fn next_state(
    state: PagingState,
    event: PagingEvent,
    index: usize,
    page_count: usize,
) -> Option<PagingState> {
    use PagingEvent::*;
    use PagingState::*;

    match (state, event) {
        (BeforeFirst, Next) if page_count > 0 => Some(FirstPage),
        (FirstPage | GoingForward | Resuming, Next) => {
            if index + 1 < page_count {
                Some(GoingForward)
            } else {
                Some(PastEnd)
            }
        }
        (GoingForward | PastEnd, Previous) => Some(Resuming),
        (PastEnd, Next) => Some(BeforeFirst),
        _ => None,
    }
}

struct SavedPage<S> {
    snapshot: S,
    elapsed_ms: u64,
}

pub struct PagingFsm<R: PageRenderer, C: Clock> {
    state: PagingState,
    index: usize,
    session: SessionContext,
    live: CommandLog,
    onset_ms: u64,
    saved: Vec<Option<SavedPage<R::Snapshot>>>,
    renderer: R,
    clock: C,
}

impl<R: PageRenderer, C: Clock> PagingFsm<R, C> {
    pub fn new(pages: Vec<Page>, renderer: R, clock: C) -> Self {
        let mut fsm = Self {
            state: PagingState::BeforeFirst,
            index: 0,
            session: SessionContext::new(pages),
            live: CommandLog::new(),
            onset_ms: 0,
            saved: Vec::new(),
            renderer,
            clock,
        };
        fsm.enter(PagingState::BeforeFirst);
        fsm
    }

    pub fn state(&self) -> PagingState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn live_log(&self) -> &CommandLog {
        &self.live
    }

    pub fn next(&mut self) -> Option<PagingState> {
        self.handle(PagingEvent::Next)
    }

    pub fn previous(&mut self) -> Option<PagingState> {
        self.handle(PagingEvent::Previous)
    }

    pub fn handle(&mut self, event: PagingEvent) -> Option<PagingState> {
        let Some(next) = next_state(self.state, event, self.index, self.session.page_count())
        else {
            debug!(state = %self.state, ?event, index = self.index, "paging: event ignored");
            return None;
        };

        match event {
            PagingEvent::Next if self.state.shows_page() => self.complete_page(),
            PagingEvent::Previous if self.state.shows_page() => self.abandon_page(),
            _ => {}
        }

        info!(from = %self.state, to = %next, index = self.index, "paging: transition");
        self.enter(next);
        Some(next)
    }

    pub fn submit_personalia(&mut self, subject: SubjectForm) {
        self.session.set_subject(subject);
    }

    /// The image of a fresh page became interactive; restarts its clock.
    pub fn image_shown(&mut self) {
        if matches!(self.state, PagingState::FirstPage | PagingState::GoingForward)
            && self.live.is_empty()
        {
            self.onset_ms = self.clock.now_ms();
        }
    }

    /// Records and paints a fill on the live page. Returns false when no page is
    /// on screen.
    pub fn color_region(&mut self, target: &str, color: &str) -> bool {
        if !self.state.shows_page() {
            debug!(state = %self.state, target, "paging: fill ignored, no page on screen");
            return false;
        }
        let now = self.clock.now_ms();
        let command = self
            .live
            .fill(target, color, self.onset_ms, now, &mut self.renderer);
        debug!(
            index = self.index,
            target,
            color,
            time_ms = command.time_ms(),
            "paging: fill recorded"
        );
        true
    }

    pub fn finish(&self, evaluation: BTreeMap<String, String>) -> Option<SessionPayload> {
        if self.state != PagingState::PastEnd {
            warn!(state = %self.state, "paging: survey not finished yet");
            return None;
        }
        Some(self.session.finish(evaluation))
    }

    fn complete_page(&mut self) {
        let now = self.clock.now_ms();
        let saved = SavedPage {
            snapshot: self.renderer.snapshot(),
            elapsed_ms: now.saturating_sub(self.onset_ms),
        };
        if self.saved.len() <= self.index {
            self.saved.resize_with(self.index + 1, || None);
        }
        self.saved[self.index] = Some(saved);
        self.renderer.end_page();

        let commands = mem::take(&mut self.live).serialize();
        if self.state == PagingState::Resuming {
            self.session.amend_page(self.index, commands);
        } else {
            self.session.store_page(self.index, commands);
        }
        self.index += 1;
    }

    fn abandon_page(&mut self) {
        if !self.live.is_empty() {
            debug!(
                index = self.index,
                commands = self.live.len(),
                "paging: discarding commands of the page left backwards"
            );
        }
        self.renderer.end_page();
        self.live = CommandLog::new();
    }

    fn enter(&mut self, next: PagingState) {
        self.state = next;
        match next {
            PagingState::BeforeFirst => {
                self.session.reset();
                self.index = 0;
                self.live = CommandLog::new();
                self.saved.clear();
                self.renderer.reset();
            }
            PagingState::FirstPage => {
                self.index = 0;
                self.start_fresh();
            }
            PagingState::GoingForward => self.start_fresh(),
            PagingState::Resuming => self.resume(),
            PagingState::PastEnd => self.renderer.show_end_of_survey(),
        }
    }

    fn start_fresh(&mut self) {
        self.live = CommandLog::new();
        self.onset_ms = self.clock.now_ms();
        if let Some(page) = self.session.page(self.index) {
            self.renderer.start_page(self.index, page, None);
        }
    }

    fn resume(&mut self) {
        self.index = self.index.saturating_sub(1);
        let now = self.clock.now_ms();
        let saved = self.saved.get_mut(self.index).and_then(Option::take);
        let (snapshot, elapsed_ms) = match saved {
            Some(saved) => (Some(saved.snapshot), saved.elapsed_ms),
            None => {
                warn!(index = self.index, "paging: no saved rendering to resume");
                (None, 0)
            }
        };
        self.onset_ms = now.saturating_sub(elapsed_ms);
        if let Some(page) = self.session.page(self.index) {
            self.renderer.start_page(self.index, page, snapshot);
        }
        self.live = CommandLog::new();
        self.live.resume(self.onset_ms, now);
    }
}

#[cfg(test)]
#[path = "tests/paging_tests.rs"]
mod tests;
