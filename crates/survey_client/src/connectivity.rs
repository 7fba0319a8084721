use std::fmt;

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    #[default]
    Probing,
    Online,
    Disconnected,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probing => "probing",
            Self::Online => "online",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Inputs of the connectivity machine: probe results and passive platform signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Heartbeat,
    NoHeartbeat,
    WindowOnline,
    WindowOffline,
    AppCacheError,
    AppCacheDownloading,
    RequestTimeout,
    DeviceResume,
    /// Forced re-probe, accepted in every state.
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEffect {
    IssueProbe,
}

/// Transition table. `None` means the event is ignored in `state`.
pub fn next_state(state: ConnectivityState, event: ConnectivityEvent) -> Option<ConnectivityState> {
    use ConnectivityEvent::*;
    use ConnectivityState::*;

    match (state, event) {
        (_, Probe) => Some(Probing),
        (Probing, Heartbeat) => Some(Online),
        (Probing, NoHeartbeat) => Some(Disconnected),
        (Online, WindowOffline | AppCacheError | RequestTimeout | DeviceResume) => Some(Probing),
        (Disconnected, WindowOnline | AppCacheDownloading | DeviceResume) => Some(Probing),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityOutcome {
    pub entered: Option<ConnectivityState>,
    pub effects: Vec<ConnectivityEffect>,
}

impl ConnectivityOutcome {
    pub fn came_online(&self) -> bool {
        self.entered == Some(ConnectivityState::Online)
    }
}

#[derive(Debug, Default)]
pub struct ConnectivityFsm {
    state: ConnectivityState,
}

impl ConnectivityFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn start(&mut self) -> ConnectivityOutcome {
        self.enter(ConnectivityState::Probing)
    }

    pub fn probe(&mut self) -> ConnectivityOutcome {
        self.handle(ConnectivityEvent::Probe)
    }

    pub fn handle(&mut self, event: ConnectivityEvent) -> ConnectivityOutcome {
        match next_state(self.state, event) {
            Some(next) => {
                debug!(from = %self.state, to = %next, ?event, "connectivity: transition");
                self.enter(next)
            }
            None => {
                debug!(state = %self.state, ?event, "connectivity: event ignored");
                ConnectivityOutcome::default()
            }
        }
    }

    fn enter(&mut self, next: ConnectivityState) -> ConnectivityOutcome {
        let changed = next != self.state;
        self.state = next;
        let mut effects = Vec::new();
        if next == ConnectivityState::Probing {
            effects.push(ConnectivityEffect::IssueProbe);
        }
        if changed {
            info!(state = %next, "connectivity: state changed");
        }
        ConnectivityOutcome {
            entered: Some(next),
            effects,
        }
    }
}

#[cfg(test)]
#[path = "tests/connectivity_tests.rs"]
mod tests;
