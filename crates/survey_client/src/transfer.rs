use std::{collections::VecDeque, fmt};

use shared::protocol::{SessionPayload, SubmitAck};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    NoData,
    WaitingForConnection,
    InProgress,
    Finished,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoData => "noData",
            Self::WaitingForConnection => "waitingForConnection",
            Self::InProgress => "inProgress",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Identifies one upload attempt so stale completions can be told apart.
pub type AttemptId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Push(Vec<SessionPayload>),
    /// The connectivity machine reports the server reachable.
    Heartbeat,
    UploadCompleted { attempt: AttemptId, ack: SubmitAck },
    UploadFailed { attempt: AttemptId, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEffect {
    StartProbeTimer,
    CancelProbeTimer,
    ForceProbe,
    Upload {
        attempt: AttemptId,
        batch: Vec<SessionPayload>,
    },
    /// The server stored the batch but flagged its content. Not retried.
    UploadError {
        batch: Vec<SessionPayload>,
        response: String,
    },
    Delivered { payloads: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Push,
    Heartbeat,
    UploadDone,
    UploadFailed,
}

/// Transition table. `None` means no transition; a push during `inProgress`
/// only grows the buffer and is acted upon once the upload resolves.
fn next_state(state: TransferState, trigger: Trigger) -> Option<TransferState> {
    use TransferState::*;

    match (state, trigger) {
        (NoData | Finished, Trigger::Push) => Some(WaitingForConnection),
        (WaitingForConnection, Trigger::Heartbeat) => Some(InProgress),
        (InProgress, Trigger::UploadDone) => Some(Finished),
        (InProgress, Trigger::UploadFailed) => Some(WaitingForConnection),
        _ => None,
    }
}

struct InFlight {
    attempt: AttemptId,
    batch: Vec<SessionPayload>,
}

/// Buffers finished sessions and uploads them whenever the server is reachable.
#[derive(Default)]
pub struct TransferFsm {
    state: TransferState,
    buffer: VecDeque<SessionPayload>,
    in_flight: Option<InFlight>,
    attempts: AttemptId,
}

impl TransferFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Payloads waiting for the next upload, oldest first.
    pub fn buffered(&self) -> impl Iterator<Item = &SessionPayload> {
        self.buffer.iter()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Everything not yet acknowledged: the batch being uploaded, then the buffer.
    pub fn pending(&self) -> impl Iterator<Item = &SessionPayload> {
        self.in_flight
            .iter()
            .flat_map(|in_flight| in_flight.batch.iter())
            .chain(self.buffer.iter())
    }

    pub fn push(&mut self, payload: SessionPayload) -> Vec<TransferEffect> {
        self.handle(TransferEvent::Push(vec![payload]))
    }

    pub fn handle(&mut self, event: TransferEvent) -> Vec<TransferEffect> {
        let mut effects = Vec::new();
        let trigger = match event {
            TransferEvent::Push(payloads) => {
                if payloads.is_empty() {
                    return effects;
                }
                self.buffer.extend(payloads);
                if self.state == TransferState::InProgress {
                    debug!(
                        buffered = self.buffer.len(),
                        "transfer: push deferred until the current upload resolves"
                    );
                }
                Trigger::Push
            }
            TransferEvent::Heartbeat => Trigger::Heartbeat,
            TransferEvent::UploadCompleted { attempt, ack } => {
                let Some(batch) = self.take_in_flight(attempt) else {
                    return effects;
                };
                let payloads = batch.len();
                match ack {
                    SubmitAck::Accepted => {
                        info!(attempt, payloads, "transfer: batch delivered");
                    }
                    SubmitAck::Rejected(response) => {
                        warn!(
                            attempt,
                            payloads,
                            %response,
                            "transfer: server stored the batch but flagged it as invalid"
                        );
                        effects.push(TransferEffect::UploadError { batch, response });
                    }
                }
                effects.push(TransferEffect::Delivered { payloads });
                Trigger::UploadDone
            }
            TransferEvent::UploadFailed { attempt, reason } => {
                let Some(batch) = self.take_in_flight(attempt) else {
                    return effects;
                };
                warn!(
                    attempt,
                    payloads = batch.len(),
                    %reason,
                    "transfer: upload failed; restoring batch"
                );
                for payload in batch.into_iter().rev() {
                    self.buffer.push_front(payload);
                }
                Trigger::UploadFailed
            }
        };

        if let Some(next) = next_state(self.state, trigger) {
            self.transition(next, &mut effects);
        }
        // Pushes deferred during the upload are replayed now that it resolved.
        if self.state == TransferState::Finished && !self.buffer.is_empty() {
            self.transition(TransferState::WaitingForConnection, &mut effects);
        }
        effects
    }

    fn take_in_flight(&mut self, attempt: AttemptId) -> Option<Vec<SessionPayload>> {
        let current = self.state == TransferState::InProgress
            && self
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| in_flight.attempt == attempt);
        if !current {
            debug!(attempt, state = %self.state, "transfer: ignoring stale upload completion");
            return None;
        }
        self.in_flight.take().map(|in_flight| in_flight.batch)
    }

    fn transition(&mut self, next: TransferState, effects: &mut Vec<TransferEffect>) {
        if next == TransferState::InProgress && self.buffer.is_empty() {
            return;
        }
        info!(from = %self.state, to = %next, "transfer: transition");
        if self.state == TransferState::WaitingForConnection {
            effects.push(TransferEffect::CancelProbeTimer);
        }
        self.state = next;
        match next {
            TransferState::WaitingForConnection => {
                effects.push(TransferEffect::StartProbeTimer);
                effects.push(TransferEffect::ForceProbe);
            }
            TransferState::InProgress => {
                self.attempts += 1;
                let batch: Vec<SessionPayload> = self.buffer.drain(..).collect();
                self.in_flight = Some(InFlight {
                    attempt: self.attempts,
                    batch: batch.clone(),
                });
                effects.push(TransferEffect::Upload {
                    attempt: self.attempts,
                    batch,
                });
            }
            TransferState::NoData | TransferState::Finished => {}
        }
    }
}

#[cfg(test)]
#[path = "tests/transfer_tests.rs"]
mod tests;
