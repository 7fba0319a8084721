//! Single-task event loop driving the paging, transfer and connectivity machines.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use shared::protocol::{SessionPayload, SubmitAck};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    connectivity::{ConnectivityEffect, ConnectivityEvent, ConnectivityFsm, ConnectivityOutcome, ConnectivityState},
    forms::{parse_evaluation, parse_personalia},
    paging::{PagingFsm, PagingState},
    render::PageRenderer,
    transfer::{AttemptId, TransferEffect, TransferEvent, TransferFsm, TransferState},
    transport::{BatchUploader, LivenessProbe, TransportError},
};

const EVENT_CAPACITY: usize = 256;

/// Inputs coming from the user interface and the platform.
#[derive(Debug, Clone)]
pub enum SurveyCommand {
    /// Raw personalia fields in form order.
    SubmitPersonalia(Vec<(String, String)>),
    /// Every page asset is loaded; unlocks the first page.
    AssetsReady,
    ImageShown,
    ColorRegion { target: String, color: String },
    Next,
    Previous,
    /// Raw evaluation fields; completes the session and queues it for upload.
    SubmitEvaluation(Vec<(String, String)>),
    /// Passive connectivity signal such as going offline or waking up.
    Platform(ConnectivityEvent),
    Probe,
    /// Queues payloads left over from an earlier attempt.
    Resend(Vec<SessionPayload>),
    Shutdown,
}

/// What observers of the runtime get to see.
#[derive(Debug, Clone)]
pub enum SurveyEvent {
    Connectivity(ConnectivityState),
    Transfer(TransferState),
    Paging { state: PagingState, index: usize },
    FormRejected(String),
    /// The evaluation was submitted before every page was completed.
    EvaluationRefused(PagingState),
    /// Payloads handed to the transfer machine.
    Queued { payloads: usize },
    UploadError {
        batch: Vec<SessionPayload>,
        response: String,
    },
    Delivered { payloads: usize },
}

enum RuntimeEvent {
    Command(SurveyCommand),
    ProbeFinished { probe: u64, alive: bool },
    ProbeTick,
    UploadFinished {
        attempt: AttemptId,
        result: Result<SubmitAck, TransportError>,
    },
}

/// Cloneable entry point for UI code.
#[derive(Clone)]
pub struct SurveyHandle {
    tx: mpsc::UnboundedSender<RuntimeEvent>,
    events: broadcast::Sender<SurveyEvent>,
}

impl SurveyHandle {
    pub fn send(&self, command: SurveyCommand) -> Result<()> {
        self.tx
            .send(RuntimeEvent::Command(command))
            .map_err(|_| anyhow!("survey runtime stopped"))
    }

    pub fn next(&self) -> Result<()> {
        self.send(SurveyCommand::Next)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(SurveyCommand::Previous)
    }

    pub fn color_region(&self, target: impl Into<String>, color: impl Into<String>) -> Result<()> {
        self.send(SurveyCommand::ColorRegion {
            target: target.into(),
            color: color.into(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SurveyEvent> {
        self.events.subscribe()
    }
}

/// State left behind when the runtime stops.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub paging: PagingState,
    pub transfer: TransferState,
    /// Payloads that never reached the server.
    pub unsent: Vec<SessionPayload>,
}

pub struct SurveyRuntime<R: PageRenderer + 'static, C: Clock + 'static> {
    paging: PagingFsm<R, C>,
    connectivity: ConnectivityFsm,
    transfer: TransferFsm,
    probe: Arc<dyn LivenessProbe>,
    uploader: Arc<dyn BatchUploader>,
    probe_interval: Duration,
    probe_timer: Option<JoinHandle<()>>,
    latest_probe: u64,
    assets_ready: bool,
    start_pending: bool,
    tx: mpsc::UnboundedSender<RuntimeEvent>,
    rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    events: broadcast::Sender<SurveyEvent>,
}

impl<R: PageRenderer + 'static, C: Clock + 'static> SurveyRuntime<R, C> {
    pub fn new(
        paging: PagingFsm<R, C>,
        probe: Arc<dyn LivenessProbe>,
        uploader: Arc<dyn BatchUploader>,
        probe_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            paging,
            connectivity: ConnectivityFsm::new(),
            transfer: TransferFsm::new(),
            probe,
            uploader,
            probe_interval,
            probe_timer: None,
            latest_probe: 0,
            assets_ready: false,
            start_pending: false,
            tx,
            rx,
            events,
        }
    }

    pub fn handle(&self) -> SurveyHandle {
        SurveyHandle {
            tx: self.tx.clone(),
            events: self.events.clone(),
        }
    }

    pub fn spawn(self) -> (SurveyHandle, JoinHandle<ShutdownReport>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Processes events one at a time, in arrival order, until shut down.
    pub async fn run(mut self) -> ShutdownReport {
        let outcome = self.connectivity.start();
        self.apply_connectivity(outcome);

        while let Some(event) = self.rx.recv().await {
            match event {
                RuntimeEvent::Command(SurveyCommand::Shutdown) => break,
                RuntimeEvent::Command(command) => self.on_command(command),
                RuntimeEvent::ProbeFinished { probe, alive } => {
                    if probe != self.latest_probe {
                        debug!(probe, latest = self.latest_probe, "runtime: stale probe result");
                        continue;
                    }
                    let event = if alive {
                        ConnectivityEvent::Heartbeat
                    } else {
                        ConnectivityEvent::NoHeartbeat
                    };
                    let outcome = self.connectivity.handle(event);
                    self.apply_connectivity(outcome);
                }
                RuntimeEvent::ProbeTick => {
                    let outcome = self.connectivity.probe();
                    self.apply_connectivity(outcome);
                }
                RuntimeEvent::UploadFinished { attempt, result } => {
                    let event = match result {
                        Ok(ack) => TransferEvent::UploadCompleted { attempt, ack },
                        Err(error) => TransferEvent::UploadFailed {
                            attempt,
                            reason: error.to_string(),
                        },
                    };
                    self.apply_transfer(event);
                }
            }
        }

        self.cancel_probe_timer();
        info!(paging = %self.paging.state(), transfer = %self.transfer.state(), "runtime: stopped");
        ShutdownReport {
            paging: self.paging.state(),
            transfer: self.transfer.state(),
            unsent: self.transfer.pending().cloned().collect(),
        }
    }

    fn on_command(&mut self, command: SurveyCommand) {
        match command {
            SurveyCommand::SubmitPersonalia(fields) => match parse_personalia(fields) {
                Ok(subject) => self.paging.submit_personalia(subject),
                Err(error) => {
                    warn!(%error, "runtime: personalia rejected");
                    self.emit(SurveyEvent::FormRejected(error.to_string()));
                }
            },
            SurveyCommand::AssetsReady => {
                self.assets_ready = true;
                if std::mem::take(&mut self.start_pending) {
                    self.advance();
                }
            }
            SurveyCommand::ImageShown => self.paging.image_shown(),
            SurveyCommand::ColorRegion { target, color } => {
                self.paging.color_region(&target, &color);
            }
            SurveyCommand::Next => {
                if self.paging.state() == PagingState::BeforeFirst && !self.assets_ready {
                    debug!("runtime: first page waits for assets");
                    self.start_pending = true;
                } else {
                    self.advance();
                }
            }
            SurveyCommand::Previous => {
                if let Some(state) = self.paging.previous() {
                    self.emit_paging(state);
                }
            }
            SurveyCommand::SubmitEvaluation(fields) => {
                let Some(payload) = self.paging.finish(parse_evaluation(fields)) else {
                    self.emit(SurveyEvent::EvaluationRefused(self.paging.state()));
                    return;
                };
                self.queue(vec![payload]);
                self.advance();
            }
            SurveyCommand::Platform(event) => {
                let outcome = self.connectivity.handle(event);
                self.apply_connectivity(outcome);
            }
            SurveyCommand::Probe => {
                let outcome = self.connectivity.probe();
                self.apply_connectivity(outcome);
            }
            SurveyCommand::Resend(payloads) => self.queue(payloads),
            SurveyCommand::Shutdown => {}
        }
    }

    fn queue(&mut self, payloads: Vec<SessionPayload>) {
        if payloads.is_empty() {
            return;
        }
        let count = payloads.len();
        self.apply_transfer(TransferEvent::Push(payloads));
        self.emit(SurveyEvent::Queued { payloads: count });
    }

    fn advance(&mut self) {
        if let Some(state) = self.paging.next() {
            self.emit_paging(state);
        }
    }

    fn emit_paging(&self, state: PagingState) {
        self.emit(SurveyEvent::Paging {
            state,
            index: self.paging.index(),
        });
    }

    fn apply_connectivity(&mut self, outcome: ConnectivityOutcome) {
        for effect in &outcome.effects {
            match effect {
                ConnectivityEffect::IssueProbe => self.issue_probe(),
            }
        }
        if let Some(state) = outcome.entered {
            self.emit(SurveyEvent::Connectivity(state));
        }
        if outcome.came_online() {
            self.apply_transfer(TransferEvent::Heartbeat);
        }
    }

    fn apply_transfer(&mut self, event: TransferEvent) {
        let before = self.transfer.state();
        let effects = self.transfer.handle(event);
        let after = self.transfer.state();
        for effect in effects {
            match effect {
                TransferEffect::StartProbeTimer => self.start_probe_timer(),
                TransferEffect::CancelProbeTimer => self.cancel_probe_timer(),
                TransferEffect::ForceProbe => {
                    let outcome = self.connectivity.probe();
                    self.apply_connectivity(outcome);
                }
                TransferEffect::Upload { attempt, batch } => self.start_upload(attempt, batch),
                TransferEffect::UploadError { batch, response } => {
                    self.emit(SurveyEvent::UploadError { batch, response });
                }
                TransferEffect::Delivered { payloads } => {
                    self.emit(SurveyEvent::Delivered { payloads });
                }
            }
        }
        if before != after {
            self.emit(SurveyEvent::Transfer(after));
        }
    }

    fn issue_probe(&mut self) {
        self.latest_probe += 1;
        let probe = self.latest_probe;
        let prober = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let alive = match prober.ping().await {
                Ok(()) => true,
                Err(error) => {
                    debug!(probe, %error, "runtime: no heartbeat");
                    false
                }
            };
            let _ = tx.send(RuntimeEvent::ProbeFinished { probe, alive });
        });
    }

    fn start_upload(&self, attempt: AttemptId, batch: Vec<SessionPayload>) {
        info!(attempt, payloads = batch.len(), "runtime: uploading batch");
        let uploader = Arc::clone(&self.uploader);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = uploader.upload(&batch).await;
            let _ = tx.send(RuntimeEvent::UploadFinished { attempt, result });
        });
    }

    fn start_probe_timer(&mut self) {
        self.cancel_probe_timer();
        let period = self.probe_interval;
        let tx = self.tx.clone();
        self.probe_timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if tx.send(RuntimeEvent::ProbeTick).is_err() {
                    break;
                }
            }
        }));
    }

    fn cancel_probe_timer(&mut self) {
        if let Some(timer) = self.probe_timer.take() {
            timer.abort();
        }
    }

    fn emit(&self, event: SurveyEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
