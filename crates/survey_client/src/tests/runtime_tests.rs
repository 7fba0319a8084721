use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use shared::protocol::CommandRecord;
use tokio::{
    sync::{oneshot, Mutex},
    time::{sleep, timeout},
};

use super::*;
use crate::{
    clock::ManualClock,
    tests_support::{pages, payload, RecordingRenderer},
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct TestProbe {
    online: AtomicBool,
    calls: AtomicUsize,
}

impl TestProbe {
    fn online(online: bool) -> Arc<Self> {
        let probe = Self::default();
        probe.online.store(online, Ordering::SeqCst);
        Arc::new(probe)
    }
}

#[async_trait]
impl LivenessProbe for TestProbe {
    async fn ping(&self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Timeout)
        }
    }
}

#[derive(Default)]
struct TestUploader {
    batches: Mutex<Vec<Vec<SessionPayload>>>,
    responses: Mutex<VecDeque<Result<SubmitAck, TransportError>>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl TestUploader {
    fn answering(responses: Vec<Result<SubmitAck, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    async fn batches(&self) -> Vec<Vec<SessionPayload>> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl BatchUploader for TestUploader {
    async fn upload(&self, batch: &[SessionPayload]) -> Result<SubmitAck, TransportError> {
        self.batches.lock().await.push(batch.to_vec());
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(SubmitAck::Accepted))
    }
}

fn runtime(
    page_count: usize,
    probe: Arc<TestProbe>,
    uploader: Arc<TestUploader>,
    probe_interval: Duration,
) -> (SurveyHandle, JoinHandle<ShutdownReport>, ManualClock) {
    let clock = ManualClock::new();
    let paging = PagingFsm::new(pages(page_count), RecordingRenderer::default(), clock.clone());
    let (handle, join) = SurveyRuntime::new(paging, probe, uploader, probe_interval).spawn();
    (handle, join, clock)
}

async fn wait_for(
    rx: &mut broadcast::Receiver<SurveyEvent>,
    mut matches: impl FnMut(&SurveyEvent) -> bool,
) -> SurveyEvent {
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("runtime stopped"),
            }
        }
    })
    .await
    .expect("timed out waiting for survey event")
}

fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Runs a one-page survey with a single fill and submits the evaluation.
async fn complete_survey(
    handle: &SurveyHandle,
    clock: &ManualClock,
    rx: &mut broadcast::Receiver<SurveyEvent>,
) {
    handle
        .send(SurveyCommand::SubmitPersonalia(fields(&[
            ("name", "Bob"),
            ("birth", "2000-01-01"),
            ("nativelang", "Nederlands"),
        ])))
        .expect("personalia");
    handle.send(SurveyCommand::AssetsReady).expect("assets");
    handle.next().expect("start");
    wait_for(rx, |event| {
        matches!(
            event,
            SurveyEvent::Paging {
                state: PagingState::FirstPage,
                ..
            }
        )
    })
    .await;

    clock.set(1200);
    handle.color_region("A", "#d01").expect("fill");
    handle.next().expect("finish page");
    handle
        .send(SurveyCommand::SubmitEvaluation(fields(&[("difficulty", "2")])))
        .expect("evaluation");
}

#[tokio::test]
async fn nothing_is_uploaded_until_connectivity_returns() {
    let probe = TestProbe::online(false);
    let uploader = TestUploader::answering(Vec::new());
    let (handle, join, clock) = runtime(
        1,
        probe.clone(),
        uploader.clone(),
        Duration::from_secs(60),
    );
    let mut rx = handle.subscribe();

    complete_survey(&handle, &clock, &mut rx).await;
    wait_for(&mut rx, |event| {
        matches!(event, SurveyEvent::Transfer(TransferState::WaitingForConnection))
    })
    .await;
    sleep(Duration::from_millis(100)).await;
    assert!(uploader.batches().await.is_empty());

    probe.online.store(true, Ordering::SeqCst);
    handle.send(SurveyCommand::Probe).expect("probe");
    wait_for(&mut rx, |event| matches!(event, SurveyEvent::Delivered { payloads: 1 })).await;

    let batches = uploader.batches().await;
    assert_eq!(batches.len(), 1);
    let delivered = &batches[0][0];
    assert_eq!(delivered.subject.field("name"), Some("Bob"));
    assert_eq!(
        delivered.results,
        vec![vec![CommandRecord::Fill {
            target: "A".to_string(),
            color: "#d01".to_string(),
            time: 1200,
        }]]
    );
    assert_eq!(delivered.evaluation.get("difficulty").map(String::as_str), Some("2"));

    handle.send(SurveyCommand::Shutdown).expect("shutdown");
    let report = join.await.expect("join");
    assert_eq!(report.transfer, TransferState::Finished);
    assert_eq!(report.paging, PagingState::BeforeFirst);
    assert!(report.unsent.is_empty());
}

#[tokio::test]
async fn probe_timer_retries_until_the_server_answers() {
    let probe = TestProbe::online(false);
    let uploader = TestUploader::answering(Vec::new());
    let (handle, _join, clock) = runtime(
        1,
        probe.clone(),
        uploader.clone(),
        Duration::from_millis(50),
    );
    let mut rx = handle.subscribe();

    complete_survey(&handle, &clock, &mut rx).await;
    sleep(Duration::from_millis(200)).await;
    assert!(uploader.batches().await.is_empty());
    assert!(probe.calls.load(Ordering::SeqCst) >= 3, "timer keeps probing");

    probe.online.store(true, Ordering::SeqCst);
    wait_for(&mut rx, |event| matches!(event, SurveyEvent::Delivered { .. })).await;
    assert_eq!(uploader.batches().await.len(), 1);
}

#[tokio::test]
async fn failed_upload_is_retried_with_newer_payloads_behind_it() {
    let probe = TestProbe::online(true);
    let uploader = TestUploader::answering(vec![Err(TransportError::Timeout)]);
    let (release, gate) = oneshot::channel();
    *uploader.gate.lock().await = Some(gate);
    let (handle, _join, _clock) = runtime(
        1,
        probe,
        uploader.clone(),
        Duration::from_secs(60),
    );
    let mut rx = handle.subscribe();

    handle
        .send(SurveyCommand::Resend(vec![payload("alice")]))
        .expect("push alice");
    wait_for(&mut rx, |event| {
        matches!(event, SurveyEvent::Transfer(TransferState::InProgress))
    })
    .await;

    handle
        .send(SurveyCommand::Resend(vec![payload("bob")]))
        .expect("push bob");
    sleep(Duration::from_millis(50)).await;
    release.send(()).expect("release upload");

    wait_for(&mut rx, |event| matches!(event, SurveyEvent::Delivered { payloads: 2 })).await;
    assert_eq!(
        uploader.batches().await,
        vec![
            vec![payload("alice")],
            vec![payload("alice"), payload("bob")]
        ]
    );
}

#[tokio::test]
async fn shutdown_during_upload_reports_the_batch_as_unsent() {
    let probe = TestProbe::online(true);
    let uploader = TestUploader::answering(Vec::new());
    let (_release, gate) = oneshot::channel::<()>();
    *uploader.gate.lock().await = Some(gate);
    let (handle, join, _clock) = runtime(1, probe, uploader, Duration::from_secs(60));
    let mut rx = handle.subscribe();

    handle
        .send(SurveyCommand::Resend(vec![payload("alice")]))
        .expect("push alice");
    wait_for(&mut rx, |event| {
        matches!(event, SurveyEvent::Transfer(TransferState::InProgress))
    })
    .await;
    handle
        .send(SurveyCommand::Resend(vec![payload("bob")]))
        .expect("push bob");
    handle.send(SurveyCommand::Shutdown).expect("shutdown");

    let report = timeout(WAIT, join).await.expect("stopped").expect("report");
    assert_eq!(report.transfer, TransferState::InProgress);
    assert_eq!(report.unsent, vec![payload("alice"), payload("bob")]);
}

#[tokio::test]
async fn early_evaluation_is_refused_and_nothing_is_queued() {
    let probe = TestProbe::online(true);
    let uploader = TestUploader::answering(Vec::new());
    let (handle, join, _clock) = runtime(2, probe, uploader.clone(), Duration::from_secs(60));
    let mut rx = handle.subscribe();

    handle.send(SurveyCommand::AssetsReady).expect("assets");
    handle.next().expect("start");
    handle
        .send(SurveyCommand::SubmitEvaluation(fields(&[("remarks", "none")])))
        .expect("evaluation");
    let refused = wait_for(&mut rx, |event| {
        matches!(event, SurveyEvent::EvaluationRefused(_) | SurveyEvent::Queued { .. })
    })
    .await;
    assert!(matches!(
        refused,
        SurveyEvent::EvaluationRefused(PagingState::FirstPage)
    ));

    handle.send(SurveyCommand::Shutdown).expect("shutdown");
    let report = timeout(WAIT, join).await.expect("stopped").expect("report");
    assert_eq!(report.transfer, TransferState::NoData);
    assert!(report.unsent.is_empty());
    assert!(uploader.batches().await.is_empty());
}

#[tokio::test]
async fn flagged_batch_is_reported_and_not_resent() {
    let probe = TestProbe::online(true);
    let uploader = TestUploader::answering(vec![Ok(SubmitAck::Rejected("Error".to_string()))]);
    let (handle, _join, _clock) = runtime(
        1,
        probe,
        uploader.clone(),
        Duration::from_millis(50),
    );
    let mut rx = handle.subscribe();

    handle
        .send(SurveyCommand::Resend(vec![payload("alice")]))
        .expect("push");
    let event = wait_for(&mut rx, |event| matches!(event, SurveyEvent::UploadError { .. })).await;
    match event {
        SurveyEvent::UploadError { batch, response } => {
            assert_eq!(batch, vec![payload("alice")]);
            assert_eq!(response, "Error");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    sleep(Duration::from_millis(200)).await;
    assert_eq!(uploader.batches().await.len(), 1);
}

#[tokio::test]
async fn first_page_waits_for_assets() {
    let (handle, _join, _clock) = runtime(
        2,
        TestProbe::online(true),
        TestUploader::answering(Vec::new()),
        Duration::from_secs(60),
    );
    let mut rx = handle.subscribe();

    handle.next().expect("next");
    sleep(Duration::from_millis(50)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event, SurveyEvent::Paging { .. }),
            "page started before assets were ready"
        );
    }

    handle.send(SurveyCommand::AssetsReady).expect("assets");
    let event = wait_for(&mut rx, |event| matches!(event, SurveyEvent::Paging { .. })).await;
    match event {
        SurveyEvent::Paging { state, index } => {
            assert_eq!(state, PagingState::FirstPage);
            assert_eq!(index, 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_personalia_is_reported() {
    let (handle, _join, _clock) = runtime(
        1,
        TestProbe::online(true),
        TestUploader::answering(Vec::new()),
        Duration::from_secs(60),
    );
    let mut rx = handle.subscribe();

    handle
        .send(SurveyCommand::SubmitPersonalia(fields(&[("level2", "5")])))
        .expect("personalia");
    let event = wait_for(&mut rx, |event| matches!(event, SurveyEvent::FormRejected(_))).await;
    match event {
        SurveyEvent::FormRejected(message) => assert!(message.contains("level2")),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn going_offline_triggers_a_fresh_probe() {
    let probe = TestProbe::online(true);
    let (handle, _join, _clock) = runtime(
        1,
        probe.clone(),
        TestUploader::answering(Vec::new()),
        Duration::from_secs(60),
    );
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |event| {
        matches!(event, SurveyEvent::Connectivity(ConnectivityState::Online))
    })
    .await;

    probe.online.store(false, Ordering::SeqCst);
    handle
        .send(SurveyCommand::Platform(ConnectivityEvent::WindowOffline))
        .expect("offline");
    wait_for(&mut rx, |event| {
        matches!(event, SurveyEvent::Connectivity(ConnectivityState::Disconnected))
    })
    .await;
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
}
