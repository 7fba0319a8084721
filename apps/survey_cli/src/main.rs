use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use shared::protocol::SessionPayload;
use survey_client::{
    config::load_settings, HttpTransport, PagingFsm, SurveyCommand, SurveyEvent, SurveyRuntime,
    SurveySource, SystemClock,
};
use tokio::{sync::broadcast::error::RecvError, time::timeout};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod delivery;
mod renderer;
mod script;

use delivery::DeliveryTracker;
use renderer::LogRenderer;
use script::Script;

/// Runs a scripted subject through a survey served by a survey server.
#[derive(Parser, Debug)]
struct Args {
    /// Client settings file; defaults to `survey_client.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Full survey address, e.g. `http://host/app/book/dieren`.
    #[arg(long)]
    survey_url: Option<String>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    survey: Option<String>,
    /// JSON file with the steps to replay.
    #[arg(long)]
    script: PathBuf,
    /// JSON array of payloads left over from an earlier run.
    #[arg(long)]
    resend: Option<PathBuf>,
    /// Where to write payloads that were still undelivered at exit.
    #[arg(long)]
    unsent_out: Option<PathBuf>,
    #[arg(long, default_value_t = 30)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(survey) = args.survey {
        settings.survey = survey;
    }
    let script = Script::load(&args.script)?;

    let transport = match &args.survey_url {
        Some(url) => HttpTransport::from_survey_url(url)?,
        None => HttpTransport::new(&settings.base_url, &settings.survey)?,
    }
    .with_probe_timeout(settings.probe_timeout())
    .with_upload_timeout(settings.upload_timeout());
    info!(survey = %transport.survey_url(), "fetching survey");

    let descriptor = transport.fetch_survey().await?;
    let assets = transport.preload_assets(&descriptor).await?;
    info!(
        pages = descriptor.pages.len(),
        assets = assets.len(),
        delay_ms = descriptor.sentence_image_delay().as_millis() as u64,
        "survey loaded"
    );

    let transport = Arc::new(transport);
    let paging = PagingFsm::new(descriptor.pages, LogRenderer::default(), SystemClock::new());
    let runtime = SurveyRuntime::new(
        paging,
        transport.clone(),
        transport.clone(),
        settings.probe_interval(),
    );
    let (handle, task) = runtime.spawn();
    let mut events = handle.subscribe();

    handle.send(SurveyCommand::AssetsReady)?;
    let mut decisions = script.evaluations();
    if let Some(path) = &args.resend {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let payloads: Vec<SessionPayload> = serde_json::from_str(&raw)
            .with_context(|| format!("'{}' is not a payload list", path.display()))?;
        if !payloads.is_empty() {
            decisions += 1;
            handle.send(SurveyCommand::Resend(payloads))?;
        }
    }

    for step in &script.steps {
        if let Some(pause) = step.pause() {
            tokio::time::sleep(pause).await;
        }
        if let Some(command) = step.command() {
            handle.send(command)?;
        }
    }

    let mut tracker = DeliveryTracker::new(decisions);
    if !tracker.done() {
        let wait = Duration::from_secs(args.wait_secs);
        let outcome = timeout(wait, await_delivery(&mut events, &mut tracker)).await;
        match outcome {
            Ok(Ok(())) => info!(payloads = tracker.queued(), "delivery finished"),
            Ok(Err(error)) => warn!(%error, "stopped watching runtime events"),
            Err(_) => warn!(wait_secs = args.wait_secs, "gave up waiting for delivery"),
        }
    }

    handle.send(SurveyCommand::Shutdown)?;
    let report = task.await.context("survey runtime panicked")?;
    info!(paging = %report.paging, transfer = %report.transfer, unsent = report.unsent.len(), "done");

    if !report.unsent.is_empty() {
        let Some(path) = args.unsent_out else {
            bail!("{} payload(s) undelivered; pass --unsent-out to keep them", report.unsent.len());
        };
        fs::write(&path, serde_json::to_vec_pretty(&report.unsent)?)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        info!(path = %path.display(), "undelivered payloads saved");
    }
    Ok(())
}

async fn await_delivery(
    events: &mut tokio::sync::broadcast::Receiver<SurveyEvent>,
    tracker: &mut DeliveryTracker,
) -> Result<()> {
    while !tracker.done() {
        match events.recv().await {
            Ok(event) => tracker.observe(&event),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed runtime events"),
            Err(RecvError::Closed) => bail!("runtime stopped before delivery"),
        }
    }
    Ok(())
}
