//! Replay command - play a trace through a session and report the call tree

use std::{fs, path::Path, sync::Arc};

use eyre::{Result, WrapErr};
use rewind_engine::{
    render_tree, CallTreeView, ChannelObserver, PerformanceReport, Session, SessionError,
    SessionEvent, StartOutcome,
};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use super::load_engine_config;

/// Command-line overrides for a replay
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Inter-step delay override
    pub speed: Option<u64>,
    /// Enable turbo playback
    pub turbo: bool,
    /// History capacity override
    pub max_history: Option<usize>,
    /// Suppress per-step output
    pub quiet: bool,
    /// Emit JSON instead of text
    pub json: bool,
}

/// Machine-readable replay summary
#[derive(Debug, Serialize)]
struct ReplayReport {
    call_tree: Vec<CallTreeView>,
    metrics: PerformanceReport,
    snapshots: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Play a recorded trace to completion
pub async fn replay_trace(path: &Path, config_path: Option<&Path>, options: &ReplayOptions) -> Result<()> {
    let mut config = load_engine_config(config_path)?;
    if let Some(speed) = options.speed {
        config = config.with_speed(speed);
    }
    if options.turbo {
        config = config.with_turbo(true);
    }
    if let Some(max_history) = options.max_history {
        config = config.with_max_history(max_history);
    }

    let source = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read trace file {}", path.display()))?;

    let (observer, events) = ChannelObserver::new();
    let session = Session::recorded(config, Arc::new(observer)).wrap_err("Failed to create session")?;
    session.set_source(source)?;

    let printer = tokio::spawn(print_events(events, options.quiet || options.json));

    match session.start_execution()? {
        StartOutcome::Started => session.wait_for_playback().await,
        outcome => info!("Nothing to replay: {outcome:?}"),
    }

    let report = ReplayReport {
        call_tree: session.call_forest(),
        metrics: session.metrics(),
        snapshots: session.history_len(),
        error: None,
    };
    // closes the event channel
    drop(session);
    let failure = printer.await?;
    let report = ReplayReport { error: failure.as_ref().map(ToString::to_string), ..report };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match failure {
        Some(err) => Err(err).wrap_err("Replay halted"),
        None => Ok(()),
    }
}

/// Print per-step progress and return the first reported failure
async fn print_events(mut events: UnboundedReceiver<SessionEvent>, quiet: bool) -> Option<SessionError> {
    let mut failure = None;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Snapshot(snapshot) if !quiet => {
                let line = snapshot.line.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
                let frame =
                    snapshot.innermost_frame().map(|f| f.function_name.as_str()).unwrap_or_default();
                println!(
                    "step {:>6}  line {:>4}  depth {:>3}  {frame}",
                    snapshot.step_number,
                    line,
                    snapshot.depth()
                );
            }
            SessionEvent::HistoryLimit(limit) => {
                warn!("History limit reached ({limit} steps), oldest snapshots are being dropped")
            }
            SessionEvent::Warning(message) => warn!("{message}"),
            SessionEvent::Failure(err) => {
                failure.get_or_insert(err);
            }
            _ => {}
        }
    }
    failure
}

fn print_report(report: &ReplayReport) {
    println!();
    println!("Call tree:");
    if report.call_tree.is_empty() {
        println!("  (no function calls)");
    } else {
        for line in render_tree(&report.call_tree).lines() {
            println!("  {line}");
        }
    }

    println!();
    println!("Metrics:");
    println!("  steps:           {}", report.metrics.total_steps);
    println!("  function calls:  {}", report.metrics.function_calls);
    println!("  max stack depth: {}", report.metrics.max_stack_depth);
    println!("  snapshots:       {}", report.snapshots);
    println!("  time:            {:.1} ms", report.metrics.execution_time_ms);
}
