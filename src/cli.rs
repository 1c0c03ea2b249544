use crate::definition::{self, parse_assignment};
use crate::engine::{HttpBackend, RunBackend, Submitter};
use crate::model::{MonitorPhase, MonitorSnapshot, RunConfig, RunDefinition, RunVariant};
use crate::orchestrator::{ReportBuilder, RunMonitor, StartOutcome};
use crate::text_summary::{build_definition_summary, build_text_summary, TextSummary};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "run-monitor",
    version,
    about = "Start a workflow run and follow its steps until it finishes"
)]
pub struct Cli {
    /// Base URL of the orchestrator backend
    #[arg(long, env = "API_BASE", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Workflow to run (omit to start the no-input demo run)
    #[arg(long)]
    pub workflow: Option<String>,

    /// Workflow input as KEY=VALUE; overrides the definition's example value
    #[arg(long = "input", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub inputs: Vec<(String, String)>,

    /// Delay between one status response and the next request (default 1200ms, 1s for the demo)
    #[arg(long)]
    pub poll_interval: Option<humantime::Duration>,

    /// Per-request timeout (none by default)
    #[arg(long)]
    pub request_timeout: Option<humantime::Duration>,

    /// Print each snapshot and the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print human-readable progress (default)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except the final report and errors
    #[arg(long)]
    pub silent: bool,

    /// Print the workflow definition and the inputs that would be sent, then exit
    #[arg(long, requires = "workflow")]
    pub show_definition: bool,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    let variant = if args.workflow.is_some() {
        RunVariant::Workflow
    } else {
        RunVariant::Demo
    };
    RunConfig {
        base_url: args.base_url.clone(),
        variant,
        workflow_name: args.workflow.clone(),
        poll_interval: args
            .poll_interval
            .map(Duration::from)
            .unwrap_or_else(|| variant.default_poll_interval()),
        request_timeout: args.request_timeout.map(Duration::from),
        user_agent: format!("run-monitor/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }
    if args.json && args.text {
        anyhow::bail!("--json and --text are mutually exclusive");
    }
    if args.workflow.is_none() && !args.inputs.is_empty() {
        anyhow::bail!("--input requires --workflow; the demo run takes no inputs");
    }

    let cfg = build_config(&args);
    let backend: Arc<dyn RunBackend> = Arc::new(HttpBackend::new(&cfg)?);
    let (out_tx, out_handle) = spawn_output_writer();

    let result = run_with_backend(&args, &cfg, backend, &out_tx).await;

    drop(out_tx);
    let _ = out_handle.await;
    result
}

/// Load inputs, start the run and follow it until it settles.
async fn run_with_backend(
    args: &Cli,
    cfg: &RunConfig,
    backend: Arc<dyn RunBackend>,
    out: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let (definition, request) = match cfg.workflow_name.as_deref() {
        Some(name) => {
            let def = definition::load_definition(backend.as_ref(), name)
                .await
                .with_context(|| format!("could not load workflow {name:?}"))?;
            let inputs = definition::merge_inputs(
                definition::default_inputs(&def),
                args.inputs.iter().cloned(),
            )?;

            if args.show_definition {
                if args.json {
                    let _ = out.send(OutputLine::Stdout(serde_json::to_string_pretty(
                        &serde_json::json!({ "definition": &def, "inputs": &inputs }),
                    )?));
                } else {
                    send_lines(out, build_definition_summary(&def, &inputs));
                }
                return Ok(());
            }

            let request = definition::build_request(&def, inputs)?;
            (Some(def), Some(request))
        }
        None => (None, None),
    };

    let submitter = Submitter::new(backend, cfg.variant);
    let (monitor, mut snapshots) = RunMonitor::new(submitter, cfg.poll_interval);
    let mut report = ReportBuilder::new(cfg);

    match monitor.run_start(request).await {
        Ok(StartOutcome::Started(run_id)) => {
            report.started(&run_id);
            if !args.silent {
                let _ = out.send(OutputLine::Stderr(format!("Run {run_id} started")));
            }
        }
        Ok(StartOutcome::Superseded) => anyhow::bail!("run was superseded before it started"),
        // The failure is also published as an Idle snapshot and handled below.
        Err(e) => warn!(name: "cli.start.failed", error = %e, "could not start run"),
    }

    let mut last_text: Option<TextSummary> = None;
    let interrupted = loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                let Some(snapshot) = snapshot else { break false };
                report.observe(&snapshot);
                emit_snapshot(args, out, &snapshot, definition.as_ref(), &mut last_text)?;
                if settled(&snapshot) {
                    break false;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                monitor.dispose();
                break true;
            }
        }
    };
    monitor.dispose();

    let report = report.finish();
    if args.json {
        let _ = out.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
    }

    if interrupted {
        anyhow::bail!("interrupted");
    }
    if !report.succeeded() {
        let reason = match (&report.error, &report.status) {
            (Some(err), _) => err.message.clone(),
            (None, Some(status)) => format!(
                "run {} {}: {}",
                status.run_id,
                status.status,
                status.error.as_deref().unwrap_or("no error detail")
            ),
            (None, None) => "run did not finish".to_string(),
        };
        anyhow::bail!(reason);
    }
    Ok(())
}

/// Terminal, or back to idle because the submission failed.
fn settled(snapshot: &MonitorSnapshot) -> bool {
    match snapshot.phase {
        MonitorPhase::Terminal => true,
        MonitorPhase::Idle => snapshot.error.is_some(),
        MonitorPhase::Starting | MonitorPhase::Polling => false,
    }
}

fn emit_snapshot(
    args: &Cli,
    out: &mpsc::UnboundedSender<OutputLine>,
    snapshot: &MonitorSnapshot,
    definition: Option<&RunDefinition>,
    last_text: &mut Option<TextSummary>,
) -> Result<()> {
    if args.silent {
        return Ok(());
    }
    if args.json {
        let line = serde_json::to_string(snapshot).context("failed to encode snapshot")?;
        let _ = out.send(OutputLine::Stdout(line));
        return Ok(());
    }

    let summary = build_text_summary(snapshot, definition);
    if last_text.as_ref() == Some(&summary) {
        return Ok(());
    }
    send_lines(out, summary.clone());
    *last_text = Some(summary);
    Ok(())
}

fn send_lines(out: &mpsc::UnboundedSender<OutputLine>, summary: TextSummary) {
    for line in summary.lines {
        let _ = out.send(OutputLine::Stdout(line));
    }
}
