use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use marketech_contracts::config::ClientConfig;
use marketech_contracts::events::EventLog;
use marketech_contracts::jobs::{JobRequest, JobStatus, ReferenceImage};
use marketech_contracts::presets::{camera_angle, CAMERA_ANGLES, DEFAULT_CAMERA_ANGLE};
use marketech_contracts::results::{ResolutionOutcome, ResolvedImage};
use marketech_engine::{CancelToken, HealthProber, HttpTransport, Orchestrator, Transport};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "marketech-rs", version, about = "Marketech generation client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Health(HealthArgs),
    Generate(GenerateArgs),
    Presets,
}

#[derive(Debug, Parser)]
struct HealthArgs {
    #[arg(long)]
    base_url: Option<String>,
    /// Seconds before a single HTTP request is abandoned.
    #[arg(long)]
    request_timeout: Option<f64>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    /// Path to the product image, or a `data:image/...;base64,` URL.
    #[arg(long)]
    image: String,
    #[arg(long, default_value = DEFAULT_CAMERA_ANGLE)]
    angle: String,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    blob_dir: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    max_polls: Option<u32>,
    /// Seconds before polling gives up.
    #[arg(long)]
    poll_deadline: Option<f64>,
    /// Seconds before a single HTTP request is abandoned.
    #[arg(long)]
    request_timeout: Option<f64>,
    #[arg(long)]
    json: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("marketech-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Health(args) => run_health(args),
        Command::Generate(args) => run_generate(args),
        Command::Presets => {
            for angle in CAMERA_ANGLES {
                println!("{:<10} {:<13} {}", angle.id, angle.label, angle.description);
            }
            Ok(0)
        }
    }
}

fn run_health(args: HealthArgs) -> Result<i32> {
    let mut config = client_config(args.base_url.as_deref());
    config.request_timeout = request_timeout(args.request_timeout)?.or(config.request_timeout);
    let transport = HttpTransport::new(&config)?;
    let report = HealthProber::new(&config, &transport).check();
    if report.healthy {
        println!("{} is healthy", config.base_url());
        return Ok(0);
    }
    println!("{} is not healthy: {}", config.base_url(), report.detail);
    Ok(2)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut config = client_config(args.base_url.as_deref());
    if let Some(dir) = &args.blob_dir {
        config.blob_dir = dir.clone();
    }
    if let Some(polls) = args.max_polls {
        config.max_polls = Some(polls.max(1));
    }
    if let Some(seconds) = args.poll_deadline {
        config.poll_deadline = Some(positive_seconds("--poll-deadline", seconds)?);
    }
    config.request_timeout = request_timeout(args.request_timeout)?.or(config.request_timeout);

    let request = build_request(&args)?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
    let mut orchestrator = Orchestrator::with_transport(config, transport);
    if let Some(path) = &args.events {
        let session_id = uuid::Uuid::new_v4().to_string();
        orchestrator = orchestrator.with_event_log(EventLog::new(path, session_id));
    }

    let outcome = orchestrator.run_with_cancel(
        &request,
        |status| {
            if !args.json {
                println!("{}", progress_line(status));
            }
        },
        &CancelToken::new(),
    )?;

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    if args.json {
        let images = outcome.images.iter().map(image_json).collect::<Vec<_>>();
        let payload = json!({
            "job_id": outcome.job.job_id,
            "images": images,
            "warnings": outcome.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        if outcome.images.is_empty() {
            println!("Job {} finished without images.", outcome.job.job_id);
        }
        for image in &outcome.images {
            println!("{}", image.handle);
        }
    }
    Ok(0)
}

fn client_config(base_url: Option<&str>) -> ClientConfig {
    let config = ClientConfig::from_env();
    match base_url.map(str::trim).filter(|value| !value.is_empty()) {
        Some(base_url) => config.with_base_url(base_url),
        None => config,
    }
}

fn positive_seconds(flag: &str, seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("{flag} must be a positive number of seconds");
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn request_timeout(seconds: Option<f64>) -> Result<Option<Duration>> {
    seconds
        .map(|seconds| positive_seconds("--request-timeout", seconds))
        .transpose()
}

fn build_request(args: &GenerateArgs) -> Result<JobRequest> {
    let Some(angle) = camera_angle(&args.angle) else {
        let known = CAMERA_ANGLES
            .iter()
            .map(|angle| angle.id)
            .collect::<Vec<_>>()
            .join(", ");
        bail!("unknown camera angle '{}' (expected one of: {known})", args.angle);
    };
    Ok(JobRequest::new(args.prompt.trim())
        .with_reference_image(load_reference_image(&args.image)?)
        .with_style_modifier(angle.prompt_mod)
        .with_variation_count(args.quantity))
}

fn load_reference_image(raw: &str) -> Result<ReferenceImage> {
    let value = raw.trim();
    if value.to_ascii_lowercase().starts_with("data:") {
        return ReferenceImage::from_data_url(value);
    }
    ReferenceImage::from_path(Path::new(value))
}

fn progress_line(status: &JobStatus) -> String {
    let message = status.latest_message().unwrap_or_default();
    format!(
        "[{}] {:.0}% {}",
        status.stage.label(),
        status.progress,
        message
    )
    .trim_end()
    .to_string()
}

fn image_json(image: &ResolvedImage) -> serde_json::Value {
    let outcome = match &image.outcome {
        ResolutionOutcome::Materialized => json!({"kind": "materialized"}),
        ResolutionOutcome::Passthrough => json!({"kind": "passthrough"}),
        ResolutionOutcome::Degraded { reason } => json!({"kind": "degraded", "reason": reason}),
        ResolutionOutcome::Unusable => json!({"kind": "unusable"}),
    };
    json!({
        "id": image.id,
        "locator": image.handle.locator(),
        "local": image.handle.is_local(),
        "source": image.source,
        "prompt_used": image.prompt_used,
        "outcome": outcome,
    })
}
