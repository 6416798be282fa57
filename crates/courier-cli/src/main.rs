//! `courier` - run the dispatch pipeline in-process.
//!
//! Submits one job, runs workers until it is terminal, and prints the
//! delivery report.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use courier_core::app::App;
use courier_core::domain::{ExportRow, JobStatus, NotificationRequest, ReportExport};
use courier_core::impls::{LoggingGateway, ScriptedGateway};
use courier_core::ports::DeliveryGateway;
use courier_core::{AppBuilder, CourierConfig};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bulk-email dispatch with per-recipient delivery reports
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Dispatch a bulk email and print its delivery report", long_about = None)]
#[command(version)]
struct Cli {
    /// Report output format
    #[arg(long, value_enum, default_value_t = Format::Json, global = true)]
    format: Format,

    /// Give up waiting for the job after this many seconds
    #[arg(long, default_value = "120", global = true)]
    wait_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one message to a list of recipients
    Send {
        /// Recipient address (repeatable, or comma separated)
        #[arg(long = "to", value_delimiter = ',', required_unless_present = "request")]
        to: Vec<String>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long, required_unless_present = "request")]
        body: Option<String>,

        /// Read the request from a JSON file instead (`recipients` or `emailLists`, `body`, `subject`)
        #[arg(long, conflicts_with_all = ["to", "body", "subject"])]
        request: Option<PathBuf>,

        /// Log message bodies as well (logging gateway only)
        #[arg(long)]
        log_body: bool,
    },
    /// Run a job against a scripted gateway that rejects some recipients
    Demo {
        /// Number of generated recipients
        #[arg(long, default_value = "7")]
        recipients: usize,

        /// Every n-th recipient is rejected
        #[arg(long, default_value = "3")]
        fail_every: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Table,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = CourierConfig::from_env().context("loading configuration")?;
    let wait = Duration::from_secs(cli.wait_secs);

    let (gateway, request) = match cli.command {
        Commands::Send {
            to,
            subject,
            body,
            request,
            log_body,
        } => {
            let request = match request {
                Some(path) => read_request(&path)?,
                None => {
                    let request = NotificationRequest::new(to, body.unwrap_or_default());
                    match subject {
                        Some(subject) => request.with_subject(subject),
                        None => request,
                    }
                }
            };
            (send_gateway(log_body)?, request)
        }
        Commands::Demo {
            recipients,
            fail_every,
        } => demo(recipients, fail_every),
    };

    let app = AppBuilder::new(config)
        .gateway(gateway)
        .build()
        .context("building pipeline")?;

    let export = run_job(&app, request, wait).await?;
    print_export(&export, cli.format)?;
    Ok(())
}

fn read_request(path: &Path) -> anyhow::Result<NotificationRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading request file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing request file {}", path.display()))
}

#[cfg(feature = "smtp")]
fn smtp_gateway() -> anyhow::Result<Option<Arc<dyn DeliveryGateway>>> {
    use courier_core::impls::SmtpGateway;

    let Ok(host) = std::env::var("COURIER_SMTP_HOST") else {
        return Ok(None);
    };
    let port: u16 = match std::env::var("COURIER_SMTP_PORT") {
        Ok(port) => port.parse().context("COURIER_SMTP_PORT")?,
        Err(_) => 587,
    };

    let mut builder = SmtpGateway::new(&host, port);
    if let (Ok(user), Ok(pass)) = (
        std::env::var("COURIER_SMTP_USERNAME"),
        std::env::var("COURIER_SMTP_PASSWORD"),
    ) {
        builder = builder.credentials(&user, &pass);
    }
    if let Ok(from) = std::env::var("COURIER_SMTP_FROM") {
        builder = builder.from(&from);
    }
    if std::env::var("COURIER_SMTP_PLAINTEXT").is_ok_and(|v| v == "1" || v == "true") {
        builder = builder.dangerous_plaintext();
    }

    info!(host = %host, port, "using smtp gateway");
    Ok(Some(Arc::new(builder.build()?)))
}

#[cfg(not(feature = "smtp"))]
fn smtp_gateway() -> anyhow::Result<Option<Arc<dyn DeliveryGateway>>> {
    Ok(None)
}

fn send_gateway(log_body: bool) -> anyhow::Result<Arc<dyn DeliveryGateway>> {
    if let Some(gateway) = smtp_gateway()? {
        return Ok(gateway);
    }
    info!("no smtp relay configured, messages are only logged");
    Ok(Arc::new(LoggingGateway::new().log_body(log_body)))
}

fn demo(recipients: usize, fail_every: usize) -> (Arc<dyn DeliveryGateway>, NotificationRequest) {
    let addresses: Vec<String> = (1..=recipients)
        .map(|i| format!("user{i}@example.com"))
        .collect();

    let failing = addresses
        .iter()
        .enumerate()
        .filter(|(i, _)| fail_every > 0 && (i + 1) % fail_every == 0)
        .map(|(_, address)| address.clone());

    // later recipients answer first, so completion order differs from input order
    let gateway = addresses
        .iter()
        .enumerate()
        .fold(ScriptedGateway::new().failing(failing), |gateway, (i, address)| {
            let delay = Duration::from_millis(((recipients - i) * 20) as u64);
            gateway.delay_for(address.clone(), delay)
        });

    let request = NotificationRequest::new(addresses, "This is a demo notification.")
        .with_subject("Courier demo");
    (Arc::new(gateway), request)
}

async fn run_job(
    app: &App,
    request: NotificationRequest,
    wait: Duration,
) -> anyhow::Result<ReportExport> {
    let workers = app.start_workers();

    let job_id = match app.submission.submit(request).await {
        Ok(id) => id,
        Err(e) => {
            workers.shutdown_and_join().await;
            return Err(e).context("submission rejected");
        }
    };
    info!(job_id = %job_id, "submitted");

    let finished = tokio::select! {
        result = tokio::time::timeout(wait, app.status.wait_until_terminal(job_id, POLL_INTERVAL)) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!(job_id = %job_id, "interrupted, stopping workers");
            workers.shutdown_and_join().await;
            bail!("interrupted before job {job_id} finished");
        }
    };
    workers.shutdown_and_join().await;

    let view = finished
        .with_context(|| format!("job {job_id} did not finish within {}s", wait.as_secs()))??;
    let queue = app.status.queue().await?;
    info!(
        job_id = %job_id,
        status = %view.status,
        runs = view.runs,
        dead = queue.dead,
        "job finished"
    );

    if view.status != JobStatus::Completed {
        bail!("job {job_id} ended as {}", view.status);
    }
    Ok(app.reports.export(job_id).await?)
}

fn print_export(export: &ReportExport, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(export)?),
        Format::Table => {
            println!("{}", ExportRow::COLUMNS.join("\t"));
            for row in &export.rows {
                println!("{}", row.cells().join("\t"));
            }
            println!(
                "\ntotal={} success={} failure={}",
                export.counts.total, export.counts.success, export.counts.failure
            );
        }
    }
    Ok(())
}
