//! tracker2gcal - updates a Google Calendar with releases from a Pivotal Tracker project.
//!
//! Every calendar event whose title contains "[release" is deleted, then one
//! all-day event is created per release story in the project.

mod config;
mod providers;

use anyhow::Result;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracker_core::{CalendarRemote, ReleaseSource, ReleaseSync};

use config::SyncOptions;
use providers::gcal::GoogleCalendar;
use providers::tracker::TrackerClient;

#[derive(Parser)]
#[command(name = "tracker2gcal")]
#[command(about = "Update a Google Calendar with the releases of a Pivotal Tracker project")]
struct Cli {
    /// File containing authentication details
    #[arg(short = 'u', long = "credentials-file", value_name = "PATH")]
    credentials: Option<PathBuf>,

    /// Target calendar ID (from the calendar's settings pane)
    #[arg(short = 'c', long, value_name = "ID")]
    calendar_id: String,

    /// Tracker project ID (from the project's URL)
    #[arg(short = 't', long, value_name = "ID")]
    tracker_id: u64,

    /// The base URL of the Tracker API (including trailing slash)
    #[arg(short = 'b', long, value_name = "URL", default_value = config::DEFAULT_TRACKER_BASE_API_URL)]
    tracker_base_api_url: String,

    /// Show what would change without touching the calendar
    #[arg(long)]
    dry_run: bool,

    /// Print the dry-run plan as JSON
    #[arg(long, requires = "dry_run")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let options = SyncOptions::validate(cli.tracker_id, &cli.calendar_id, &cli.tracker_base_api_url)?;

    let credentials_path = match cli.credentials {
        Some(path) => path,
        None => config::default_credentials_path()?,
    };
    let credentials = config::load_credentials(&credentials_path)?;

    let calendar = GoogleCalendar::new(&options.calendar_id, &credentials.calendar.access_token);
    let tracker = TrackerClient::connect(
        options.tracker_base_api_url.clone(),
        options.tracker_id,
        &credentials.tracker.auth()?,
    )
    .await?;

    let sync = ReleaseSync::new(tracker, calendar);

    if cli.dry_run {
        cmd_plan(&sync, cli.json).await
    } else {
        cmd_sync(&sync).await
    }
}

async fn cmd_plan<S: ReleaseSource, C: CalendarRemote>(
    sync: &ReleaseSync<S, C>,
    json: bool,
) -> Result<()> {
    let plan = sync.plan().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if !plan.to_delete.is_empty() {
        println!("To delete:");
        for event in &plan.to_delete {
            println!("  - {}", event.title);
        }
    }

    if !plan.to_insert.is_empty() {
        println!("To create:");
        for event in &plan.to_insert {
            println!("  + {} ({})", event.title, event.start_day);
        }
    }

    if !plan.failures.is_empty() {
        println!("Cannot sync:");
        for failure in &plan.failures {
            println!("  ! {}: {}", failure.item, failure.reason);
        }
    }

    if plan.to_delete.is_empty() && plan.to_insert.is_empty() && plan.failures.is_empty() {
        println!("No releases to sync.");
    }

    Ok(())
}

async fn cmd_sync<S: ReleaseSource, C: CalendarRemote>(sync: &ReleaseSync<S, C>) -> Result<()> {
    let report = sync.run().await?;

    println!(
        "{} deleted, {} created",
        report.deleted, report.inserted
    );

    if !report.is_clean() {
        anyhow::bail!(
            "{} deletions, {} inserts and {} stories failed (see log for details)",
            report.delete_failures.len(),
            report.insert_failures.len(),
            report.story_failures.len()
        );
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TRACKER2GCAL_LOG")
        .unwrap_or_else(|_| EnvFilter::new("tracker2gcal=info,tracker_core=info,warn"));

    let format = env::var("TRACKER2GCAL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}
