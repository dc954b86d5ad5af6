//! synd-queue - Inspect and manage the publishing queue
//!
//! Read-only views over attempts and content items for dashboards and
//! debugging, plus explicit re-scheduling of abandoned failed attempts.

use clap::{Parser, Subcommand};
use libsyndicate::queue::ExecutionQueue;
use libsyndicate::{AttemptStatus, Config, Database, PublishAttempt, Result, SyndicateError};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "synd-queue")]
#[command(version)]
#[command(about = "Inspect and manage the publishing queue")]
#[command(long_about = "\
synd-queue - Inspect and manage the publishing queue

DESCRIPTION:
    synd-queue exposes the state of the publishing pipeline: per-platform
    publish attempts, their parent content items, and the execution queue
    depth. Failed attempts that fell out of the automatic retry window can
    be re-scheduled explicitly.

COMMANDS:
    list        List publish attempts
    show        Show a content item with all of its attempts
    stats       Show pipeline statistics
    reschedule  Re-schedule an abandoned failed attempt

USAGE EXAMPLES:
    # List the most recent attempts
    synd-queue list

    # Failed attempts on one platform, as JSON
    synd-queue list --status failed --platform pixelgram --format json

    # Everything known about one content item
    synd-queue show <CONTENT_ITEM_ID>

    # Give a dead attempt another chance tomorrow morning
    synd-queue reschedule <ATTEMPT_ID> \"tomorrow 9am\"

CONFIGURATION:
    Configuration file: ~/.config/syndicate/config.toml
    Database location:  ~/.local/share/syndicate/syndicate.db

    Override with environment variables:
        SYNDICATE_CONFIG   - Path to config file
        SYNDICATE_DB_PATH  - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (bad id, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List publish attempts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Filter by platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Filter by status (pending, publishing, published, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of attempts to list
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show a content item with all of its attempts
    Show {
        /// Content item ID
        item_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show pipeline statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Re-schedule an abandoned failed attempt
    Reschedule {
        /// Attempt ID to re-schedule
        attempt_id: String,

        /// New due time (e.g., "2h", "tomorrow 9am")
        time: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = libsyndicate::config::resolve_db_path(&config.database.path);
    let db = Database::new(&db_path).await?;

    match cli.command {
        Commands::List {
            format,
            platform,
            status,
            limit,
        } => {
            cmd_list(&db, &format, platform.as_deref(), status.as_deref(), limit).await?;
        }
        Commands::Show { item_id, format } => {
            cmd_show(&db, &item_id, &format).await?;
        }
        Commands::Stats { format } => {
            cmd_stats(&db, &format).await?;
        }
        Commands::Reschedule { attempt_id, time } => {
            cmd_reschedule(&db, &attempt_id, &time).await?;
        }
    }

    Ok(())
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(SyndicateError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// List publish attempts
async fn cmd_list(
    db: &Database,
    format: &str,
    platform: Option<&str>,
    status: Option<&str>,
    limit: u32,
) -> Result<()> {
    validate_format(format)?;

    let status = match status {
        Some(s) => Some(AttemptStatus::parse(s).ok_or_else(|| {
            SyndicateError::InvalidInput(format!(
                "Invalid status '{}'. Must be pending, publishing, published, or failed",
                s
            ))
        })?),
        None => None,
    };

    let attempts = db.list_attempts(platform, status, limit).await?;

    if format == "json" {
        let json: Vec<serde_json::Value> = attempts.iter().map(attempt_json).collect();
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        for attempt in &attempts {
            println!(
                "{} | {} | {} | try {}/{} | due {}",
                attempt.id,
                attempt.platform,
                attempt.status,
                attempt.attempt_count,
                attempt.max_attempts,
                format_timestamp(attempt.due_at)
            );
        }
    }

    Ok(())
}

/// Show a content item with all of its attempts
async fn cmd_show(db: &Database, item_id: &str, format: &str) -> Result<()> {
    validate_format(format)?;

    let Some(with_attempts) = db.get_item_with_attempts(item_id).await? else {
        return Err(SyndicateError::InvalidInput(format!(
            "Content item not found: {}",
            item_id
        )));
    };

    if format == "json" {
        let json = serde_json::json!({
            "id": with_attempts.item.id,
            "body_ref": with_attempts.item.body_ref,
            "platforms": with_attempts.item.platforms,
            "status": with_attempts.item.status.as_str(),
            "created_at": with_attempts.item.created_at,
            "published_at": with_attempts.item.published_at,
            "attempts": with_attempts.attempts.iter().map(attempt_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        let item = &with_attempts.item;
        println!("Content item: {}", item.id);
        println!("  body:      {}", item.body_ref);
        println!("  platforms: {}", item.platforms.join(", "));
        println!("  status:    {}", item.status);
        if let Some(ts) = item.published_at {
            println!("  published: {}", format_timestamp(ts));
        }
        println!();
        for attempt in &with_attempts.attempts {
            println!(
                "  {} | {} | {} | try {}/{}",
                attempt.id, attempt.platform, attempt.status, attempt.attempt_count,
                attempt.max_attempts
            );
            if let Some(ref content_id) = attempt.platform_content_id {
                println!("      -> {}", content_id);
            }
            if let Some(ref error) = attempt.last_error {
                println!("      !! {}", error);
            }
        }
    }

    Ok(())
}

/// Show pipeline statistics
async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;

    let item_counts = db.item_status_counts().await?;
    let attempt_counts = db.attempt_status_counts().await?;
    let queue = ExecutionQueue::new(Arc::new(db.clone()));
    let depth = queue.depth().await?;

    if format == "json" {
        let json = serde_json::json!({
            "content_items": item_counts.iter().cloned().collect::<std::collections::BTreeMap<String, i64>>(),
            "attempts": attempt_counts.iter().cloned().collect::<std::collections::BTreeMap<String, i64>>(),
            "queue_depth": depth,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("Content items:");
        for (status, count) in &item_counts {
            println!("  {:<12} {}", status, count);
        }
        println!("Attempts:");
        for (status, count) in &attempt_counts {
            println!("  {:<12} {}", status, count);
        }
        println!("Queue depth: {}", depth);
    }

    Ok(())
}

/// Re-schedule an abandoned failed attempt
async fn cmd_reschedule(db: &Database, attempt_id: &str, time: &str) -> Result<()> {
    let due = libsyndicate::scheduling::parse_schedule(time)?;

    if db.reschedule_failed(attempt_id, due.timestamp()).await? {
        println!("Rescheduled attempt {} for {}", attempt_id, due.to_rfc3339());
        return Ok(());
    }

    // Distinguish a missing attempt from one in the wrong state.
    match db.get_attempt(attempt_id).await? {
        None => Err(SyndicateError::InvalidInput(format!(
            "Attempt not found: {}",
            attempt_id
        ))),
        Some(attempt) => Err(SyndicateError::InvalidInput(format!(
            "Only failed attempts can be rescheduled; {} is {}",
            attempt_id, attempt.status
        ))),
    }
}

fn attempt_json(attempt: &PublishAttempt) -> serde_json::Value {
    serde_json::json!({
        "id": attempt.id,
        "content_item_id": attempt.content_item_id,
        "platform": attempt.platform,
        "status": attempt.status.as_str(),
        "attempt_count": attempt.attempt_count,
        "max_attempts": attempt.max_attempts,
        "due_at": attempt.due_at,
        "platform_content_id": attempt.platform_content_id,
        "platform_content_url": attempt.platform_content_url,
        "last_error": attempt.last_error,
    })
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
