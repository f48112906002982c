//! Maintenance commands for a clinic database.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_core::{
    AcademicCalendar, Campus, CurrentYearCache, Database, PortalConfig, Scheduler,
    ServiceContext, SystemClock, User,
};

#[derive(Parser)]
#[command(name = "clinic-admin")]
#[command(about = "Maintenance commands for the campus clinic database")]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "clinic.db")]
    db: PathBuf,

    /// JSON configuration file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and schema
    Init,
    /// List academic years, newest first
    Years,
    /// Make an academic year the current one
    Activate {
        /// Academic year ID
        year_id: i64,
    },
    /// Show open slots for a day
    Slots {
        /// Date (YYYY-MM-DD)
        date: NaiveDate,
        /// Campus (a, b or c)
        campus: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("clinic_core=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PortalConfig::from_json_file(path)?,
        None => PortalConfig::default(),
    };

    let db = Database::open_with_timeout(&cli.db, Duration::from_millis(config.busy_timeout_ms))
        .with_context(|| format!("opening {}", cli.db.display()))?;
    let clock = SystemClock;
    let cache = CurrentYearCache::new();
    let ctx = ServiceContext::new(&db, &config, &clock, &cache);
    // Maintenance runs with full rights
    let operator = User::admin(0);

    match cli.command {
        Commands::Init => {
            info!(path = %cli.db.display(), "schema ready");
            println!("Initialised {}", cli.db.display());
        }
        Commands::Years => {
            let years = AcademicCalendar::new(ctx).list_years(&operator)?;
            if years.is_empty() {
                println!("No academic years found.");
            }
            for year in years {
                println!(
                    "{:>4}  {}  {} .. {}{}",
                    year.id,
                    year.label,
                    year.start,
                    year.end,
                    if year.is_current { "  (current)" } else { "" }
                );
            }
        }
        Commands::Activate { year_id } => {
            let year = AcademicCalendar::new(ctx).activate(&operator, year_id)?;
            println!("Activated {} ({})", year.label, year.id);
        }
        Commands::Slots { date, campus } => {
            let Some(campus) = Campus::parse(&campus) else {
                bail!("unknown campus {:?}, expected a, b or c", campus);
            };
            let slots = Scheduler::new(ctx).available_slots(&operator, date, campus)?;
            if slots.is_empty() {
                println!("No open slots on {} at campus {}.", date, campus.as_str());
            }
            for slot in slots {
                println!("{}", slot.format("%H:%M"));
            }
        }
    }
    Ok(())
}
