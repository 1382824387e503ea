//! Glucolog operator CLI - seed data generation and overview queries.
//!
//! Run with: `cargo run -p glucolog-cli`

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rand::Rng;
use time::{Duration, OffsetDateTime};
use tracing::info;

use glucolog_engine::{CrossDeviceAggregator, IngestionEngine, RangeQueryEngine};
use glucolog_store::BucketStore;
use glucolog_types::{Device, DeviceKind, Measurement, User, day};

mod config;

use config::Config;

/// Glucolog - day-bucketed glucose measurement aggregation.
#[derive(Parser, Debug)]
#[command(name = "glucolog")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the store with generated users, devices, and readings.
    Seed {
        /// Number of users to create.
        #[arg(long, default_value_t = 10)]
        users: usize,

        /// Days of history per device, ending today.
        #[arg(long, default_value_t = 5)]
        days: i64,
    },

    /// Print a user's per-day overview as JSON.
    Overview {
        /// User id.
        user: String,

        /// Start date (YYYY-MM-DD); defaults to 14 days ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        end: Option<String>,
    },

    /// Print a user's per-day device reading counts as JSON.
    Devices {
        /// User id.
        user: String,

        /// Lookback window in days.
        #[arg(long, default_value_t = 14)]
        days: i64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("glucolog=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config.storage.path.clone());

    let store = Arc::new(BucketStore::open(&db_path)?);

    match args.command {
        Command::Seed { users, days } => seed(store, users, days),
        Command::Overview { user, start, end } => {
            let queries = RangeQueryEngine::new(store);
            let overview = queries.fetch_overview_str(&user, start.as_deref(), end.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
            Ok(())
        }
        Command::Devices { user, days } => {
            let aggregator = CrossDeviceAggregator::new(store);
            let overview = aggregator.devices_overview(&user, days)?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
            Ok(())
        }
    }
}

/// Device catalog the generator draws from.
const CATALOG: &[(&str, &str, DeviceKind)] = &[
    ("Acme", "X100", DeviceKind::BloodGlucose),
    ("Acme", "X200", DeviceKind::Continuous),
    ("Beta", "Y100", DeviceKind::BloodGlucose),
    ("Beta", "Y200", DeviceKind::Continuous),
    ("Gamma", "Z100", DeviceKind::Continuous),
];

/// Generate users with 1-3 devices each and readings every five minutes,
/// batched one day at a time.
fn seed(store: Arc<BucketStore>, users: usize, days: i64) -> anyhow::Result<()> {
    let ingest = IngestionEngine::new(store.clone());
    let mut rng = rand::rng();

    let start = day::day_start(
        day::truncate_to_day(OffsetDateTime::now_utc()) - Duration::days(days - 1),
    );

    let mut device_serial = 0usize;
    for u in 0..users {
        let user = User {
            id: format!("user-{u}"),
            first_name: format!("FirstName{u}"),
            last_name: format!("LastName{u}"),
            date_of_birth: time::macros::date!(1970-01-01),
            email: format!("user{u}@example.com"),
            phone_number: format!("555-010{u}"),
        };

        let device_count = rng.random_range(1..=3);
        for _ in 0..device_count {
            let (manufacturer, model, kind) = CATALOG[rng.random_range(0..CATALOG.len())];
            device_serial += 1;
            let device = Device {
                id: format!("device-{device_serial}"),
                user_id: user.id.clone(),
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                serial_number: format!("SN{device_serial:04}"),
                kind,
            };

            for d in 0..days {
                let day_start = start + Duration::days(d);
                let batch: Vec<Measurement> = (0i64..24 * 12)
                    .map(|slot| {
                        Measurement::new(
                            day_start + Duration::minutes(5 * slot),
                            rng.random_range(0..1024),
                        )
                    })
                    .collect();
                ingest.ingest_batch(&device.id, &user.id, &batch)?;
            }
        }
    }

    let buckets = store.count_buckets(None)?;
    info!("Seeded {} users; store now holds {} buckets", users, buckets);
    println!("Seeded {users} users over {days} day(s); {buckets} buckets total");
    Ok(())
}
