// src/bin/gate_sim.rs

use prettytable::{row, Table};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use admission_gate::config::{GateConfig, InMemoryConfig};
use admission_gate::repository::MemoryRepository;
use admission_gate::storage::MemoryStorage;
use admission_gate::{AdmissionPipeline, AdmissionRequest, ClientMeta, KeyClass, SubscriptionTier};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "gate_sim",
    about = "Simulates one client against a seeded project using in-memory stores"
)]
struct Opt {
    /// Subscription tier of the seeded project
    #[structopt(short, long, possible_values = &["free", "pro", "enterprise"], default_value = "free")]
    tier: String,

    /// Key class the client presents
    #[structopt(short, long, possible_values = &["public", "secret"], default_value = "secret")]
    class: String,

    /// Events already recorded this month for the project
    #[structopt(short, long, default_value = "0")]
    events: usize,

    /// Present a malformed key on every n-th request (0 disables)
    #[structopt(long, default_value = "0")]
    malformed_every: usize,

    /// Simulation mode
    #[structopt(long, possible_values = &["burst", "steady"], default_value = "burst")]
    simulation: String,

    /// Number of requests to simulate
    #[structopt(short = "n", long, default_value = "250")]
    num_requests: usize,

    /// Time between requests in milliseconds (steady mode)
    #[structopt(short = "i", long, default_value = "100")]
    request_interval_ms: u64,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "gate_sim={},admission_gate={}",
            log_level, log_level
        )))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let tier: SubscriptionTier = opt.tier.parse()?;
    let class = match opt.class.as_str() {
        "public" => KeyClass::Public,
        _ => KeyClass::Secret,
    };

    let storage = Arc::new(MemoryStorage::new(InMemoryConfig::default()));
    let repo = Arc::new(MemoryRepository::new());
    let project_id = repo.add_project(tier);
    let key = match class {
        KeyClass::Public => format!("supm_{:032x}", 0x5eed_u64),
        KeyClass::Secret => format!("sk_{:064x}", 0x5eed_u64),
    };
    repo.issue_key(project_id, class, &key);
    repo.record_events(project_id, opt.events, chrono::Utc::now());

    let pipeline = AdmissionPipeline::new(storage, repo, GateConfig::default());
    let client = ClientMeta::new("192.0.2.44", "gate_sim/1.0");

    info!(%project_id, tier = %tier, class = %class, "Seeded project");

    let interval = match opt.simulation.as_str() {
        "steady" => Some(Duration::from_millis(opt.request_interval_ms)),
        _ => None,
    };

    // outcome -> (count, first request number that saw it)
    let mut outcomes: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let start_time = Instant::now();

    for i in 1..=opt.num_requests {
        let request_time = Instant::now();
        let presented = if opt.malformed_every > 0 && i % opt.malformed_every == 0 {
            "not-a-key".to_string()
        } else {
            key.clone()
        };
        let request = AdmissionRequest::new(class, presented, client.clone());

        let outcome = match pipeline.admit(&request).await {
            Ok(_) => "200 Admitted".to_string(),
            Err(rejection) => {
                warn!(request = i, status = rejection.status, stage = ?rejection.stage, "Rejected");
                format!("{} {}", rejection.status, rejection.message)
            }
        };
        outcomes.entry(outcome).or_insert((0, i)).0 += 1;

        if let Some(interval) = interval {
            let elapsed = request_time.elapsed();
            if elapsed < interval {
                time::sleep(interval - elapsed).await;
            }
        }
    }

    let elapsed = start_time.elapsed();

    let mut table = Table::new();
    table.add_row(row!["Outcome", "Requests", "First seen at"]);
    for (outcome, (count, first)) in &outcomes {
        table.add_row(row![outcome, count, first]);
    }

    println!(
        "\n{} simulation: {} tier, {} key, {} requests in {:?}",
        opt.simulation, tier, class, opt.num_requests, elapsed
    );
    table.printstd();

    Ok(())
}
