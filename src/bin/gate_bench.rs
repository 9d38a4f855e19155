// src/bin/gate_bench.rs

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::sync::{Barrier, Semaphore};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use admission_gate::config::{GateConfig, InMemoryConfig, RedisConfig};
use admission_gate::repository::MemoryRepository;
use admission_gate::storage::{CounterStore, MemoryStorage, RedisStorage};
use admission_gate::{AdmissionPipeline, AdmissionRequest, ClientMeta, KeyClass, SubscriptionTier};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "gate_bench",
    about = "Benchmarks the admission pipeline with concurrent clients"
)]
struct Opt {
    /// Counter store to use
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    storage: String,

    /// Redis URL (when using Redis storage)
    #[structopt(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Subscription tier of every seeded project
    #[structopt(short, long, possible_values = &["free", "pro", "enterprise"], default_value = "pro")]
    tier: String,

    /// Number of projects, each with its own secret key
    #[structopt(short, long, default_value = "10")]
    projects: usize,

    /// Number of concurrent clients to simulate
    #[structopt(short = "u", long, default_value = "50")]
    num_clients: usize,

    /// Number of requests per client
    #[structopt(short = "r", long, default_value = "200")]
    requests_per_client: usize,

    /// Maximum requests in flight
    #[structopt(short = "c", long, default_value = "100")]
    concurrency: usize,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let log_level = match opt.verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "gate_bench={},admission_gate={}",
            log_level, log_level
        )))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match opt.storage.as_str() {
        "memory" => {
            let storage = MemoryStorage::new(InMemoryConfig {
                max_entries: 1_000_000,
                use_background_task: true,
                cleanup_interval: Duration::from_secs(60),
            });
            run_benchmark(Arc::new(storage), "memory", &opt).await
        }
        "redis" => {
            let config = RedisConfig {
                url: opt.redis_url.clone(),
                connection_timeout: Duration::from_secs(5),
                command_timeout: Duration::from_millis(500),
            };
            let storage = match RedisStorage::connect(config).await {
                Ok(storage) => storage,
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    return Err(e.into());
                }
            };
            run_benchmark(Arc::new(storage), "redis", &opt).await
        }
        other => Err(format!("Unknown storage backend: {}", other).into()),
    }
}

async fn run_benchmark<S>(
    storage: Arc<S>,
    name: &str,
    opt: &Opt,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: CounterStore + 'static,
{
    let tier: SubscriptionTier = opt.tier.parse()?;
    let repo = Arc::new(MemoryRepository::new());
    let keys: Vec<String> = (0..opt.projects.max(1))
        .map(|i| {
            let project_id = repo.add_project(tier);
            let key = format!("sk_{:064x}", i as u64 + 1);
            repo.issue_key(project_id, KeyClass::Secret, &key);
            key
        })
        .collect();
    let keys = Arc::new(keys);

    let pipeline = Arc::new(AdmissionPipeline::new(storage, repo, GateConfig::default()));

    println!("\nRunning benchmark: {} counters, {} tier", name, tier);

    let total = (opt.num_clients * opt.requests_per_client) as u64;
    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let barrier = Arc::new(Barrier::new(opt.num_clients));
    let semaphore = Arc::new(Semaphore::new(opt.concurrency.max(1)));
    let start_time = Instant::now();
    let mut handles = Vec::with_capacity(opt.num_clients);

    for client_id in 0..opt.num_clients {
        let pipeline = Arc::clone(&pipeline);
        let barrier = Arc::clone(&barrier);
        let semaphore = Arc::clone(&semaphore);
        let keys = Arc::clone(&keys);
        let progress = progress.clone();
        let requests = opt.requests_per_client;
        let client = ClientMeta::new(
            format!("10.{}.{}.1", client_id / 256, client_id % 256),
            "gate_bench/1.0",
        );

        handles.push(tokio::spawn(async move {
            barrier.wait().await;

            let mut admitted = 0usize;
            let mut rejected = 0usize;
            let mut latencies = Vec::with_capacity(requests);

            for n in 0..requests {
                let Ok(_permit) = semaphore.acquire().await else {
                    break;
                };
                let key = &keys[(client_id + n) % keys.len()];
                let request = AdmissionRequest::new(KeyClass::Secret, key.as_str(), client.clone());

                let started = Instant::now();
                match pipeline.admit(&request).await {
                    Ok(_) => admitted += 1,
                    Err(rejection) => {
                        if rejection.status >= 500 {
                            warn!("Store fault during admission: {}", rejection);
                        }
                        rejected += 1;
                    }
                }
                latencies.push(started.elapsed());
                progress.inc(1);
            }

            (admitted, rejected, latencies)
        }));
    }

    let results = futures::future::join_all(handles).await;
    let elapsed = start_time.elapsed();
    progress.finish_and_clear();

    let mut admitted = 0;
    let mut rejected = 0;
    let mut latencies = Vec::with_capacity(total as usize);
    for (a, r, l) in results.into_iter().flatten() {
        admitted += a;
        rejected += r;
        latencies.extend(l);
    }
    latencies.sort();

    let completed = admitted + rejected;
    let percentile = |p: f64| -> Duration {
        if latencies.is_empty() {
            return Duration::ZERO;
        }
        let idx = ((latencies.len() as f64 - 1.0) * p).round() as usize;
        latencies[idx]
    };

    info!(completed, ?elapsed, "Benchmark finished");

    println!("\nBenchmark Results ({}):", name);
    println!("  Total Requests:     {}", completed);
    println!(
        "  Admitted:           {} ({:.1}%)",
        admitted,
        100.0 * admitted as f64 / completed.max(1) as f64
    );
    println!(
        "  Rejected:           {} ({:.1}%)",
        rejected,
        100.0 * rejected as f64 / completed.max(1) as f64
    );
    println!("  Duration:           {:?}", elapsed);
    println!(
        "  Throughput:         {:.2} requests/second",
        completed as f64 / elapsed.as_secs_f64()
    );
    println!("  Latency p50/p99:    {:?} / {:?}", percentile(0.5), percentile(0.99));

    Ok(())
}
