//! risk-runner: headless demo runner for the riskgate pipeline.
//!
//! Feeds a pool of evaluation workers with deterministic synthetic
//! transactions, waits for the queue to drain, and prints a run summary.
//!
//! Usage:
//!   risk-runner --seed 42 --count 200 --db run.db --data-dir ./data

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use riskgate_core::config::PipelineConfig;
use riskgate_core::pipeline::RiskPipeline;
use riskgate_core::store::RiskStore;
use riskgate_core::transaction::{NewTransaction, TransactionStatus};
use std::env;
use std::time::Duration;

/// Deterministic traffic generator. All randomness in the runner flows
/// through this single seeded stream, so a given seed always produces
/// the same workload.
struct TrafficRng {
    inner: Pcg64Mcg,
}

impl TrafficRng {
    fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Heavy-tailed transaction amounts: mostly small, occasionally
    /// very large.
    fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u = self.next_f64().max(1e-10);
        x_min * u.powf(-1.0 / alpha)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let count = parse_arg(&args, "--count", 200u64);
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].to_string())
        .unwrap_or_else(|| default_db_path(seed));
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    println!("riskgate — risk-runner");
    println!("  seed:      {seed}");
    println!("  count:     {count}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!();

    let config = PipelineConfig::load(data_dir)
        .with_context(|| format!("loading pipeline config from {data_dir}"))?;
    let store = RiskStore::open(&db)?;
    store.migrate()?;

    // Fail-closed: a missing or corrupt model artifact stops the run here.
    let pipeline = RiskPipeline::build(config, store)?;
    println!("model version: {}", pipeline.model_version());

    submit_traffic(&pipeline, seed, count)?;

    if !pipeline.run_until_idle(Duration::from_secs(120)) {
        log::warn!("queue did not drain within 120s");
    }

    print_summary(&db, count)?;
    pipeline.shutdown();
    Ok(())
}

fn submit_traffic(pipeline: &RiskPipeline, seed: u64, count: u64) -> Result<()> {
    let mut rng = TrafficRng::new(seed);
    let locations = [
        "New York, US",
        "Boston, US",
        "Chicago, US",
        "London, GB",
        "Lagos, NG",
        "Singapore, SG",
    ];
    let now = Utc::now();

    for i in 0..count {
        let user = format!("user-{:03}", rng.next_u64_below(40));
        // Most users stick to a small stable device pool; a few show up
        // on a brand new device.
        let device = if rng.chance(0.08) {
            format!("dev-{}", rng.next_u64_below(1_000_000))
        } else {
            format!("dev-{}-{}", user, rng.next_u64_below(3))
        };
        let location = if rng.chance(0.05) {
            locations[(rng.next_u64_below(locations.len() as u64)) as usize]
        } else {
            locations[(rng.next_u64_below(3)) as usize]
        };
        let amount = (rng.pareto(25.0, 1.3) * 100.0).round() / 100.0;
        let minutes_ago = rng.next_u64_below(180) as i64;

        let txn = NewTransaction {
            user_id: user,
            amount: amount.min(500_000.0),
            currency: "USD".into(),
            location: Some(location.to_string()),
            device_id: Some(device),
            ip_address: Some(format!("203.0.113.{}", rng.next_u64_below(255))),
            transaction_time: now - ChronoDuration::minutes(minutes_ago),
        };
        pipeline.submit(txn)?;

        if (i + 1) % 50 == 0 {
            log::info!("submitted {}/{count} transactions", i + 1);
        }
    }
    Ok(())
}

fn print_summary(db: &str, count: u64) -> Result<()> {
    // A fresh read-side connection for the summary counts.
    let store = RiskStore::open(db)?;
    let total = store.transaction_count()?;
    let approved = store.count_with_status(TransactionStatus::Approved)?;
    let flagged = store.count_with_status(TransactionStatus::Flagged)?;
    let rejected = store.count_with_status(TransactionStatus::Rejected)?;
    let failed = store.count_with_status(TransactionStatus::EvaluationFailed)?;
    let stuck = store.count_with_status(TransactionStatus::Pending)?
        + store.count_with_status(TransactionStatus::Processing)?;
    let unresolved = store.unresolved_alert_count()?;

    println!();
    println!("=== RUN SUMMARY ===");
    println!("  submitted:      {count}");
    println!("  stored:         {total}");
    println!("  approved:       {approved}");
    println!("  flagged:        {flagged}");
    println!("  rejected:       {rejected}");
    println!("  eval failed:    {failed}");
    println!("  still pending:  {stuck}");
    println!("  open alerts:    {unresolved}");

    let alerts = store.unresolved_alerts()?;
    if !alerts.is_empty() {
        println!();
        println!("=== SAMPLE ALERTS (first 5) ===");
        for alert in alerts.iter().take(5) {
            println!("  [{}] {}", alert.alert_type.as_str(), alert.message);
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn default_db_path(seed: u64) -> String {
    let path = std::env::temp_dir().join(format!("riskgate-run-{seed}.db"));
    let path = path.to_string_lossy().into_owned();
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(format!("{path}-wal"));
    let _ = std::fs::remove_file(format!("{path}-shm"));
    path
}
