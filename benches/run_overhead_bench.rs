// Supervision overhead benchmark
// Measures what a supervised run costs on top of the work itself:
// fork + launch ack + report + reap for trivial work, and how far past the
// deadline an overrunning run returns.

use std::sync::Arc;
use std::time::{Duration, Instant};
use timebox::workload::prime::{nth_prime, PrimeError};
use timebox::{EventSink, ExecutionEvent, Outcome, Supervisor};

const ITERATIONS: usize = 100;
const WARMUP_ITERATIONS: usize = 10;
const OVERRUN_ITERATIONS: usize = 20;

struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ExecutionEvent) {}
}

/// Latency percentiles
struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();

        let pick = |q: f64| samples[((len as f64 * q) as usize).min(len - 1)];
        let sum: Duration = samples.iter().sum();

        Self {
            p50: pick(0.50),
            p95: pick(0.95),
            p99: pick(0.99),
            min: samples[0],
            max: samples[len - 1],
            mean: sum / len as u32,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    passed: bool,
    reason: Option<String>,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Latency");

        match &self.reason {
            None => println!("PASS"),
            Some(reason) => println!("FAIL: {}", reason),
        }
    }
}

fn judge(
    scenario: &str,
    samples: Vec<Duration>,
    p50_budget: Duration,
    p95_budget: Duration,
) -> BenchmarkResult {
    let stats = LatencyStats::from_samples(samples);
    let passed = stats.p50 < p50_budget && stats.p95 < p95_budget;
    let reason = (!passed).then(|| {
        format!(
            "p50={:?} (target <{:?}), p95={:?} (target <{:?})",
            stats.p50, p50_budget, stats.p95, p95_budget
        )
    });

    BenchmarkResult {
        scenario: scenario.to_string(),
        stats,
        passed,
        reason,
    }
}

/// Wall time of a supervised no-op.
fn benchmark_trivial_run(supervisor: &Supervisor) -> BenchmarkResult {
    let run = || {
        let outcome: Outcome<u32, String> = supervisor
            .run(|| Ok(1), Duration::from_secs(5))
            .expect("trivial run");
        assert!(outcome.is_completed());
    };

    for _ in 0..WARMUP_ITERATIONS {
        run();
    }

    let samples = (0..ITERATIONS)
        .map(|_| {
            let start = Instant::now();
            run();
            start.elapsed()
        })
        .collect();

    judge(
        "Trivial work",
        samples,
        Duration::from_millis(20),
        Duration::from_millis(50),
    )
}

/// Supervised minus in-process time for a small prime search.
fn benchmark_prime_overhead(supervisor: &Supervisor) -> BenchmarkResult {
    let samples = (0..ITERATIONS)
        .map(|_| {
            let start = Instant::now();
            let _ = nth_prime(500);
            let direct = start.elapsed();

            let start = Instant::now();
            let outcome: Outcome<u64, PrimeError> = supervisor
                .run(|| nth_prime(500), Duration::from_secs(5))
                .expect("prime run");
            let supervised = start.elapsed();
            assert_eq!(outcome.value(), Some(&3571));

            supervised.saturating_sub(direct)
        })
        .collect();

    judge(
        "Prime search overhead",
        samples,
        Duration::from_millis(20),
        Duration::from_millis(50),
    )
}

/// How long past the deadline an overrunning run returns.
fn benchmark_overrun_return(supervisor: &Supervisor) -> BenchmarkResult {
    let deadline = Duration::from_millis(50);
    let samples = (0..OVERRUN_ITERATIONS)
        .map(|_| {
            let start = Instant::now();
            let outcome: Outcome<u32, String> = supervisor
                .run(
                    || loop {
                        std::hint::spin_loop();
                    },
                    deadline,
                )
                .expect("overrun run");
            assert!(outcome.is_timed_out());
            start.elapsed().saturating_sub(deadline)
        })
        .collect();

    judge(
        "Overrun kill latency",
        samples,
        Duration::from_millis(30),
        Duration::from_millis(100),
    )
}

fn main() {
    println!("=== timebox Supervision Overhead Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let supervisor = Supervisor::new(Arc::new(NullSink));
    let results = vec![
        benchmark_trivial_run(&supervisor),
        benchmark_prime_overhead(&supervisor),
        benchmark_overrun_return(&supervisor),
    ];

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.passed).count();
    let total_count = results.len();

    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, total_count);

    if passed_count == total_count {
        println!("All overhead budgets met");
        std::process::exit(0);
    } else {
        println!("Some overhead budgets exceeded");
        std::process::exit(1);
    }
}
