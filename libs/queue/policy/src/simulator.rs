//! M/M/c step simulation.
//!
//! Service rate μ = 1/processing_timeout, server count c = max_concurrency,
//! capacity K = queue_size. Per step Δt the simulator samples arrivals
//! ~ Poisson(λ(t)·Δt), serves at the effective throughput
//! c·μ·(1 − failure_rate)/retry_multiplier, clamps the backlog to K, and
//! records a snapshot. Wait-time percentiles come from Little's law over the
//! snapshot series.

use crate::error::{PolicyError, PolicyResult};
use crate::model::Policy;
use crate::traffic::{PatternKind, TrafficPattern};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

/// Simulator tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SimulatorConfig {
    /// Step size Δt in seconds
    pub time_step_s: f64,
    /// Probability a handler invocation fails; must be in [0, 1]
    pub failure_rate: f64,
    /// RNG seed so runs are reproducible
    pub seed: u64,
    /// Estimated resident bytes per backlogged job
    pub memory_per_job_bytes: u64,
    /// Mean seconds between bursty-pattern bursts
    pub burst_interval_s: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            time_step_s: 1.0,
            failure_rate: 0.05,
            seed: 42,
            memory_per_job_bytes: 4096,
            burst_interval_s: 30.0,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> PolicyResult<()> {
        if self.time_step_s <= 0.0 {
            return Err(PolicyError::InvalidConfiguration(
                "time step must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(PolicyError::InvalidConfiguration(
                "failure rate must be in [0, 1]".to_string(),
            ));
        }
        if self.burst_interval_s <= 0.0 {
            return Err(PolicyError::InvalidConfiguration(
                "burst interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One time-step observation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Snapshot {
    pub t_s: f64,
    pub arrival_rate: f64,
    pub arrivals: u64,
    pub served: u64,
    pub backlog: u64,
    pub dropped: u64,
    /// Offered load over capacity for this step
    pub utilization: f64,
    /// Little's-law wait estimate for this step, seconds
    pub wait_s: f64,
}

/// Aggregated predictions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SimulationMetrics {
    pub avg_backlog: f64,
    pub max_backlog: u64,
    pub p95_wait_s: f64,
    pub p99_wait_s: f64,
    /// Served jobs per second over the window
    pub throughput: f64,
    pub avg_utilization: f64,
    pub failure_rate: f64,
    /// Extra attempts per job implied by the retry policy
    pub retry_rate: f64,
    /// Share of jobs expected to exhaust retries
    pub dlq_rate: f64,
    pub dropped_jobs: u64,
    pub est_memory_bytes: u64,
    /// Expected busy servers
    pub est_cpu_cores: f64,
}

/// Lifecycle of a simulation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A completed (or failed) simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Simulation {
    pub id: Uuid,
    pub policy: Policy,
    pub traffic: TrafficPattern,
    pub config: SimulatorConfig,
    pub status: SimulationStatus,
    pub metrics: Option<SimulationMetrics>,
    pub timeline: Vec<Snapshot>,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The queueing-model simulator.
pub struct Simulator;

impl Simulator {
    /// Run the model; never touches production state.
    pub fn run(
        policy: Policy,
        traffic: TrafficPattern,
        config: SimulatorConfig,
    ) -> PolicyResult<Simulation> {
        policy.validate()?;
        traffic.validate()?;
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mu = policy.service_rate();
        let servers = policy.max_concurrency as f64;
        let capacity = policy.queue_size;

        // Expected attempts per job under the retry policy: geometric series
        // over the failure probability, truncated at max_retries
        let retry_multiplier = expected_attempts(config.failure_rate, policy.retry.max_retries);
        let effective_rate = servers * mu * (1.0 - config.failure_rate) / retry_multiplier;

        let steps = (traffic.duration_s / config.time_step_s).ceil() as usize;
        let mut timeline = Vec::with_capacity(steps);
        let mut backlog: u64 = 0;
        let mut total_served: u64 = 0;
        let mut total_dropped: u64 = 0;
        let mut overload_steps = 0usize;

        // Bursty patterns scatter multipliers at Poisson-spaced instants
        let mut burst_multiplier = 1.0;
        let mut next_burst_at = 0.0;

        for step in 0..steps {
            let t = step as f64 * config.time_step_s;

            if traffic.kind == PatternKind::Bursty && t >= next_burst_at {
                burst_multiplier = if burst_multiplier > 1.0 {
                    1.0
                } else {
                    rng.random_range(2.0..6.0)
                };
                next_burst_at = t + sample_exponential(&mut rng, config.burst_interval_s);
            }

            let arrival_rate = traffic.rate_at(t, burst_multiplier);
            let arrivals = sample_poisson(&mut rng, arrival_rate * config.time_step_s);
            let service_budget = (effective_rate * config.time_step_s) as u64;

            let offered = backlog + arrivals;
            let served = offered.min(service_budget);
            let mut remaining = offered - served;

            let dropped = remaining.saturating_sub(capacity);
            remaining = remaining.min(capacity);
            backlog = remaining;
            total_served += served;
            total_dropped += dropped;

            let utilization = if effective_rate > 0.0 {
                arrival_rate / effective_rate
            } else {
                f64::INFINITY
            };
            if utilization >= 1.0 {
                overload_steps += 1;
            }

            // Little's law: L = λW, so W = L / λ_effective
            let wait_s = if effective_rate > 0.0 {
                backlog as f64 / effective_rate
            } else {
                f64::INFINITY
            };

            timeline.push(Snapshot {
                t_s: t,
                arrival_rate,
                arrivals,
                served,
                backlog,
                dropped,
                utilization,
                wait_s,
            });
        }

        let metrics = summarize(
            &timeline,
            &config,
            &policy,
            retry_multiplier,
            total_served,
            total_dropped,
            traffic.duration_s,
        );
        let warnings = collect_warnings(&metrics, overload_steps, steps, capacity);

        Ok(Simulation {
            id: Uuid::new_v4(),
            policy,
            traffic,
            config,
            status: SimulationStatus::Completed,
            metrics: Some(metrics),
            timeline,
            warnings,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        })
    }
}

/// Expected handler attempts per job: 1 + p + p² + … up to max_retries+1 terms.
fn expected_attempts(failure_rate: f64, max_retries: u32) -> f64 {
    let p = failure_rate.clamp(0.0, 1.0);
    let mut attempts = 0.0;
    let mut term = 1.0;
    for _ in 0..=max_retries {
        attempts += term;
        term *= p;
    }
    attempts.max(1.0)
}

/// Knuth's method for small λ, normal approximation past it.
fn sample_poisson(rng: &mut StdRng, lambda: f64) -> u64 {
    if lambda <= 0.0 {
        return 0;
    }
    if lambda > 30.0 {
        // Box-Muller normal approximation
        let u1: f64 = rng.random_range(f64::EPSILON..1.0);
        let u2: f64 = rng.random_range(0.0..1.0);
        let gaussian = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        return (lambda + lambda.sqrt() * gaussian).max(0.0).round() as u64;
    }

    let limit = (-lambda).exp();
    let mut product: f64 = rng.random_range(0.0..1.0);
    let mut count = 0u64;
    while product > limit {
        count += 1;
        product *= rng.random_range(0.0..1.0_f64);
    }
    count
}

fn sample_exponential(rng: &mut StdRng, mean: f64) -> f64 {
    let u: f64 = rng.random_range(f64::EPSILON..1.0);
    -mean * u.ln()
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[allow(clippy::too_many_arguments)]
fn summarize(
    timeline: &[Snapshot],
    config: &SimulatorConfig,
    policy: &Policy,
    retry_multiplier: f64,
    total_served: u64,
    total_dropped: u64,
    duration_s: f64,
) -> SimulationMetrics {
    let backlogs: Vec<u64> = timeline.iter().map(|s| s.backlog).collect();
    let avg_backlog = if backlogs.is_empty() {
        0.0
    } else {
        backlogs.iter().sum::<u64>() as f64 / backlogs.len() as f64
    };
    let max_backlog = backlogs.iter().copied().max().unwrap_or(0);

    let mut waits: Vec<f64> = timeline.iter().map(|s| s.wait_s).collect();
    waits.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let avg_utilization = if timeline.is_empty() {
        0.0
    } else {
        timeline.iter().map(|s| s.utilization).sum::<f64>() / timeline.len() as f64
    };

    // Share of jobs failing every allowed attempt
    let dlq_rate = config
        .failure_rate
        .powi(policy.retry.max_retries as i32 + 1);

    SimulationMetrics {
        avg_backlog,
        max_backlog,
        p95_wait_s: percentile(&waits, 0.95),
        p99_wait_s: percentile(&waits, 0.99),
        throughput: total_served as f64 / duration_s,
        avg_utilization,
        failure_rate: config.failure_rate,
        retry_rate: retry_multiplier - 1.0,
        dlq_rate,
        dropped_jobs: total_dropped,
        est_memory_bytes: max_backlog * config.memory_per_job_bytes,
        est_cpu_cores: (avg_utilization * policy.max_concurrency as f64)
            .min(policy.max_concurrency as f64),
    }
}

fn collect_warnings(
    metrics: &SimulationMetrics,
    overload_steps: usize,
    steps: usize,
    capacity: u64,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if steps > 0 && overload_steps as f64 / steps as f64 > 0.2 {
        warnings.push(format!(
            "arrival rate exceeds effective capacity for {}% of the window",
            (100 * overload_steps) / steps
        ));
    }
    if metrics.dropped_jobs > 0 {
        warnings.push(format!(
            "queue capacity {} saturated; {} jobs dropped",
            capacity, metrics.dropped_jobs
        ));
    }
    if metrics.dlq_rate > 0.01 {
        warnings.push(format!(
            "predicted DLQ rate {:.2}% exceeds 1%",
            metrics.dlq_rate * 100.0
        ));
    }

    warnings
}

/// In-memory record store consumed by the admin surface.
#[derive(Default)]
pub struct SimulationStore {
    simulations: Mutex<HashMap<Uuid, Simulation>>,
}

impl SimulationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, simulation: Simulation) -> Uuid {
        let id = simulation.id;
        self.simulations.lock().unwrap().insert(id, simulation);
        id
    }

    pub fn get(&self, id: Uuid) -> PolicyResult<Simulation> {
        self.simulations
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(PolicyError::SimulationNotFound(id))
    }

    /// Newest first, optionally filtered by status.
    pub fn list(&self, limit: usize, status: Option<SimulationStatus>) -> Vec<Simulation> {
        let simulations = self.simulations.lock().unwrap();
        let mut all: Vec<Simulation> = simulations
            .values()
            .filter(|s| status.map(|wanted| s.status == wanted).unwrap_or(true))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy() -> Policy {
        // μ = 10 jobs/s per server, c = 4 -> raw capacity 40 jobs/s
        Policy::new("q")
            .with_concurrency(4)
            .with_processing_timeout(Duration::from_millis(100))
    }

    #[test]
    fn test_underloaded_system_keeps_small_backlog() {
        let traffic = TrafficPattern::new(PatternKind::Constant, 10.0, 120.0);
        let simulation =
            Simulator::run(fast_policy(), traffic, SimulatorConfig::default()).unwrap();

        assert_eq!(simulation.status, SimulationStatus::Completed);
        let metrics = simulation.metrics.unwrap();
        assert!(metrics.avg_backlog < 5.0, "avg backlog {}", metrics.avg_backlog);
        assert!(metrics.avg_utilization < 0.5);
        // Throughput tracks the offered load
        assert!((metrics.throughput - 10.0).abs() < 2.0);
        assert!(simulation.warnings.is_empty());
    }

    #[test]
    fn test_overloaded_system_warns_and_grows_backlog() {
        // Offered 100 jobs/s against ~36 effective
        let traffic = TrafficPattern::new(PatternKind::Constant, 100.0, 60.0);
        let simulation =
            Simulator::run(fast_policy(), traffic, SimulatorConfig::default()).unwrap();

        let metrics = simulation.metrics.unwrap();
        assert!(metrics.max_backlog > 1000);
        assert!(metrics.avg_utilization > 1.0);
        assert!(
            simulation
                .warnings
                .iter()
                .any(|w| w.contains("exceeds effective capacity")),
            "warnings: {:?}",
            simulation.warnings
        );
    }

    #[test]
    fn test_capacity_clamp_drops_jobs() {
        let policy = fast_policy().with_queue_size(100);
        let traffic = TrafficPattern::new(PatternKind::Constant, 200.0, 60.0);
        let simulation = Simulator::run(policy, traffic, SimulatorConfig::default()).unwrap();

        let metrics = simulation.metrics.unwrap();
        assert!(metrics.dropped_jobs > 0);
        assert!(metrics.max_backlog <= 100);
        assert!(simulation.warnings.iter().any(|w| w.contains("saturated")));
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let traffic = TrafficPattern::new(PatternKind::Bursty, 20.0, 60.0);
        let a = Simulator::run(fast_policy(), traffic.clone(), SimulatorConfig::default()).unwrap();
        let b = Simulator::run(fast_policy(), traffic, SimulatorConfig::default()).unwrap();

        let backlogs =
            |s: &Simulation| s.timeline.iter().map(|x| x.backlog).collect::<Vec<_>>();
        assert_eq!(backlogs(&a), backlogs(&b));
    }

    #[test]
    fn test_timeline_covers_window() {
        let traffic = TrafficPattern::new(PatternKind::Constant, 5.0, 30.0);
        let config = SimulatorConfig {
            time_step_s: 0.5,
            ..Default::default()
        };
        let simulation = Simulator::run(fast_policy(), traffic, config).unwrap();
        assert_eq!(simulation.timeline.len(), 60);
        assert_eq!(simulation.timeline[0].t_s, 0.0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let traffic = TrafficPattern::new(PatternKind::Constant, 5.0, 30.0);
        let config = SimulatorConfig {
            failure_rate: 1.5,
            ..Default::default()
        };
        assert!(Simulator::run(fast_policy(), traffic, config).is_err());
    }

    #[test]
    fn test_expected_attempts() {
        assert_eq!(expected_attempts(0.0, 3), 1.0);
        // p = 0.5, 3 retries: 1 + 0.5 + 0.25 + 0.125
        assert!((expected_attempts(0.5, 3) - 1.875).abs() < 1e-9);
    }

    #[test]
    fn test_poisson_sampler_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 10_000;
        let sum: u64 = (0..n).map(|_| sample_poisson(&mut rng, 4.0)).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - 4.0).abs() < 0.2, "sampled mean {}", mean);
    }

    #[test]
    fn test_store_list_and_filter() {
        let store = SimulationStore::new();
        let traffic = TrafficPattern::new(PatternKind::Constant, 5.0, 10.0);
        let mut failed =
            Simulator::run(fast_policy(), traffic.clone(), SimulatorConfig::default()).unwrap();
        failed.status = SimulationStatus::Failed;
        let completed =
            Simulator::run(fast_policy(), traffic, SimulatorConfig::default()).unwrap();

        store.insert(failed);
        let completed_id = store.insert(completed);

        assert_eq!(store.list(10, None).len(), 2);
        let only_completed = store.list(10, Some(SimulationStatus::Completed));
        assert_eq!(only_completed.len(), 1);
        assert_eq!(only_completed[0].id, completed_id);

        assert!(store.get(completed_id).is_ok());
        assert!(store.get(Uuid::new_v4()).is_err());
    }
}
