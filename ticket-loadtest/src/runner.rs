use crate::checks::{CheckSummary, CheckTally, TICKET_CHECKS};
use crate::errors::LoadTestError;
use crate::prometheus_metrics;
use crate::scenario::{IterationOutcome, ScenarioOptions, TicketScenario};
use log::{debug, error, info};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Runs a [`TicketScenario`] with a fixed pool of virtual users sharing a
/// fixed number of iterations.
pub struct Runner {
    scenario: Arc<TicketScenario>,
    options: ScenarioOptions,
}

impl Runner {
    pub fn new(options: ScenarioOptions) -> Result<Self, LoadTestError> {
        options.validate()?;
        let scenario = TicketScenario::new(options.target().clone())?;
        Ok(Self::with_scenario(scenario, options))
    }

    pub fn with_scenario(scenario: TicketScenario, options: ScenarioOptions) -> Self {
        Self {
            scenario: Arc::new(scenario),
            options,
        }
    }

    pub fn options(&self) -> &ScenarioOptions {
        &self.options
    }

    pub async fn run(&self) -> RunSummary {
        let vus = self.options.effective_vus();
        let shared = Arc::new(SharedIterations::new(
            self.options.iterations(),
            self.options.pause(),
        ));

        info!(
            "starting {} virtual users for {} iterations against {}",
            vus,
            self.options.iterations(),
            self.scenario.target()
        );
        prometheus_metrics::set_vus(vus);

        let started = Instant::now();
        let mut virtual_users = JoinSet::new();
        for vu in 0..vus {
            virtual_users.spawn(virtual_user(
                vu,
                Arc::clone(&self.scenario),
                Arc::clone(&shared),
            ));
        }

        while let Some(joined) = virtual_users.join_next().await {
            if let Err(e) = joined {
                error!("virtual user stopped unexpectedly: {}", e);
            }
        }
        let elapsed = started.elapsed();

        let summary = shared.summary(vus, elapsed);
        info!(
            "completed {} iterations in {:.2}s",
            summary.iterations,
            elapsed.as_secs_f64()
        );
        summary
    }
}

async fn virtual_user(vu: usize, scenario: Arc<TicketScenario>, shared: Arc<SharedIterations>) {
    while let Some(iteration) = shared.claim() {
        let outcome = scenario.iterate(shared.pause).await;
        debug!(
            "vu {} iteration {}: status {:?} in {:?}",
            vu, iteration, outcome.status, outcome.request_duration
        );
        shared.record(&outcome);
    }
}

/// State every virtual user of a run reads and updates.
struct SharedIterations {
    total: u64,
    pause: Duration,
    next: AtomicU64,
    completed: AtomicU64,
    http_req_failed: AtomicU64,
    durations: DurationStats,
    checks: CheckTally,
}

impl SharedIterations {
    fn new(total: u64, pause: Duration) -> Self {
        Self {
            total,
            pause,
            next: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            http_req_failed: AtomicU64::new(0),
            durations: DurationStats::default(),
            checks: CheckTally::new(&TICKET_CHECKS),
        }
    }

    fn claim(&self) -> Option<u64> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed);
        (slot < self.total).then_some(slot)
    }

    fn record(&self, outcome: &IterationOutcome) {
        self.checks.record(&outcome.checks);
        if outcome.status.is_none() {
            self.http_req_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.durations.record(outcome.duration);
        self.completed.fetch_add(1, Ordering::Relaxed);
        prometheus_metrics::record_iteration(outcome);
    }

    fn summary(&self, vus: usize, elapsed: Duration) -> RunSummary {
        let iterations = self.completed.load(Ordering::Relaxed);
        RunSummary {
            vus,
            iterations,
            http_reqs: iterations,
            http_req_failed: self.http_req_failed.load(Ordering::Relaxed),
            checks: self.checks.summary(),
            iteration_duration: self.durations.summary(),
            elapsed,
        }
    }
}

struct DurationStats {
    count: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl Default for DurationStats {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }
}

impl DurationStats {
    fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.min_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn summary(&self) -> DurationSummary {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return DurationSummary::default();
        }
        DurationSummary {
            min: Duration::from_nanos(self.min_nanos.load(Ordering::Relaxed)),
            avg: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / count),
            max: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct DurationSummary {
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub vus: usize,
    pub iterations: u64,
    pub http_reqs: u64,
    /// Requests that never got a response.
    pub http_req_failed: u64,
    pub checks: Vec<CheckSummary>,
    pub iteration_duration: DurationSummary,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|check| check.name == name)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(f, "     {check}")?;
        }
        writeln!(f)?;
        writeln!(f, "     {:.<32} {}", "iterations ", self.iterations)?;
        writeln!(
            f,
            "     {:.<32} {} (failed: {})",
            "http_reqs ", self.http_reqs, self.http_req_failed
        )?;
        writeln!(
            f,
            "     {:.<32} min={:?} avg={:?} max={:?}",
            "iteration_duration ",
            self.iteration_duration.min,
            self.iteration_duration.avg,
            self.iteration_duration.max
        )?;
        writeln!(f, "     {:.<32} {}", "vus ", self.vus)?;
        write!(f, "     {:.<32} {:.2}s", "elapsed ", self.elapsed.as_secs_f64())
    }
}
