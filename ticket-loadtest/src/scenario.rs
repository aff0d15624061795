use crate::checks::{Check, CheckOutcome, TICKET_CHECKS};
use crate::errors::LoadTestError;
use log::warn;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use url::Url;

pub const DEFAULT_VUS: usize = 500;
pub const DEFAULT_ITERATIONS: u64 = 1000;
pub const DEFAULT_TARGET: &str = "http://localhost:8080/ticket/";
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(1);

const JSON_CONTENT_TYPE: &str = "application/json";

/// The body of every purchase request. Its content never changes between
/// iterations or virtual users.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct TicketPayload {
    pub concert_id: u64,
    pub ticket_category: u64,
}

impl TicketPayload {
    pub const fn new() -> Self {
        Self {
            concert_id: 1,
            ticket_category: 1,
        }
    }
}

impl Default for TicketPayload {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScenarioOptions {
    vus: usize,
    iterations: u64,
    target: Url,
    pause: Duration,
}

impl ScenarioOptions {
    pub fn new(target: Url) -> Self {
        Self {
            vus: DEFAULT_VUS,
            iterations: DEFAULT_ITERATIONS,
            target,
            pause: DEFAULT_PAUSE,
        }
    }

    /// Options for the stock run against [`DEFAULT_TARGET`].
    pub fn try_default() -> Result<Self, LoadTestError> {
        Ok(Self::new(Self::parse_target(DEFAULT_TARGET)?))
    }

    pub fn parse_target(target: &str) -> Result<Url, LoadTestError> {
        let url = Url::parse(target)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(LoadTestError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn with_vus(mut self, vus: usize) -> Self {
        self.vus = vus;
        self
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn vus(&self) -> usize {
        self.vus
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Virtual users beyond the iteration count would never get a slot, so
    /// they are not started.
    pub fn effective_vus(&self) -> usize {
        usize::try_from(self.iterations)
            .map_or(self.vus, |iterations| self.vus.min(iterations))
    }

    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.vus == 0 {
            return Err(LoadTestError::ZeroOption("vus"));
        }
        if self.iterations == 0 {
            return Err(LoadTestError::ZeroOption("iterations"));
        }
        match self.target.scheme() {
            "http" | "https" => Ok(()),
            other => Err(LoadTestError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// What a single request/check/pause cycle observed.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    /// `None` when the request never got a response.
    pub status: Option<StatusCode>,
    pub request_duration: Duration,
    pub checks: [CheckOutcome; TICKET_CHECKS.len()],
    pub duration: Duration,
}

impl IterationOutcome {
    pub fn check(&self, name: &str) -> Option<bool> {
        self.checks
            .iter()
            .find(|outcome| outcome.name == name)
            .map(|outcome| outcome.passed)
    }
}

pub struct TicketScenario {
    client: Client,
    target: Url,
}

impl TicketScenario {
    pub fn new(target: Url) -> Result<Self, LoadTestError> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, target))
    }

    pub fn with_client(client: Client, target: Url) -> Self {
        Self { client, target }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn checks(&self) -> &'static [Check] {
        &TICKET_CHECKS
    }

    pub fn request(&self) -> RequestBuilder {
        self.client
            .post(self.target.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .json(&TicketPayload::new())
    }

    pub async fn iterate(&self, pause: Duration) -> IterationOutcome {
        let started = Instant::now();

        let status = match self.request().send().await {
            Ok(response) => {
                let status = response.status();
                // Drain so the connection goes back to the pool.
                let _ = response.bytes().await;
                Some(status)
            }
            Err(e) => {
                warn!("request to {} failed: {}", self.target, e);
                None
            }
        };
        let request_duration = started.elapsed();

        let checks = TICKET_CHECKS.map(|check| check.evaluate(status));

        tokio::time::sleep(pause).await;

        IterationOutcome {
            status,
            request_duration,
            checks,
            duration: started.elapsed(),
        }
    }
}
