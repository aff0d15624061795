//! A load generator for the ticket purchase endpoint.
//!
//! # Basic operation
//!
//! A run starts a pool of virtual users. They share a fixed number of
//! iterations; each iteration posts the same JSON body to the target,
//! records two named checks on the response status and then pauses.
//!
//! ```
//! use ticket_loadtest::ScenarioOptions;
//!
//! # fn main() -> Result<(), ticket_loadtest::errors::LoadTestError> {
//! // 500 virtual users, 1000 iterations, http://localhost:8080/ticket/,
//! // one second pause after every request.
//! let options = ScenarioOptions::try_default()?;
//! assert_eq!(options.vus(), 500);
//! assert_eq!(options.iterations(), 1000);
//! # Ok(())
//! # }
//! ```
//!
//! To run against another target with less load:
//! ```no_run
//! use std::time::Duration;
//! use ticket_loadtest::{Runner, ScenarioOptions};
//!
//! # async fn run() -> Result<(), ticket_loadtest::errors::LoadTestError> {
//! let target = ScenarioOptions::parse_target("http://127.0.0.1:9090/ticket/")?;
//! let options = ScenarioOptions::new(target)
//!     .with_vus(10)
//!     .with_iterations(50)
//!     .with_pause(Duration::from_millis(200));
//!
//! let summary = Runner::new(options)?.run().await;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! # Checks
//!
//! Every response is evaluated against "status was 201" and "status was
//! 429". Checks only record results; neither of them stops an iteration or
//! the run. Anything else, including a request that never got a response,
//! fails both.
//!
//! ```
//! use reqwest::StatusCode;
//! use ticket_loadtest::checks::{STATUS_WAS_201, STATUS_WAS_429};
//!
//! let status = Some(StatusCode::TOO_MANY_REQUESTS);
//! assert!(!STATUS_WAS_201.evaluate(status).passed);
//! assert!(STATUS_WAS_429.evaluate(status).passed);
//! ```
//!
//! # Metrics
//!
//! Iterations are also recorded through the `metrics` facade. Installing
//! [`prometheus_metrics::PrometheusMetrics`] before the run makes them
//! available in the Prometheus text format.

#![deny(clippy::all)]

pub mod checks;
pub mod errors;
pub mod prometheus_metrics;
pub mod runner;
pub mod scenario;

pub use runner::{RunSummary, Runner};
pub use scenario::{ScenarioOptions, TicketPayload, TicketScenario};
