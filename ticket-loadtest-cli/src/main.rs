#![deny(clippy::all)]

#[macro_use]
extern crate log;
extern crate clap;

use crate::config::{Configuration, StubConfiguration};
use crate::stub_target::server::{run_stub_server, TicketGate};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use env_logger::Builder;
use log::LevelFilter;
use std::process;
use std::sync::Arc;
use thiserror::Error;
use ticket_loadtest::errors::LoadTestError;
use ticket_loadtest::prometheus_metrics::PrometheusMetrics;
use ticket_loadtest::Runner;

mod config;
mod stub_target;

const LOADTEST_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    LoadTest(#[from] LoadTestError),
}

fn command() -> Command {
    Command::new("Ticket Load Test")
        .version(LOADTEST_VERSION)
        .about("Concurrent ticket purchase load generator")
        .disable_help_subcommand(true)
        .subcommand_negates_reqs(true)
        .subcommand_value_name("MODE")
        .subcommand_help_heading("MODES")
        .arg(
            Arg::new("config_from_env")
                .short('E')
                .long("use-env-vars")
                .action(ArgAction::SetTrue)
                .help("Sets the run up from ENV VARS instead of these options")
                .exclusive(true),
        )
        .arg(
            Arg::new("TARGET")
                .help("The ticket endpoint to send purchases to")
                .default_value(Configuration::DEFAULT_TARGET)
                .index(1),
        )
        .arg(
            Arg::new("vus")
                .short('u')
                .long("vus")
                .value_parser(value_parser!(usize))
                .default_value(Configuration::DEFAULT_VUS)
                .display_order(1)
                .help("Number of concurrent virtual users"),
        )
        .arg(
            Arg::new("iterations")
                .short('i')
                .long("iterations")
                .value_parser(value_parser!(u64))
                .default_value(Configuration::DEFAULT_ITERATIONS)
                .display_order(2)
                .help("Total iterations shared by all virtual users"),
        )
        .arg(
            Arg::new("pause")
                .long("pause-ms")
                .value_parser(value_parser!(u64))
                .default_value(Configuration::DEFAULT_PAUSE_MS)
                .display_order(3)
                .help("Pause after every iteration, in milliseconds"),
        )
        .arg(
            Arg::new("prometheus")
                .long("prometheus")
                .action(ArgAction::SetTrue)
                .display_order(4)
                .help("Prints the run metrics in the Prometheus format after the summary"),
        )
        .arg(
            Arg::new("v")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .display_order(5)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            Command::new("stub")
                .about("Serves a local ticket endpoint with a single-purchase admission gate")
                .arg(
                    Arg::new("ip")
                        .short('b')
                        .long("ip")
                        .default_value(StubConfiguration::DEFAULT_IP_BIND)
                        .display_order(1)
                        .help("The IP to listen on"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_parser(value_parser!(u16))
                        .default_value(StubConfiguration::DEFAULT_PORT)
                        .display_order(2)
                        .help("The port to listen on"),
                )
                .arg(
                    Arg::new("capacity")
                        .long("capacity")
                        .value_parser(value_parser!(u64))
                        .default_value(StubConfiguration::DEFAULT_CAPACITY)
                        .display_order(3)
                        .help("Tickets available before purchases report the limit"),
                )
                .arg(
                    Arg::new("hold")
                        .long("hold-ms")
                        .value_parser(value_parser!(u64))
                        .default_value(StubConfiguration::DEFAULT_HOLD_MS)
                        .display_order(4)
                        .help("How long each purchase keeps the gate, in milliseconds"),
                )
                .arg(
                    Arg::new("gate_tries")
                        .long("gate-tries")
                        .value_parser(value_parser!(u32).range(1..))
                        .default_value(StubConfiguration::DEFAULT_GATE_TRIES)
                        .display_order(5)
                        .help("Attempts at the gate before a purchase is turned away with a 429"),
                )
                .arg(
                    Arg::new("retry_min")
                        .long("gate-retry-min-ms")
                        .value_parser(value_parser!(u64))
                        .default_value(StubConfiguration::DEFAULT_RETRY_MIN_MS)
                        .display_order(6)
                        .help("Shortest random wait between gate attempts, in milliseconds"),
                )
                .arg(
                    Arg::new("retry_max")
                        .long("gate-retry-max-ms")
                        .value_parser(value_parser!(u64))
                        .default_value(StubConfiguration::DEFAULT_RETRY_MAX_MS)
                        .display_order(7)
                        .help("Longest random wait between gate attempts, in milliseconds"),
                )
                .arg(
                    Arg::new("concert_id")
                        .long("concert-id")
                        .value_parser(value_parser!(u64))
                        .default_value(StubConfiguration::DEFAULT_CONCERT_ID)
                        .display_order(8)
                        .help("The only concert tickets are sold for; others get a 400"),
                ),
        )
}

fn load_configuration(matches: &ArgMatches) -> Result<Configuration, CliError> {
    if matches.get_flag("config_from_env") {
        return Configuration::from_env();
    }

    let target = matches
        .get_one::<String>("TARGET")
        .map(String::as_str)
        .unwrap_or(Configuration::DEFAULT_TARGET);
    let vus = *matches
        .get_one::<usize>("vus")
        .ok_or_else(|| CliError::Config("missing vus".to_string()))?;
    let iterations = *matches
        .get_one::<u64>("iterations")
        .ok_or_else(|| CliError::Config("missing iterations".to_string()))?;
    let pause_ms = *matches
        .get_one::<u64>("pause")
        .ok_or_else(|| CliError::Config("missing pause".to_string()))?;

    Configuration::with(
        target,
        vus,
        iterations,
        pause_ms,
        matches.get_flag("prometheus"),
    )
}

fn stub_configuration(matches: &ArgMatches) -> Result<StubConfiguration, CliError> {
    let missing = |name: &str| CliError::Config(format!("missing {name}"));
    let config = StubConfiguration::with(
        matches
            .get_one::<String>("ip")
            .ok_or_else(|| missing("ip"))?
            .clone(),
        *matches.get_one::<u16>("port").ok_or_else(|| missing("port"))?,
        *matches
            .get_one::<u64>("capacity")
            .ok_or_else(|| missing("capacity"))?,
        *matches.get_one::<u64>("hold").ok_or_else(|| missing("hold"))?,
    );
    let config = config.with_retry(
        *matches
            .get_one::<u32>("gate_tries")
            .ok_or_else(|| missing("gate tries"))?,
        *matches
            .get_one::<u64>("retry_min")
            .ok_or_else(|| missing("gate retry minimum"))?,
        *matches
            .get_one::<u64>("retry_max")
            .ok_or_else(|| missing("gate retry maximum"))?,
    )?;
    Ok(config.with_concert(
        *matches
            .get_one::<u64>("concert_id")
            .ok_or_else(|| missing("concert id"))?,
    ))
}

async fn run_load_test(config: Configuration) -> Result<(), CliError> {
    let metrics = if config.print_prometheus {
        Some(PrometheusMetrics::new()?)
    } else {
        None
    };

    let runner = Runner::new(config.options)?;
    let summary = runner.run().await;

    println!("{summary}");
    if let Some(metrics) = metrics {
        println!();
        println!("{}", metrics.gather_metrics());
    }
    Ok(())
}

#[actix_rt::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = command().get_matches();

    let verbosity = matches
        .subcommand()
        .map_or(0, |(_, sub)| sub.get_count("v"))
        .max(matches.get_count("v"));
    let level_filter = match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = Builder::new();

    builder
        .filter(None, level_filter)
        .parse_default_env()
        .init();

    if let Some(("stub", sub)) = matches.subcommand() {
        let config = match stub_configuration(sub) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1)
            }
        };
        info!("Using stub config: {:?}", config);

        let gate = Arc::new(
            TicketGate::new(config.capacity, config.hold)
                .with_retry(config.tries, config.retry_delay.clone())
                .with_concert(config.concert_id),
        );
        info!("Stub ticket endpoint starting on {}", config.address());
        run_stub_server(&config.address(), gate).await?;
        return Ok(());
    }

    let config = match load_configuration(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1)
        }
    };
    info!("Using config: {:?}", config);

    if let Err(e) = run_load_test(config).await {
        eprintln!("Error: {e}");
        process::exit(1)
    }

    Ok(())
}
