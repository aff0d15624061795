// LOADTEST_TARGET_URL: Url (http or https)
//
// LOADTEST_VUS: usize >= 1
// LOADTEST_ITERATIONS: u64 >= 1
// LOADTEST_PAUSE_MS: u64 -> Duration
//
// LOADTEST_PROMETHEUS: bool

use crate::stub_target::server::{DEFAULT_CONCERT_ID, DEFAULT_GATE_RETRY_DELAY, DEFAULT_GATE_TRIES};
use crate::CliError;
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use ticket_loadtest::scenario;
use ticket_loadtest::ScenarioOptions;

#[derive(Debug)]
pub struct Configuration {
    pub options: ScenarioOptions,
    pub print_prometheus: bool,
}

impl Configuration {
    pub const DEFAULT_TARGET: &'static str = scenario::DEFAULT_TARGET;
    pub const DEFAULT_VUS: &'static str = "500";
    pub const DEFAULT_ITERATIONS: &'static str = "1000";
    pub const DEFAULT_PAUSE_MS: &'static str = "1000";

    pub fn from_env() -> Result<Self, CliError> {
        let target = env::var("LOADTEST_TARGET_URL")
            .unwrap_or_else(|_| Self::DEFAULT_TARGET.to_string());
        Self::with(
            &target,
            env_or_default("LOADTEST_VUS", Self::DEFAULT_VUS)?,
            env_or_default("LOADTEST_ITERATIONS", Self::DEFAULT_ITERATIONS)?,
            env_or_default("LOADTEST_PAUSE_MS", Self::DEFAULT_PAUSE_MS)?,
            env_option_is_enabled("LOADTEST_PROMETHEUS"),
        )
    }

    pub fn with(
        target: &str,
        vus: usize,
        iterations: u64,
        pause_ms: u64,
        print_prometheus: bool,
    ) -> Result<Self, CliError> {
        let options = ScenarioOptions::new(ScenarioOptions::parse_target(target)?)
            .with_vus(vus)
            .with_iterations(iterations)
            .with_pause(Duration::from_millis(pause_ms));
        options.validate()?;

        Ok(Self {
            options,
            print_prometheus,
        })
    }
}

#[derive(Debug, PartialEq)]
pub struct StubConfiguration {
    host: String,
    port: u16,
    pub capacity: u64,
    pub hold: Duration,
    pub tries: u32,
    pub retry_delay: RangeInclusive<Duration>,
    pub concert_id: u64,
}

impl StubConfiguration {
    pub const DEFAULT_IP_BIND: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: &'static str = "8080";
    pub const DEFAULT_CAPACITY: &'static str = "100";
    pub const DEFAULT_HOLD_MS: &'static str = "50";
    pub const DEFAULT_GATE_TRIES: &'static str = "32";
    pub const DEFAULT_RETRY_MIN_MS: &'static str = "50";
    pub const DEFAULT_RETRY_MAX_MS: &'static str = "250";
    pub const DEFAULT_CONCERT_ID: &'static str = "1";

    pub fn with(host: String, port: u16, capacity: u64, hold_ms: u64) -> Self {
        Self {
            host,
            port,
            capacity,
            hold: Duration::from_millis(hold_ms),
            tries: DEFAULT_GATE_TRIES,
            retry_delay: DEFAULT_GATE_RETRY_DELAY,
            concert_id: DEFAULT_CONCERT_ID,
        }
    }

    pub fn with_retry(mut self, tries: u32, min_ms: u64, max_ms: u64) -> Result<Self, CliError> {
        if tries == 0 {
            return Err(CliError::Config("gate tries must be at least 1".to_string()));
        }
        if min_ms > max_ms {
            return Err(CliError::Config(format!(
                "gate retry delay {min_ms}ms is above its maximum {max_ms}ms"
            )));
        }
        self.tries = tries;
        self.retry_delay = Duration::from_millis(min_ms)..=Duration::from_millis(max_ms);
        Ok(self)
    }

    pub fn with_concert(mut self, concert_id: u64) -> Self {
        self.concert_id = concert_id;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or_default<T>(env_name: &str, default: &str) -> Result<T, CliError>
where
    T: FromStr,
    T::Err: Display,
{
    let value = env::var(env_name).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|e| CliError::Config(format!("{env_name}={value}: {e}")))
}

fn env_option_is_enabled(env_name: &str) -> bool {
    match env::var(env_name) {
        Ok(value) => value == "1",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Configuration, StubConfiguration};
    use crate::CliError;
    use serial_test::serial;
    use std::env;
    use std::time::Duration;
    use ticket_loadtest::errors::LoadTestError;

    struct VarEnvCleaner {
        vars: Vec<String>,
    }

    impl VarEnvCleaner {
        pub fn new() -> Self {
            Self { vars: Vec::new() }
        }

        pub fn set_var(&mut self, k: &str, v: &str) {
            self.vars.insert(0, k.to_string());
            env::set_var(k, v);
        }
    }

    impl Drop for VarEnvCleaner {
        fn drop(&mut self) {
            for var in &self.vars {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        let config = Configuration::from_env().unwrap();
        assert_eq!(
            config.options.target().as_str(),
            "http://localhost:8080/ticket/"
        );
        assert_eq!(config.options.vus(), 500);
        assert_eq!(config.options.iterations(), 1000);
        assert_eq!(config.options.pause(), Duration::from_secs(1));
        assert!(!config.print_prometheus);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        let mut vars = VarEnvCleaner::new();
        vars.set_var("LOADTEST_TARGET_URL", "http://127.0.0.1:9090/ticket/");
        vars.set_var("LOADTEST_VUS", "2");
        vars.set_var("LOADTEST_ITERATIONS", "4");
        vars.set_var("LOADTEST_PAUSE_MS", "250");
        vars.set_var("LOADTEST_PROMETHEUS", "1");

        let config = Configuration::from_env().unwrap();
        assert_eq!(
            config.options.target().as_str(),
            "http://127.0.0.1:9090/ticket/"
        );
        assert_eq!(config.options.vus(), 2);
        assert_eq!(config.options.iterations(), 4);
        assert_eq!(config.options.pause(), Duration::from_millis(250));
        assert!(config.print_prometheus);
    }

    #[test]
    #[serial]
    fn test_config_unparsable_env() {
        let mut vars = VarEnvCleaner::new();
        vars.set_var("LOADTEST_VUS", "many");

        match Configuration::from_env() {
            Err(CliError::Config(msg)) => assert!(msg.starts_with("LOADTEST_VUS=many")),
            other => panic!("Should be a config error, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_config_zero_iterations() {
        let mut vars = VarEnvCleaner::new();
        vars.set_var("LOADTEST_ITERATIONS", "0");

        assert!(matches!(
            Configuration::from_env(),
            Err(CliError::LoadTest(LoadTestError::ZeroOption("iterations")))
        ));
    }

    #[test]
    fn test_config_rejects_non_http_target() {
        assert!(matches!(
            Configuration::with("ws://localhost:8080/ticket/", 1, 1, 0, false),
            Err(CliError::LoadTest(LoadTestError::UnsupportedScheme(_)))
        ));
    }

    #[test]
    fn test_stub_config_address() {
        let config = StubConfiguration::with("127.0.0.1".to_string(), 18080, 10, 5);
        assert_eq!(config.address(), "127.0.0.1:18080");
        assert_eq!(config.hold, Duration::from_millis(5));
        assert_eq!(config.tries, 32);
        assert_eq!(
            config.retry_delay,
            Duration::from_millis(50)..=Duration::from_millis(250)
        );
        assert_eq!(config.concert_id, 1);
    }

    #[test]
    fn test_stub_config_retry() {
        let config = StubConfiguration::with("127.0.0.1".to_string(), 18080, 10, 5)
            .with_retry(4, 10, 20)
            .unwrap()
            .with_concert(3);
        assert_eq!(config.tries, 4);
        assert_eq!(
            config.retry_delay,
            Duration::from_millis(10)..=Duration::from_millis(20)
        );
        assert_eq!(config.concert_id, 3);
    }

    #[test]
    fn test_stub_config_rejects_bad_retry() {
        let stub = || StubConfiguration::with("127.0.0.1".to_string(), 18080, 10, 5);
        assert!(matches!(stub().with_retry(0, 10, 20), Err(CliError::Config(_))));
        assert!(matches!(stub().with_retry(4, 30, 20), Err(CliError::Config(_))));
    }
}
