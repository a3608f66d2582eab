//! Command-line configuration.
//!
//! `Cli` is the raw clap surface; `Cli::into_config` validates it into the
//! immutable `Config` that every other module borrows.
//!
//! CHANGELOG:
//! - 10/18/2026 - Reject out-of-range --sleep values instead of panicking (Phase 3)
//! - 10/18/2026 - Added --on-query-error and --json (Phase 2)
//! - 10/18/2026 - Initial flag set and endpoint parsing (Phase 1)

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::aggregate::QueryErrorPolicy;

/// Default Redis port when an address omits one.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Default single-instance lock file.
pub const DEFAULT_LOCK_FILE: &str = "/tmp/redis-cloudwatch.lock";

/// Configuration errors detected before any lock or network activity.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You must specify at least one redis server")]
    NoServers,

    #[error("invalid redis server address '{0}' (expected host[:port])")]
    InvalidAddress(String),

    #[error("redis list name must not be empty")]
    EmptyListKey,
}

/// Poll Redis list lengths and publish the total to CloudWatch.
#[derive(Parser, Debug)]
#[command(name = "redis-cloudwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Send metrics to CloudWatch
    #[arg(short = 'c', long)]
    pub aws_cloudwatch: bool,

    /// Authenticate with the instance IAM role only
    #[arg(short = 'i', long)]
    pub aws_iam_profile: bool,

    /// AWS region
    #[arg(short = 'R', long, default_value = "us-east-1")]
    pub aws_region: String,

    /// AWS credential file, used in place of env variables or the IAM role
    #[arg(long)]
    pub aws_credential_file: Option<String>,

    /// Profile inside the AWS credential file
    #[arg(long)]
    pub aws_credential_profile: Option<String>,

    /// CloudWatch metric name
    #[arg(
        short = 'm',
        long,
        env = "CLOUDWATCH_METRIC_NAME",
        default_value = "redis-queue-size"
    )]
    pub metric_name: String,

    /// CloudWatch metric namespace
    #[arg(
        short = 'n',
        long,
        env = "CLOUDWATCH_NAMESPACE",
        default_value = "Tropo Logstash ASG"
    )]
    pub metric_namespace: String,

    /// Redis server address (host[:port]), repeatable
    #[arg(short = 'r', long = "redis-server", value_name = "ADDR")]
    pub redis_servers: Vec<String>,

    /// Redis list name
    #[arg(short = 'l', long, default_value = "logstash")]
    pub redis_list: String,

    /// Redis database index
    #[arg(short = 'd', long)]
    pub redis_db: Option<u32>,

    /// Password for the redis instances
    #[arg(short = 'p', long)]
    pub redis_password: Option<String>,

    /// Time between polls (e.g. 30s, 5m, 1h30m); 0 runs once and exits
    #[arg(short = 's', long = "sleep", default_value = "0s", value_parser = parse_interval)]
    pub sleep: Duration,

    /// Lock file guarding against concurrent runs
    #[arg(short = 'L', long, default_value = DEFAULT_LOCK_FILE)]
    pub lock_file: String,

    /// What to do when one server fails to report its list length
    #[arg(long, value_enum, default_value_t = QueryErrorPolicy::Abort)]
    pub on_query_error: QueryErrorPolicy,

    /// Print one JSON report per cycle on stdout
    #[arg(long)]
    pub json: bool,

    /// Verbose mode
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// One Redis server to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    /// Address as given on the command line
    pub address: String,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: Option<u32>,
}

impl ServerEndpoint {
    /// Parse `host[:port]` (or `[v6]:port`) into an endpoint.
    pub fn parse(
        address: &str,
        password: Option<String>,
        db: Option<u32>,
    ) -> Result<Self, ConfigError> {
        let address = address.trim();
        let (host, port) = split_host_port(address)?;
        Ok(Self {
            address: address.to_string(),
            host,
            port,
            password,
            db,
        })
    }
}

fn split_host_port(address: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidAddress(address.to_string());

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if tail.is_empty() => (host, None),
            None => return Err(invalid()),
        }
    } else {
        match address.rsplit_once(':') {
            // Bare IPv6 literal without brackets
            Some((host, _)) if host.contains(':') => (address, None),
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(invalid)?,
        None => DEFAULT_REDIS_PORT,
    };
    Ok((host.to_string(), port))
}

/// AWS region and credential settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsSettings {
    pub region: String,
    pub use_iam: bool,
    pub credential_file: Option<PathBuf>,
    pub credential_profile: Option<String>,
}

/// Where the datapoint goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSettings {
    pub name: String,
    pub namespace: String,
}

/// Validated, immutable run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub publish: bool,
    pub aws: AwsSettings,
    pub metric: MetricSettings,
    pub servers: Vec<ServerEndpoint>,
    pub list_key: String,
    pub interval: Duration,
    pub lock_file: PathBuf,
    pub on_query_error: QueryErrorPolicy,
    pub json: bool,
    pub verbose: bool,
}

impl Config {
    /// Server addresses in configuration order.
    pub fn server_addresses(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.address.as_str()).collect()
    }

    /// Database index shared by every endpoint, when one was given.
    pub fn redis_db(&self) -> Option<u32> {
        self.servers.first().and_then(|s| s.db)
    }

    /// Whether the loop repeats after the first cycle.
    pub fn is_periodic(&self) -> bool {
        !self.interval.is_zero()
    }
}

impl Cli {
    /// Validate flags into a `Config`.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        if self.redis_servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        let list_key = self.redis_list.trim().to_string();
        if list_key.is_empty() {
            return Err(ConfigError::EmptyListKey);
        }

        let password = self.redis_password.filter(|p| !p.is_empty());
        let servers = self
            .redis_servers
            .iter()
            .map(|addr| ServerEndpoint::parse(addr, password.clone(), self.redis_db))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            publish: self.aws_cloudwatch,
            aws: AwsSettings {
                region: self.aws_region,
                use_iam: self.aws_iam_profile,
                credential_file: self
                    .aws_credential_file
                    .filter(|f| !f.is_empty())
                    .map(|f| expand_path(&f)),
                credential_profile: self.aws_credential_profile.filter(|p| !p.is_empty()),
            },
            metric: MetricSettings {
                name: self.metric_name,
                namespace: self.metric_namespace,
            },
            servers,
            list_key,
            interval: self.sleep,
            lock_file: expand_path(&self.lock_file),
            on_query_error: self.on_query_error,
            json: self.json,
            verbose: self.verbose,
        })
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Parse a poll interval.
///
/// Accepts bare seconds (`30`) or unit-suffixed components in the style of
/// `1h30m`, `45s`, `250ms`, `1.5s`.
pub fn parse_interval(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(format!("invalid duration '{}': expected a number", input));
        }
        let value: f64 = rest[..num_end]
            .parse()
            .map_err(|_| format!("invalid duration '{}'", input))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("invalid duration '{}': missing unit", input)),
            unit => {
                return Err(format!(
                    "invalid duration '{}': unknown unit '{}'",
                    input, unit
                ))
            }
        };
        let part = Duration::try_from_secs_f64(value * scale)
            .map_err(|_| format!("invalid duration '{}': out of range", input))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("invalid duration '{}': out of range", input))?;
        rest = &rest[unit_end..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["redis-cloudwatch"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_empty_server_list_rejected() {
        let err = parse(&[]).into_config().unwrap_err();
        assert_eq!(err, ConfigError::NoServers);
    }

    #[test]
    fn test_repeated_servers_keep_order() {
        let config = parse(&["-r", "a:6379", "--redis-server", "b:6380", "-r", "c"])
            .into_config()
            .unwrap();
        assert_eq!(config.server_addresses(), vec!["a:6379", "b:6380", "c"]);
        assert_eq!(config.servers[1].port, 6380);
        assert_eq!(config.servers[2].port, DEFAULT_REDIS_PORT);
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["-r", "localhost"]).into_config().unwrap();
        assert!(!config.publish);
        assert_eq!(config.aws.region, "us-east-1");
        assert_eq!(config.list_key, "logstash");
        assert_eq!(config.interval, Duration::ZERO);
        assert!(!config.is_periodic());
        assert_eq!(config.lock_file, PathBuf::from(DEFAULT_LOCK_FILE));
        assert_eq!(config.on_query_error, QueryErrorPolicy::Abort);
        assert_eq!(config.redis_db(), None);
    }

    #[test]
    fn test_password_and_db_apply_to_every_server() {
        let config = parse(&["-r", "a", "-r", "b", "-p", "secret", "-d", "3"])
            .into_config()
            .unwrap();
        for server in &config.servers {
            assert_eq!(server.password.as_deref(), Some("secret"));
            assert_eq!(server.db, Some(3));
        }
        assert_eq!(config.redis_db(), Some(3));
    }

    #[test]
    fn test_metric_flags_override() {
        let config = parse(&["-r", "a", "-m", "queue", "-n", "Workers", "-c"])
            .into_config()
            .unwrap();
        assert_eq!(config.metric.name, "queue");
        assert_eq!(config.metric.namespace, "Workers");
        assert!(config.publish);
    }

    #[test]
    fn test_blank_list_key_rejected() {
        let err = parse(&["-r", "a", "-l", "  "]).into_config().unwrap_err();
        assert_eq!(err, ConfigError::EmptyListKey);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let err = parse(&["-r", "host:notaport"]).into_config().unwrap_err();
        assert_eq!(err, ConfigError::InvalidAddress("host:notaport".to_string()));
    }

    #[test]
    fn test_sleep_flag() {
        let config = parse(&["-r", "a", "-s", "1m30s"]).into_config().unwrap();
        assert_eq!(config.interval, Duration::from_secs(90));
        assert!(config.is_periodic());
    }

    #[test]
    fn test_bad_sleep_is_usage_error() {
        assert!(Cli::try_parse_from(["redis-cloudwatch", "-r", "a", "-s", "5min"]).is_err());
    }

    #[test]
    fn test_skip_policy_flag() {
        let config = parse(&["-r", "a", "--on-query-error", "skip"])
            .into_config()
            .unwrap();
        assert_eq!(config.on_query_error, QueryErrorPolicy::Skip);
    }

    #[test]
    fn test_endpoint_parsing() {
        let ep = ServerEndpoint::parse("cache.internal:7000", None, None).unwrap();
        assert_eq!((ep.host.as_str(), ep.port), ("cache.internal", 7000));

        let ep = ServerEndpoint::parse("[::1]:6380", None, None).unwrap();
        assert_eq!((ep.host.as_str(), ep.port), ("::1", 6380));

        let ep = ServerEndpoint::parse("::1", None, None).unwrap();
        assert_eq!((ep.host.as_str(), ep.port), ("::1", DEFAULT_REDIS_PORT));

        assert!(ServerEndpoint::parse(":6379", None, None).is_err());
        assert!(ServerEndpoint::parse("host:0", None, None).is_err());
        assert!(ServerEndpoint::parse("[::1", None, None).is_err());
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_interval("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_interval("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_interval("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_interval("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_interval_errors() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("s").is_err());
        assert!(parse_interval("10x").is_err());
        assert!(parse_interval("1h30").is_err());
    }

    #[test]
    fn test_parse_interval_out_of_range() {
        assert!(parse_interval("18446744073709551615h").is_err());
        assert!(parse_interval(&format!("{}s", "9".repeat(400))).is_err());
        assert!(parse_interval(&"9".repeat(400)).is_err());
        assert!(parse_interval("10000000000000000000s10000000000000000000s").is_err());
    }

    #[test]
    fn test_out_of_range_sleep_is_usage_error() {
        let err = Cli::try_parse_from(["redis-cloudwatch", "-s", "18446744073709551615h"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
