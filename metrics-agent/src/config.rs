use std::str::FromStr;
use std::time::Duration;

use getopts::Options;
use metrics_agent_client::auth::{
    validate_host, DEFAULT_AUTH_HOST, DEFAULT_INGEST_DOMAIN, DEFAULT_METADATA_HOST,
};
use metrics_agent_client::{CredentialError, DEFAULT_TIMEOUT};
use thiserror::Error;
use tracing::Level;

/// Errors that could occur while parsing the command line.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The arguments could not be parsed.
    #[error("failed to parse command line args: {0}")]
    Args(#[from] getopts::Fail),

    /// A host or endpoint flag is not an absolute HTTP(S) URL.
    #[error("invalid value for --{flag}: {source}")]
    InvalidUrl {
        /// Name of the offending flag.
        flag: &'static str,
        /// Details about the parsing failure.
        source: CredentialError,
    },

    /// The timeout is not a positive whole number of seconds.
    #[error("invalid value for --timeout: {0:?}")]
    InvalidTimeout(String),

    /// The log level is not one of the known levels.
    #[error("invalid value for --log-level: {0:?}")]
    InvalidLogLevel(String),
}

/// What the agent was asked to do.
#[derive(Debug)]
pub enum Command {
    /// Collect and send metrics.
    Run(AgentConfig),
    /// Print the usage.
    Help,
    /// Print version information.
    Version,
}

/// Runtime configuration of the agent.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    /// Host of the service exchanging metadata tokens for app keys.
    pub auth_host: String,

    /// Host of the metadata service.
    pub metadata_host: String,

    /// Domain that regional ingestion hosts live under.
    pub ingest_domain: String,

    /// Push endpoint to use instead of the one derived from metadata.
    pub endpoint: Option<String>,

    /// App key to use instead of obtaining one from the auth service.
    pub app_key: Option<String>,

    /// Per-request HTTP timeout.
    pub timeout: Duration,

    /// Write metrics to stdout instead of pushing them.
    pub stdout_only: bool,

    /// Most verbose level that is logged.
    pub log_level: Level,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            auth_host: DEFAULT_AUTH_HOST.to_string(),
            metadata_host: DEFAULT_METADATA_HOST.to_string(),
            ingest_domain: DEFAULT_INGEST_DOMAIN.to_string(),
            endpoint: None,
            app_key: None,
            timeout: DEFAULT_TIMEOUT,
            stdout_only: false,
            log_level: Level::INFO,
        }
    }
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("", "auth-host", "endpoint to use for obtaining the app key", "URL");
    opts.optopt("", "metadata-host", "endpoint to use for obtaining host metadata", "URL");
    opts.optopt("", "ingest-domain", "domain of the regional ingestion hosts", "DOMAIN");
    opts.optopt("", "endpoint", "push metrics to this URL instead of the regional host", "URL");
    opts.optopt("", "app-key", "use this app key instead of obtaining one", "KEY");
    opts.optopt("", "timeout", "timeout of a single HTTP request, in seconds", "SECONDS");
    opts.optflag("", "stdout-only", "write all metrics to stdout only");
    opts.optopt("", "log-level", "one of error, warn, info, debug or trace", "LEVEL");
    opts.optflag("h", "help", "print this help menu");
    opts.optflag("v", "version", "show the application version information");

    opts
}

/// Parses the command line arguments, not including the program name.
pub fn parse_args(args: &[String]) -> Result<Command, ConfigError> {
    let matches = opts().parse(args)?;

    if matches.opt_present("help") {
        return Ok(Command::Help);
    }
    if matches.opt_present("version") {
        return Ok(Command::Version);
    }

    let mut config = AgentConfig::default();

    if let Some(host) = matches.opt_str("auth-host") {
        config.auth_host = host;
    }
    if let Some(host) = matches.opt_str("metadata-host") {
        config.metadata_host = host;
    }
    if let Some(domain) = matches.opt_str("ingest-domain") {
        config.ingest_domain = domain;
    }
    config.endpoint = matches.opt_str("endpoint");
    config.app_key = matches.opt_str("app-key");
    config.stdout_only = matches.opt_present("stdout-only");

    if let Some(timeout) = matches.opt_str("timeout") {
        config.timeout = match timeout.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => return Err(ConfigError::InvalidTimeout(timeout)),
        };
    }

    if let Some(level) = matches.opt_str("log-level") {
        config.log_level =
            Level::from_str(level.trim()).map_err(|_| ConfigError::InvalidLogLevel(level))?;
    }

    check_url("auth-host", &config.auth_host)?;
    check_url("metadata-host", &config.metadata_host)?;
    if let Some(endpoint) = config.endpoint.as_deref() {
        check_url("endpoint", endpoint)?;
    }

    Ok(Command::Run(config))
}

fn check_url(flag: &'static str, url: &str) -> Result<(), ConfigError> {
    validate_host(url).map_err(|source| ConfigError::InvalidUrl { flag, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, ConfigError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        parse_args(&args)
    }

    fn parse_config(args: &[&str]) -> AgentConfig {
        match parse(args) {
            Ok(Command::Run(config)) => config,
            other => panic!("expected a run command, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = parse_config(&[]);
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.auth_host, "https://sonar.digitalocean.com");
        assert_eq!(config.metadata_host, "http://169.254.169.254");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(!config.stdout_only);
    }

    #[test]
    fn test_all_flags() {
        let config = parse_config(&[
            "--auth-host",
            "https://auth.example.com",
            "--metadata-host=http://127.0.0.1:8080",
            "--ingest-domain",
            "ingest.example.com",
            "--endpoint",
            "http://127.0.0.1:9000/v1/metrics",
            "--app-key",
            "secret",
            "--timeout",
            "5",
            "--stdout-only",
            "--log-level",
            "debug",
        ]);

        assert_eq!(
            config,
            AgentConfig {
                auth_host: "https://auth.example.com".to_string(),
                metadata_host: "http://127.0.0.1:8080".to_string(),
                ingest_domain: "ingest.example.com".to_string(),
                endpoint: Some("http://127.0.0.1:9000/v1/metrics".to_string()),
                app_key: Some("secret".to_string()),
                timeout: Duration::from_secs(5),
                stdout_only: true,
                log_level: Level::DEBUG,
            }
        );
    }

    #[test]
    fn test_help_and_version() {
        assert!(matches!(parse(&["-h"]), Ok(Command::Help)));
        assert!(matches!(parse(&["--help", "--stdout-only"]), Ok(Command::Help)));
        assert!(matches!(parse(&["-v"]), Ok(Command::Version)));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(parse(&["--bogus"]), Err(ConfigError::Args(_))));
        assert!(matches!(
            parse(&["--auth-host", "sonar.digitalocean.com"]),
            Err(ConfigError::InvalidUrl { flag: "auth-host", .. })
        ));
        assert!(matches!(
            parse(&["--endpoint", "not a url"]),
            Err(ConfigError::InvalidUrl { flag: "endpoint", .. })
        ));
        assert!(matches!(parse(&["--timeout", "0"]), Err(ConfigError::InvalidTimeout(_))));
        assert!(matches!(parse(&["--timeout", "soon"]), Err(ConfigError::InvalidTimeout(_))));
        assert!(matches!(parse(&["--log-level", "loud"]), Err(ConfigError::InvalidLogLevel(_))));
    }
}
