//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, DeliveryOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "voicegen";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8005;
const DEFAULT_DELIVERY_ENDPOINT: &str = "127.0.0.1:8765";
const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_RESPONSE_BYTES: u64 = 1_024;
const DEFAULT_MAX_MESSAGE_CHARS: u64 = 1_000;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 64 * 1024;
const DEFAULT_RESULTS_URL_PREFIX: &str = "/files";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub delivery: DeliverySettings,
    pub intake: IntakeSettings,
    pub results: ResultsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Connection parameters for the rendering service.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// `host:port`; resolved on every connect attempt.
    pub endpoint: String,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_response_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub max_message_chars: NonZeroUsize,
    pub max_request_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct ResultsSettings {
    /// Never ends with `/`. May be empty.
    pub url_prefix: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VOICEGEN").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    delivery: RawDeliverySettings,
    intake: RawIntakeSettings,
    results: RawResultsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.intake_max_message_chars {
            self.intake.max_message_chars = Some(max);
        }
        if let Some(max) = overrides.intake_max_request_bytes {
            self.intake.max_request_bytes = Some(max);
        }
        if let Some(prefix) = overrides.results_url_prefix.as_ref() {
            self.results.url_prefix = Some(prefix.clone());
        }

        self.apply_delivery_overrides(&overrides.delivery);
    }

    fn apply_delivery_overrides(&mut self, overrides: &DeliveryOverrides) {
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.delivery.endpoint = Some(endpoint.clone());
        }
        if let Some(delay) = overrides.retry_delay_ms {
            self.delivery.retry_delay_ms = Some(delay);
        }
        if let Some(timeout) = overrides.connect_timeout_ms {
            self.delivery.connect_timeout_ms = Some(timeout);
        }
        if let Some(timeout) = overrides.response_timeout_ms {
            self.delivery.response_timeout_ms = Some(timeout);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            delivery,
            intake,
            results,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            delivery: build_delivery_settings(delivery)?,
            intake: build_intake_settings(intake)?,
            results: build_results_settings(results),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_delivery_settings(delivery: RawDeliverySettings) -> Result<DeliverySettings, LoadError> {
    let endpoint = delivery
        .endpoint
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_DELIVERY_ENDPOINT.to_string());
    validate_endpoint(&endpoint).map_err(|reason| LoadError::invalid("delivery.endpoint", reason))?;

    let retry_delay = Duration::from_millis(
        delivery
            .retry_delay_ms
            .unwrap_or(DEFAULT_RETRY_DELAY_MS),
    );
    let connect_timeout = positive_millis(
        delivery
            .connect_timeout_ms
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        "delivery.connect_timeout_ms",
    )?;
    let response_timeout = positive_millis(
        delivery
            .response_timeout_ms
            .unwrap_or(DEFAULT_RESPONSE_TIMEOUT_MS),
        "delivery.response_timeout_ms",
    )?;
    let max_response_bytes = non_zero_usize(
        delivery
            .max_response_bytes
            .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES),
        "delivery.max_response_bytes",
    )?;

    Ok(DeliverySettings {
        endpoint,
        retry_delay,
        connect_timeout,
        response_timeout,
        max_response_bytes,
    })
}

fn build_intake_settings(intake: RawIntakeSettings) -> Result<IntakeSettings, LoadError> {
    let max_message_chars = non_zero_usize(
        intake.max_message_chars.unwrap_or(DEFAULT_MAX_MESSAGE_CHARS),
        "intake.max_message_chars",
    )?;
    let max_request_bytes = non_zero_usize(
        intake.max_request_bytes.unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
        "intake.max_request_bytes",
    )?;

    Ok(IntakeSettings {
        max_message_chars,
        max_request_bytes,
    })
}

fn build_results_settings(results: RawResultsSettings) -> ResultsSettings {
    let prefix = results
        .url_prefix
        .unwrap_or_else(|| DEFAULT_RESULTS_URL_PREFIX.to_string());

    ResultsSettings {
        url_prefix: prefix.trim().trim_end_matches('/').to_string(),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeliverySettings {
    endpoint: Option<String>,
    retry_delay_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    response_timeout_ms: Option<u64>,
    max_response_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIntakeSettings {
    max_message_chars: Option<u64>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawResultsSettings {
    url_prefix: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Accepts `host:port` and `[v6]:port`. The host is not resolved here.
fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| format!("`{endpoint}` is not in host:port form"))?;

    if host.trim_matches(['[', ']']).is_empty() {
        return Err(format!("`{endpoint}` has an empty host"));
    }

    match port.parse::<u16>() {
        Ok(0) => Err("port must be greater than zero".to_string()),
        Ok(_) => Ok(()),
        Err(err) => Err(format!("invalid port `{port}`: {err}")),
    }
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
