use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the voicegen binary.
#[derive(Debug, Parser)]
#[command(
    name = "voicegen",
    version,
    about = "Queue speech generation jobs and deliver them to a rendering service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VOICEGEN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP intake and the delivery worker.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub delivery: DeliveryOverrides,

    /// Override the HTTP listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the HTTP listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the maximum message length in characters.
    #[arg(long = "intake-max-message-chars", value_name = "COUNT")]
    pub intake_max_message_chars: Option<u64>,

    /// Override the maximum accepted request body size in bytes.
    #[arg(long = "intake-max-request-bytes", value_name = "BYTES")]
    pub intake_max_request_bytes: Option<u64>,

    /// Override the prefix used to build result URLs.
    #[arg(long = "results-url-prefix", value_name = "PREFIX")]
    pub results_url_prefix: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DeliveryOverrides {
    /// Override the rendering service address (`host:port`).
    #[arg(long = "delivery-endpoint", value_name = "HOST:PORT")]
    pub endpoint: Option<String>,

    /// Override the pause between reconnect attempts.
    #[arg(long = "delivery-retry-delay-ms", value_name = "MILLIS")]
    pub retry_delay_ms: Option<u64>,

    /// Override the connect timeout.
    #[arg(long = "delivery-connect-timeout-ms", value_name = "MILLIS")]
    pub connect_timeout_ms: Option<u64>,

    /// Override how long to wait for the rendering service to answer a job.
    #[arg(long = "delivery-response-timeout-ms", value_name = "MILLIS")]
    pub response_timeout_ms: Option<u64>,
}
