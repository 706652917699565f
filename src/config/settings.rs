use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify access tokens
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Clock skew tolerated when checking `exp`/`nbf`
    #[serde(default = "default_leeway_seconds")]
    pub leeway_seconds: u64,
    /// Accept connections that carry no credential at all
    #[serde(default)]
    pub allow_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Capacity of each session's outbound queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Upper bound for flushing the close frame of a terminating connection
    #[serde(default = "default_close_flush_timeout_ms")]
    pub close_flush_timeout_ms: u64,
    /// Capacity of the registry/group mutation queue
    #[serde(default = "default_mutation_queue_capacity")]
    pub mutation_queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageConfig {
    /// Generate a message id for inbound messages that carry none
    #[serde(default = "default_autofill_id")]
    pub autofill_id: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Prefix of every pub/sub channel used for routed packets
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Unique identifier of this instance; generated when absent
    #[serde(default = "default_server_id")]
    pub server_id: String,
    /// First delay before resubscribing after the subscription dropped
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_leeway_seconds() -> u64 {
    90
}

fn default_outbound_buffer() -> usize {
    32
}

fn default_close_flush_timeout_ms() -> u64 {
    5000
}

fn default_mutation_queue_capacity() -> usize {
    1024
}

fn default_autofill_id() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_channel_prefix() -> String {
    "ara:im:route".to_string()
}

fn default_server_id() -> String {
    format!("ara-im-{}", uuid::Uuid::new_v4().simple())
}

fn default_reconnect_initial_ms() -> u64 {
    100
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("auth.leeway_seconds", 90)?
            .set_default("auth.allow_anonymous", false)?
            .set_default("session.outbound_buffer", 32)?
            .set_default("session.close_flush_timeout_ms", 5000)?
            .set_default("session.mutation_queue_capacity", 1024)?
            .set_default("message.autofill_id", true)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, AUTH__JWT_SECRET, CLUSTER__ENABLED, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            close_flush_timeout_ms: default_close_flush_timeout_ms(),
            mutation_queue_capacity: default_mutation_queue_capacity(),
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            autofill_id: default_autofill_id(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: default_redis_url(),
            channel_prefix: default_channel_prefix(),
            server_id: default_server_id(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}
