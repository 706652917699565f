mod settings;

pub use settings::{
    AuthConfig, ClusterConfig, LoggingConfig, MessageConfig, ServerConfig, SessionConfig,
    Settings,
};
