//! Namespace constants matching the `@ns` field of every envelope.

/// JSON property carrying the namespace
pub const NS_FIELD: &str = "@ns";

/// Server-to-client error report
pub const ERROR: &str = "error";

/// Client liveness check
pub const PING: &str = "ping";

/// Reply to [`PING`]
pub const PONG: &str = "pong";

/// Message addressed to a user id
pub const PRIVATE_MESSAGE: &str = "p.message";

/// Message addressed to a group id
pub const GROUP_MESSAGE: &str = "g.message";

pub const GROUP_SUBSCRIBE: &str = "g.subscribe";

pub const GROUP_UNSUBSCRIBE: &str = "g.unsubscribe";
