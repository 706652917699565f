mod handler;
mod message;

pub use handler::{extract_credential, ws_handler, ConnectionState, MalformedCredential, WsQuery};
pub use message::{close_code, OutboundMessage};
