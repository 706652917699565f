//! Packet dispatch: one handler per namespace, chosen from an immutable table.

mod dispatch;
mod fanout;
mod handler;
pub mod handlers;

pub use dispatch::{DispatchOutcome, DispatcherBuilder, PacketDispatcher};
pub use fanout::{fan_out, try_fan_out, FanOutResult};
pub use handler::{HandlerError, PacketHandler};
pub use handlers::HandlerContext;
