//! Cluster support for running several instances behind one load balancer.
//!
//! Instances exchange routed packets over a [`ClusterTransport`]; Redis
//! pub/sub in production, an in-process bus for single-binary setups and tests.

mod backoff;
mod factory;
mod local;
mod redis_transport;
mod router;
mod transport;
mod types;

pub use factory::create_transport;
pub use local::LocalClusterTransport;
pub use redis_transport::RedisClusterTransport;
pub use router::ClusterRouter;
pub use transport::{ClusterTransport, Subscription, TransportHandler};
pub use types::{RouteTarget, RoutedPacket, TransportError};
