// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Core messaging
pub mod cluster;
pub mod dispatcher;
pub mod packet;
pub mod session;
pub mod storage;

// Transport and HTTP surface
pub mod api;
pub mod server;
pub mod websocket;
