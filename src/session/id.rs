use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;

use super::SessionId;

pub trait SessionIdGenerator: Send + Sync {
    fn next_id(&self) -> SessionId;
}

/// Generates `(epoch_seconds << 32) | seq` where `seq` is a wrapping
/// 32-bit counter.
#[derive(Debug, Default)]
pub struct LocalSessionIdGenerator {
    seq: AtomicU32,
}

impl LocalSessionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionIdGenerator for LocalSessionIdGenerator {
    fn next_id(&self) -> SessionId {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) as u64;
        let secs = Utc::now().timestamp().max(0) as u64;
        SessionId::new((secs << 32) | seq)
    }
}
