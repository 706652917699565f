use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::session::Session;

/// Maximum number of concurrent sends of one fan-out
const MAX_CONCURRENT_SENDS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutResult {
    pub delivered: usize,
    /// Recipients that were closing, gone or full
    pub failed: usize,
}

/// Enqueue one serialized packet to every recipient. A slow recipient only
/// holds up its own send slot.
pub async fn fan_out<I>(recipients: I, text: Arc<str>) -> FanOutResult
where
    I: IntoIterator<Item = Arc<Session>>,
{
    let mut result = FanOutResult::default();
    let mut sends = FuturesUnordered::new();

    for session in recipients {
        let text = text.clone();
        sends.push(async move {
            let outcome = session.send_serialized(text).await;
            (session, outcome)
        });

        if sends.len() >= MAX_CONCURRENT_SENDS {
            if let Some(done) = sends.next().await {
                tally(&mut result, done);
            }
        }
    }

    while let Some(done) = sends.next().await {
        tally(&mut result, done);
    }

    result
}

/// Enqueue one serialized packet to every recipient without waiting for
/// queue space. Recipients with a full queue miss this packet.
pub fn try_fan_out<I>(recipients: I, text: Arc<str>) -> FanOutResult
where
    I: IntoIterator<Item = Arc<Session>>,
{
    let mut result = FanOutResult::default();
    for session in recipients {
        let outcome = session.try_send_serialized(text.clone());
        if let Err(crate::session::SendError::Full(id)) = &outcome {
            tracing::warn!(session_id = %id, "Outbound queue full, dropping packet");
        }
        tally(&mut result, (session, outcome));
    }
    result
}

fn tally(
    result: &mut FanOutResult,
    (session, outcome): (Arc<Session>, Result<(), crate::session::SendError>),
) {
    match outcome {
        Ok(()) => result.delivered += 1,
        Err(e) => {
            result.failed += 1;
            tracing::trace!(session_id = %session.id(), error = %e, "Skipped recipient");
        }
    }
}
