use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::task::TaskHandle;
use crate::audio::AudioFrame;
use crate::backends::TranscriptionSession;

/// Starts forwarding `audio` into `session`.
///
/// The task ends on cancellation, when the inbound audio is exhausted, or on
/// the first failed push (the session was closed underneath it).
pub fn spawn_feeder(
    session: Arc<dyn TranscriptionSession>,
    mut audio: broadcast::Receiver<AudioFrame>,
    parent: &CancellationToken,
) -> TaskHandle {
    TaskHandle::spawn("feeder", parent, move |cancel| async move {
        let mut forwarded = 0u64;
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = audio.recv() => received,
            };
            match received {
                Ok(frame) => {
                    if let Err(e) = session.push(frame).await {
                        debug!(target: "feeder", error = %e, "Push rejected; stopping feeder");
                        break;
                    }
                    forwarded += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "feeder", skipped, "Feeder lagged behind inbound audio");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(target: "feeder", "Inbound audio exhausted");
                    break;
                }
            }
        }
        debug!(target: "feeder", forwarded, "Feeder stopped");
    })
}
