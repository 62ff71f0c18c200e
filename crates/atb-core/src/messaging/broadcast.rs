use std::future::Future;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::port::MessagingPort,
};

/// Report progress after this many recipients.
pub const PROGRESS_EVERY: usize = 10;

#[derive(Clone, Debug)]
pub enum BroadcastPayload {
    Html(String),
    Forward(MessageRef),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastProgress {
    pub done: usize,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Deliver `payload` to every recipient, one at a time.
///
/// Failures are counted, never fatal. `on_progress` runs every
/// [`PROGRESS_EVERY`] recipients (not after the last one).
pub async fn broadcast<F, Fut>(
    port: &dyn MessagingPort,
    recipients: &[ChatId],
    payload: &BroadcastPayload,
    mut on_progress: F,
) -> BroadcastProgress
where
    F: FnMut(BroadcastProgress) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut progress = BroadcastProgress {
        total: recipients.len(),
        ..Default::default()
    };

    for chat_id in recipients {
        let res = match payload {
            BroadcastPayload::Html(html) => port.send_html(*chat_id, html).await.map(|_| ()),
            BroadcastPayload::Forward(msg) => {
                port.forward_message(*chat_id, *msg).await.map(|_| ())
            }
        };
        match res {
            Ok(()) => progress.sent += 1,
            Err(e) => {
                progress.failed += 1;
                tracing::debug!(chat_id = chat_id.0, "broadcast delivery failed: {e}");
            }
        }
        progress.done += 1;

        if progress.done % PROGRESS_EVERY == 0 && progress.done < progress.total {
            on_progress(progress).await;
        }
    }

    progress
}
