use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, OutgoingFile},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return how long to wait before using it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = self.next.max(now);
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces outbound calls.
///
/// Used for fan-out traffic such as broadcasts, where many sends in a row
/// would otherwise trip Telegram flood limits.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChatId, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: ChatId) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.throttle(chat_id).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
        self.throttle(to.chat_id).await;
        self.inner.reply_html(to, html).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.throttle(msg.chat_id).await;
        self.inner.edit_html(msg, html).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.throttle(msg.chat_id).await;
        self.inner.delete_message(msg).await
    }

    async fn forward_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef> {
        self.throttle(to).await;
        self.inner.forward_message(to, msg).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.throttle(chat_id).await;
        self.inner.send_chat_action(chat_id, action).await
    }

    async fn send_file(&self, to: MessageRef, file: OutgoingFile) -> Result<MessageRef> {
        self.throttle(to.chat_id).await;
        self.inner.send_file(to, file).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::{domain::MessageId, errors::Error};

    /// Records every outbound call; chats listed in `failing` reject sends.
    #[derive(Default)]
    pub(crate) struct RecordingPort {
        pub sent: StdMutex<Vec<(ChatId, String)>>,
        pub failing: Vec<ChatId>,
    }

    impl RecordingPort {
        pub(crate) fn sent(&self) -> Vec<(ChatId, String)> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, chat_id: ChatId, what: String) -> Result<MessageRef> {
            if self.failing.contains(&chat_id) {
                return Err(Error::Permission("bot was blocked by the user".to_string()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((chat_id, what));
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(sent.len() as i32),
            })
        }
    }

    #[async_trait::async_trait]
    impl MessagingPort for RecordingPort {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            self.record(chat_id, html.to_string())
        }

        async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
            self.record(to.chat_id, html.to_string())
        }

        async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
            self.record(msg.chat_id, format!("edit:{html}")).map(|_| ())
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.record(msg.chat_id, "delete".to_string()).map(|_| ())
        }

        async fn forward_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef> {
            self.record(to, format!("forward:{}", msg.message_id.0))
        }

        async fn send_chat_action(&self, chat_id: ChatId, _action: ChatAction) -> Result<()> {
            self.record(chat_id, "action".to_string()).map(|_| ())
        }

        async fn send_file(&self, to: MessageRef, file: OutgoingFile) -> Result<MessageRef> {
            self.record(to.chat_id, format!("file:{}", file.path.display()))
        }
    }

    #[tokio::test]
    async fn per_chat_calls_are_spaced() {
        let port = Arc::new(RecordingPort::default());
        let throttled = ThrottledMessenger::new(
            port.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(0),
                per_chat_min_interval: Duration::from_millis(50),
            },
        );

        let start = std::time::Instant::now();
        for i in 0..3 {
            throttled.send_html(ChatId(1), &format!("m{i}")).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(port.sent().len(), 3);
    }

    #[tokio::test]
    async fn different_chats_only_share_global_spacing() {
        let port = Arc::new(RecordingPort::default());
        let throttled = ThrottledMessenger::new(
            port.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(0),
                per_chat_min_interval: Duration::from_secs(5),
            },
        );

        let start = std::time::Instant::now();
        for chat in 0..5 {
            throttled.send_html(ChatId(chat), "hi").await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
