use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{recent_cutoff, RecencyCache};
use crate::telegram::{MessagingPlatform, PlatformError, Update};

/// How long one `getUpdates` call may hang waiting for news
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Delays between consecutive failed polls; the last one repeats
const BACKOFF_MS: [u64; 3] = [500, 1000, 2000];

/// Webhook active for this bot, long polling is refused
const CONFLICT: u16 = 409;

pub struct UpdateListener {
    platform: Arc<dyn MessagingPlatform>,
    recent: Arc<RecencyCache>,
    chat_id: String,
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
}

/// Clears the running flag however the loop ends, abort included
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl UpdateListener {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        recent: Arc<RecencyCache>,
        chat_id: impl Into<String>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            platform,
            recent,
            chat_id: chat_id.into(),
            running,
            poll_timeout: LONG_POLL_TIMEOUT,
        }
    }

    /// Run the poll loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Poll until the platform refuses long polling for good
    pub async fn run(self) {
        self.running.store(true, Ordering::Relaxed);
        let _guard = RunningGuard(Arc::clone(&self.running));
        info!(chat_id = %self.chat_id, "Update listener started");

        let mut offset = 0i64;
        let mut failures = 0usize;

        loop {
            match self.platform.get_updates(offset, self.poll_timeout).await {
                Ok(updates) => {
                    failures = 0;
                    for update in &updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update);
                    }
                }
                Err(PlatformError::RateLimited(wait)) => {
                    warn!(wait_secs = wait.as_secs(), "Update polling rate limited");
                    tokio::time::sleep(wait).await;
                }
                Err(PlatformError::Api { code: CONFLICT, description }) => {
                    error!(error = %description, "Long polling refused, stopping update listener");
                    return;
                }
                Err(PlatformError::MissingCredential) => {
                    error!("No bot token, stopping update listener");
                    return;
                }
                Err(e) => {
                    let delay = BACKOFF_MS
                        .get(failures)
                        .copied()
                        .unwrap_or(BACKOFF_MS[BACKOFF_MS.len() - 1]);
                    failures += 1;
                    if e.is_retryable() {
                        warn!(
                            attempt = failures,
                            delay_ms = delay,
                            error = %e,
                            "Polling updates failed, backing off"
                        );
                    } else {
                        error!(attempt = failures, error = %e, "Update polling rejected");
                    }
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    fn handle_update(&self, update: &Update) {
        let Some(message) = update.message() else {
            return;
        };
        if !message.chat.matches(&self.chat_id) {
            debug!(update_id = update.update_id, chat = message.chat.id, "Ignoring foreign chat");
            return;
        }
        let Some(metadata) = message.file_metadata() else {
            return;
        };

        // Offset 0 replays whatever the platform still queues, possibly hours old
        let now = Utc::now();
        let sent_at = message.sent_at().map_or(now, |at| at.min(now));
        if sent_at < recent_cutoff(now) {
            debug!(update_id = update.update_id, file = %metadata.name, "Skipping stale file");
            return;
        }
        info!(file = %metadata.name, size = metadata.size_bytes, "New file in chat");
        self.recent.record_at(metadata, sent_at);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::DateTime;
    use futures::stream::{self, StreamExt};
    use serde_json::json;

    use super::*;
    use crate::telegram::{
        ChunkStream, FileRef, FileUpload, SendKind, SentFile, UploadTarget,
    };

    const CHAT: &str = "-1001234567890";

    /// Replays scripted poll results, then refuses with 409
    struct ScriptedUpdates {
        script: Mutex<VecDeque<Result<Vec<Update>, PlatformError>>>,
        offsets: Mutex<Vec<i64>>,
    }

    impl ScriptedUpdates {
        fn new(script: Vec<Result<Vec<Update>, PlatformError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                offsets: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl MessagingPlatform for ScriptedUpdates {
        async fn send_file(
            &self,
            _target: &UploadTarget,
            _upload: FileUpload,
            _caption: Option<String>,
            _kind: SendKind,
        ) -> Result<SentFile, PlatformError> {
            Err(PlatformError::NotAvailable("not scripted".to_string()))
        }

        async fn resolve_file(&self, _remote_id: &str) -> Result<FileRef, PlatformError> {
            Err(PlatformError::NotAvailable("not scripted".to_string()))
        }

        fn stream_media(&self, _remote_id: &str, _offset: u64, _limit: u64) -> ChunkStream {
            stream::empty().boxed()
        }

        async fn get_updates(
            &self,
            offset: i64,
            _timeout: Duration,
        ) -> Result<Vec<Update>, PlatformError> {
            self.offsets.lock().unwrap().push(offset);
            self.script.lock().unwrap().pop_front().unwrap_or(Err(PlatformError::Api {
                code: 409,
                description: "Conflict: can't use getUpdates method while webhook is active"
                    .to_string(),
            }))
        }
    }

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    fn document_update(update_id: i64, chat_id: i64, file_id: &str) -> Update {
        document_update_at(update_id, chat_id, file_id, Utc::now().timestamp())
    }

    fn document_update_at(update_id: i64, chat_id: i64, file_id: &str, date: i64) -> Update {
        update(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": {"id": chat_id, "type": "supergroup"},
                "date": date,
                "document": {
                    "file_id": file_id,
                    "file_unique_id": format!("u{update_id}"),
                    "file_name": format!("{file_id}.pdf"),
                    "mime_type": "application/pdf",
                    "file_size": 1234
                }
            }
        }))
    }

    fn listener(platform: Arc<ScriptedUpdates>, recent: Arc<RecencyCache>) -> UpdateListener {
        UpdateListener::new(platform, recent, CHAT, Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn test_records_media_from_own_chat_only() {
        let text_only = update(json!({
            "update_id": 12,
            "message": {
                "message_id": 12,
                "chat": {"id": -1001234567890_i64, "type": "supergroup"},
                "date": Utc::now().timestamp(),
                "text": "hello"
            }
        }));
        let channel_video = update(json!({
            "update_id": 20,
            "channel_post": {
                "message_id": 3,
                "chat": {"id": -1001234567890_i64, "type": "channel"},
                "date": Utc::now().timestamp(),
                "video": {
                    "file_id": "vid",
                    "file_unique_id": "uvid",
                    "file_size": 99
                }
            }
        }));
        let platform = ScriptedUpdates::new(vec![
            Ok(vec![
                document_update(10, -1001234567890, "doc"),
                document_update(11, -42, "foreign"),
                text_only,
            ]),
            Ok(vec![channel_video]),
        ]);
        let recent = Arc::new(RecencyCache::new());
        let listener = listener(Arc::clone(&platform), Arc::clone(&recent));
        let running = Arc::clone(&listener.running);

        listener.run().await;

        assert_eq!(*platform.offsets.lock().unwrap(), vec![0, 13, 21]);
        let names: Vec<String> = recent
            .recent_since(Utc::now() - chrono::Duration::hours(1))
            .into_iter()
            .map(|entry| entry.metadata.name)
            .collect();
        assert_eq!(names, vec!["video_uvid.mp4", "doc.pdf"]);
        assert!(!running.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_replayed_stale_files_are_skipped() {
        let now = Utc::now();
        let platform = ScriptedUpdates::new(vec![Ok(vec![
            document_update_at(1, -1001234567890, "ancient", now.timestamp() - 2 * 3600),
            document_update_at(2, -1001234567890, "fresh", now.timestamp() - 5 * 60),
        ])]);
        let recent = Arc::new(RecencyCache::new());

        listener(Arc::clone(&platform), Arc::clone(&recent)).run().await;

        let entries = recent.recent_since(DateTime::<Utc>::MIN_UTC);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metadata.name, "fresh.pdf");
        assert_eq!(entries[0].observed_at.timestamp(), now.timestamp() - 5 * 60);
        assert_eq!(*platform.offsets.lock().unwrap(), vec![0, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backs_off_and_waits_out_rate_limits() {
        let platform = ScriptedUpdates::new(vec![
            Err(PlatformError::Network("connection reset".to_string())),
            Err(PlatformError::Timeout),
            Err(PlatformError::RateLimited(Duration::from_secs(7))),
            Ok(vec![document_update(5, -1001234567890, "late")]),
        ]);
        let recent = Arc::new(RecencyCache::new());

        let started = tokio::time::Instant::now();
        listener(Arc::clone(&platform), Arc::clone(&recent)).run().await;

        // 0.5 s + 1 s backoff, then the 7 s flood wait
        assert!(started.elapsed() >= Duration::from_millis(8500));
        assert_eq!(recent.len(), 1);
        assert_eq!(*platform.offsets.lock().unwrap(), vec![0, 0, 0, 0, 6]);
    }

    #[tokio::test]
    async fn test_missing_token_stops_listener() {
        let platform = ScriptedUpdates::new(vec![Err(PlatformError::MissingCredential)]);
        let recent = Arc::new(RecencyCache::new());

        listener(Arc::clone(&platform), recent).run().await;

        assert_eq!(platform.offsets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_listener_can_be_aborted() {
        let platform = ScriptedUpdates::new(
            (0..1000)
                .map(|_| Err(PlatformError::Timeout))
                .collect(),
        );
        let running = Arc::new(AtomicBool::new(false));
        let listener = UpdateListener::new(
            platform,
            Arc::new(RecencyCache::new()),
            CHAT,
            Arc::clone(&running),
        );

        let handle = listener.spawn();
        while !running.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!running.load(Ordering::Relaxed));
    }
}
