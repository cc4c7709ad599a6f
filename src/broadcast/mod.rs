//! Mass-delivery dispatcher
//!
//! Sends one message to every live recipient of a directory, one recipient
//! at a time, with a fixed delay between attempts. Failures are isolated
//! per recipient: a recipient that can never be reached again is flagged
//! not-live in the directory, anything else is only counted.
//!
//! Only one broadcast runs at a time per [`Dispatcher`]. A second request
//! fails fast with [`BroadcastError::AlreadyRunning`] and leaves the running
//! job untouched.
//!
//! Progress is published on a [`tokio::sync::broadcast`] channel:
//!
//! ```text
//! Started ──▶ Progress (every N recipients) ──▶ Completed
//! ```

pub mod transport;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::directory::RecipientDirectory;
use crate::models::Recipient;
use crate::utils::error::{BroadcastError, DeliveryError};
use crate::utils::percent;

pub use transport::{DeliveryTransport, TelegramTransport};

/// Default pause after every delivery attempt
pub const DEFAULT_MESSAGE_DELAY: Duration = Duration::from_millis(100);

/// Default number of recipients between progress snapshots
pub const DEFAULT_PROGRESS_BATCH: usize = 50;

// ============================================================================
// Payload
// ============================================================================

/// Markup dialect of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Html,
    Markdown,
    Plain,
}

/// Rendering hints passed through to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDirectives {
    pub parse_mode: ParseMode,
    pub disable_preview: bool,
}

impl Default for FormatDirectives {
    fn default() -> Self {
        Self {
            parse_mode: ParseMode::Html,
            disable_preview: true,
        }
    }
}

/// What to send: text, or an image with the text as caption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastPayload {
    pub text: String,
    pub image: Option<String>,
    #[serde(default)]
    pub format: FormatDirectives,
}

impl BroadcastPayload {
    /// Text-only payload with default formatting
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            format: FormatDirectives::default(),
        }
    }

    /// Image payload with a caption
    pub fn image(image: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            text: caption.into(),
            image: Some(image.into()),
            format: FormatDirectives::default(),
        }
    }

    pub fn with_format(mut self, format: FormatDirectives) -> Self {
        self.format = format;
        self
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image.as_deref().map_or(true, |i| i.trim().is_empty())
    }
}

// ============================================================================
// Statistics and events
// ============================================================================

/// Counters of one broadcast job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastStats {
    pub job_id: Uuid,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// Subset of `failed` that were permanently unreachable
    pub blocked: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BroadcastStats {
    fn start(job_id: Uuid, total: usize) -> Self {
        Self {
            job_id,
            total,
            sent: 0,
            failed: 0,
            blocked: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Recipients attempted so far
    pub fn processed(&self) -> usize {
        self.sent + self.failed
    }

    /// Progress percentage, 0 for an empty job
    pub fn progress_percent(&self) -> u32 {
        percent(self.processed(), self.total)
    }

    /// Share of recipients reached, 0 for an empty job
    pub fn success_percent(&self) -> u32 {
        percent(self.sent, self.total)
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Format as a numeric operator summary
    pub fn display(&self) -> String {
        let mut output = if self.is_finished() {
            String::from("Broadcast Completed\n")
        } else {
            String::from("Broadcast Progress\n")
        };
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Progress: {}%\n", self.progress_percent()));
        output.push_str(&format!("Sent: {}\n", self.sent));
        output.push_str(&format!("Failed: {}\n", self.failed));
        output.push_str(&format!("Blocked: {}\n", self.blocked));
        output.push_str(&format!("Total: {}\n", self.total));
        if self.is_finished() {
            output.push_str(&format!("Success Rate: {}%\n", self.success_percent()));
        }

        output
    }
}

/// The job currently being delivered
#[derive(Debug, Clone)]
pub struct BroadcastJob {
    pub payload: BroadcastPayload,
    pub stats: BroadcastStats,
}

/// Events emitted while a broadcast runs
#[derive(Debug, Clone)]
pub enum BroadcastEvent {
    Started { job_id: Uuid, total: usize },
    Progress(BroadcastStats),
    Completed(BroadcastStats),
}

/// Dispatcher status information
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatus {
    pub running: bool,
    pub current: Option<BroadcastStats>,
    pub last_completed: Option<BroadcastStats>,
}

impl DispatcherStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Dispatcher Status\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Running: {}\n", self.running));

        if let Some(ref current) = self.current {
            output.push_str(&format!(
                "Current Job: {} ({}/{} processed, {}%)\n",
                current.job_id,
                current.processed(),
                current.total,
                current.progress_percent()
            ));
        }

        match self.last_completed {
            Some(ref last) => {
                output.push_str(&format!(
                    "Last Job: {} sent, {} failed, {} blocked of {}\n",
                    last.sent, last.failed, last.blocked, last.total
                ));
                if let Some(finished) = last.finished_at {
                    output.push_str(&format!("Finished At: {}\n", finished.to_rfc3339()));
                }
            }
            None => output.push_str("Last Job: none\n"),
        }

        output
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Clears the running flag and the current job on every exit path,
/// including a dropped `broadcast` future
struct RunningGuard<'a> {
    running: &'a AtomicBool,
    current: &'a StdRwLock<Option<BroadcastJob>>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Throttled one-to-many message dispatcher
pub struct Dispatcher {
    transport: Arc<dyn DeliveryTransport>,
    message_delay: Duration,
    progress_batch: usize,
    running: AtomicBool,
    event_sender: broadcast::Sender<BroadcastEvent>,
    /// Never held across an await point
    current: StdRwLock<Option<BroadcastJob>>,
    last_completed: RwLock<Option<BroadcastStats>>,
}

impl Dispatcher {
    /// Create a dispatcher with default throttling
    pub fn new(transport: Arc<dyn DeliveryTransport>) -> Self {
        Self::with_settings(transport, DEFAULT_MESSAGE_DELAY, DEFAULT_PROGRESS_BATCH)
    }

    /// Create a dispatcher with custom delay and progress batch size
    pub fn with_settings(
        transport: Arc<dyn DeliveryTransport>,
        message_delay: Duration,
        progress_batch: usize,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(100);

        Self {
            transport,
            message_delay,
            progress_batch: progress_batch.max(1),
            running: AtomicBool::new(false),
            event_sender,
            current: StdRwLock::new(None),
            last_completed: RwLock::new(None),
        }
    }

    pub fn from_config(transport: Arc<dyn DeliveryTransport>, config: &BroadcastConfig) -> Self {
        Self::with_settings(transport, config.message_delay(), config.progress_batch)
    }

    /// Subscribe to broadcast events
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.event_sender.subscribe()
    }

    /// Whether a broadcast is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            running: self.is_running(),
            current: self
                .current
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .map(|job| job.stats.clone()),
            last_completed: self.last_completed.read().await.clone(),
        }
    }

    /// Deliver `payload` to every live recipient of `directory`
    ///
    /// # Errors
    ///
    /// - `BroadcastError::EmptyPayload` when there is nothing to send
    /// - `BroadcastError::AlreadyRunning` when another job is in flight
    /// - `BroadcastError::Directory` when the recipient list cannot be read
    ///
    /// Per-recipient delivery failures never fail the job; they are counted
    /// in the returned stats.
    pub async fn broadcast(
        &self,
        payload: BroadcastPayload,
        directory: &dyn RecipientDirectory,
    ) -> Result<BroadcastStats, BroadcastError> {
        if payload.is_empty() {
            return Err(BroadcastError::EmptyPayload);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Broadcast rejected, another job is running");
            return Err(BroadcastError::AlreadyRunning);
        }
        let _guard = RunningGuard {
            running: &self.running,
            current: &self.current,
        };

        let recipients = directory.live_recipients().await?;
        let job_id = Uuid::new_v4();
        let mut stats = BroadcastStats::start(job_id, recipients.len());

        self.set_current(Some(BroadcastJob {
            payload: payload.clone(),
            stats: stats.clone(),
        }));

        tracing::info!(
            job_id = %job_id,
            total = stats.total,
            transport = self.transport.name(),
            with_image = payload.image.is_some(),
            "Broadcast started"
        );
        let _ = self.event_sender.send(BroadcastEvent::Started {
            job_id,
            total: stats.total,
        });

        for (index, recipient) in recipients.iter().enumerate() {
            match self.deliver(&payload, recipient).await {
                Ok(()) => stats.sent += 1,
                Err(e) if e.is_permanent() => {
                    stats.failed += 1;
                    stats.blocked += 1;
                    tracing::warn!(
                        job_id = %job_id,
                        recipient = %recipient.id,
                        error = %e,
                        "Recipient unreachable, marking not live"
                    );
                    if let Err(e) = directory.mark_not_live(&recipient.id).await {
                        tracing::error!(
                            recipient = %recipient.id,
                            error = %e,
                            "Failed to record recipient liveness"
                        );
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        job_id = %job_id,
                        recipient = %recipient.id,
                        error = %e,
                        "Delivery failed"
                    );
                }
            }

            if let Some(job) = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .as_mut()
            {
                job.stats = stats.clone();
            }

            if (index + 1) % self.progress_batch == 0 {
                tracing::info!(
                    job_id = %job_id,
                    processed = stats.processed(),
                    total = stats.total,
                    percent = stats.progress_percent(),
                    "Broadcast progress"
                );
                let _ = self.event_sender.send(BroadcastEvent::Progress(stats.clone()));
            }

            if !self.message_delay.is_zero() {
                tokio::time::sleep(self.message_delay).await;
            }
        }

        stats.finished_at = Some(Utc::now());

        tracing::info!(
            job_id = %job_id,
            total = stats.total,
            sent = stats.sent,
            failed = stats.failed,
            blocked = stats.blocked,
            "Broadcast completed"
        );
        let _ = self.event_sender.send(BroadcastEvent::Completed(stats.clone()));

        *self.last_completed.write().await = Some(stats.clone());
        self.set_current(None);

        Ok(stats)
    }

    fn set_current(&self, job: Option<BroadcastJob>) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = job;
    }

    async fn deliver(
        &self,
        payload: &BroadcastPayload,
        recipient: &Recipient,
    ) -> Result<(), DeliveryError> {
        match payload.image.as_deref() {
            Some(image) => {
                self.transport
                    .send_image(&recipient.delivery_address, image, &payload.text, &payload.format)
                    .await
            }
            None => {
                self.transport
                    .send_text(&recipient.delivery_address, &payload.text, &payload.format)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::utils::error::DirectoryError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        texts: Mutex<Vec<String>>,
        images: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DeliveryTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send_text(
            &self,
            address: &str,
            _text: &str,
            _format: &FormatDirectives,
        ) -> Result<(), DeliveryError> {
            self.texts.lock().unwrap().push(address.to_string());
            Ok(())
        }

        async fn send_image(
            &self,
            address: &str,
            image: &str,
            _caption: &str,
            _format: &FormatDirectives,
        ) -> Result<(), DeliveryError> {
            self.images
                .lock()
                .unwrap()
                .push((address.to_string(), image.to_string()));
            Ok(())
        }
    }

    struct BrokenDirectory;

    #[async_trait]
    impl RecipientDirectory for BrokenDirectory {
        async fn list(&self) -> Result<Vec<Recipient>, DirectoryError> {
            Err(DirectoryError::UnknownRecipient("*".into()))
        }
        async fn is_banned(&self, _id: &str) -> Result<bool, DirectoryError> {
            Ok(false)
        }
        async fn mark_not_live(&self, _id: &str) -> Result<(), DirectoryError> {
            Ok(())
        }
    }

    fn dispatcher(transport: Arc<RecordingTransport>) -> Dispatcher {
        Dispatcher::with_settings(transport, Duration::ZERO, 2)
    }

    #[tokio::test]
    async fn test_empty_directory_completes_with_zeros() {
        let dispatcher = dispatcher(Arc::new(RecordingTransport::default()));
        let stats = dispatcher
            .broadcast(BroadcastPayload::text("hello"), &MemoryDirectory::new())
            .await
            .unwrap();

        assert_eq!((stats.total, stats.sent, stats.failed, stats.blocked), (0, 0, 0, 0));
        assert_eq!(stats.progress_percent(), 0);
        assert_eq!(stats.success_percent(), 0);
        assert!(stats.is_finished());
        assert!(!dispatcher.is_running());
    }

    #[tokio::test]
    async fn test_image_payload_uses_send_image() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher(transport.clone());
        let directory = MemoryDirectory::with_recipients(vec![Recipient::new("1", "chat-1")]);

        dispatcher
            .broadcast(BroadcastPayload::image("https://img/a.png", "caption"), &directory)
            .await
            .unwrap();

        assert!(transport.texts.lock().unwrap().is_empty());
        assert_eq!(
            transport.images.lock().unwrap().as_slice(),
            &[("chat-1".to_string(), "https://img/a.png".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let dispatcher = dispatcher(Arc::new(RecordingTransport::default()));
        let err = dispatcher
            .broadcast(BroadcastPayload::text("   "), &MemoryDirectory::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::EmptyPayload));
    }

    #[tokio::test]
    async fn test_guard_released_after_directory_error() {
        let dispatcher = dispatcher(Arc::new(RecordingTransport::default()));
        let err = dispatcher
            .broadcast(BroadcastPayload::text("hello"), &BrokenDirectory)
            .await
            .unwrap_err();

        assert!(matches!(err, BroadcastError::Directory(_)));
        assert!(!dispatcher.is_running());
    }

    #[tokio::test]
    async fn test_events_and_status() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher(transport);
        let mut events = dispatcher.subscribe();
        let directory = MemoryDirectory::with_recipients(
            (0..5).map(|i| Recipient::new(i.to_string(), format!("chat-{i}"))),
        );

        dispatcher
            .broadcast(BroadcastPayload::text("hello"), &directory)
            .await
            .unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            BroadcastEvent::Started { total: 5, .. }
        ));
        // Batch of 2 over 5 recipients: progress after 2 and 4
        assert!(matches!(events.try_recv().unwrap(), BroadcastEvent::Progress(s) if s.processed() == 2));
        assert!(matches!(events.try_recv().unwrap(), BroadcastEvent::Progress(s) if s.processed() == 4));
        assert!(matches!(events.try_recv().unwrap(), BroadcastEvent::Completed(s) if s.sent == 5));

        let status = dispatcher.status().await;
        assert!(!status.running);
        assert!(status.current.is_none());
        assert_eq!(status.last_completed.unwrap().sent, 5);
    }

    /// Transport whose sends never complete
    struct StalledTransport;

    #[async_trait]
    impl DeliveryTransport for StalledTransport {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn send_text(
            &self,
            _address: &str,
            _text: &str,
            _format: &FormatDirectives,
        ) -> Result<(), DeliveryError> {
            std::future::pending().await
        }

        async fn send_image(
            &self,
            _address: &str,
            _image: &str,
            _caption: &str,
            _format: &FormatDirectives,
        ) -> Result<(), DeliveryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_dropped_broadcast_clears_status() {
        let dispatcher = Arc::new(Dispatcher::with_settings(
            Arc::new(StalledTransport),
            Duration::ZERO,
            2,
        ));
        let directory = Arc::new(MemoryDirectory::with_recipients(
            (0..3).map(|i| Recipient::new(i.to_string(), format!("chat-{i}"))),
        ));
        let mut events = dispatcher.subscribe();

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            let directory = Arc::clone(&directory);
            tokio::spawn(async move {
                dispatcher
                    .broadcast(BroadcastPayload::text("hello"), directory.as_ref())
                    .await
            })
        };

        assert!(matches!(
            events.recv().await.unwrap(),
            BroadcastEvent::Started { total: 3, .. }
        ));
        assert!(dispatcher.status().await.current.is_some());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let status = dispatcher.status().await;
        assert!(!status.running);
        assert!(status.current.is_none());
        assert!(status.last_completed.is_none());
    }

    #[test]
    fn test_stats_display() {
        let mut stats = BroadcastStats::start(Uuid::new_v4(), 120);
        stats.sent = 117;
        stats.failed = 3;
        stats.blocked = 3;
        stats.finished_at = Some(Utc::now());

        let display = stats.display();
        assert!(display.contains("Broadcast Completed"));
        assert!(display.contains("Sent: 117"));
        assert!(display.contains("Success Rate: 98%"));
    }
}
