//! Per-message orchestration: load the learner, pick a flow, persist, reply.
//!
//! Flow for one inbound message:
//!
//! 1. Load or create the [`LearnerProfile`] for the sender.
//! 2. `start` / `hi` runs the start flow: next topic, daily plan, history
//!    append, save. Anything else goes to the [`ConversationDelegate`].
//! 3. The reply is handed to the [`ReplySender`].
//!
//! A failed save aborts the start flow before anything is delivered. A failed
//! completion is answered with [`FALLBACK_REPLY`]. Delivery failures are
//! logged only.
//!
//! Messages from the same phone number are serialised through a per-phone
//! mutex held across load, mutate, and save, so two concurrent `start`
//! messages cannot both hand out the same topic.
//!
//! Work started with [`Orchestrator::spawn`] is counted until it finishes;
//! [`Orchestrator::drain`] waits for that count to reach zero on shutdown.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::conversation::{topic_hint, ConversationDelegate, ConversationError};
use crate::learning::{greeting_reply, TopicCatalog};
use crate::profiles::{LearnerProfile, ProfileError, ProfileStore};
use crate::whatsapp::{
    fit_message_body, mask_phone, InboundMessage, ReplySender, WebhookError, WhatsAppError,
};

/// Sent when the completion API cannot produce an answer.
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't come up with an answer right now. Please try again in a moment.";

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// What the learner asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start today's session and receive a plan.
    Start,
    /// Free-form question for the mentor.
    Converse,
}

/// Route message text: `start` or `hi` (trimmed, any case) start a session.
pub fn classify(text: &str) -> Command {
    let normalized = text.trim().to_lowercase();
    match normalized.as_str() {
        "start" | "hi" => Command::Start,
        _ => Command::Converse,
    }
}

/// Which flow produced a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// A daily plan for `topic` was issued.
    Start {
        /// The assigned topic.
        topic: String,
    },
    /// The mentor answered a question.
    Converse {
        /// Whether [`FALLBACK_REPLY`] stood in for a failed completion.
        fallback: bool,
    },
}

/// A composed reply ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Bare recipient phone number.
    pub phone: String,
    /// Reply text, delivered verbatim.
    pub text: String,
    /// Flow that produced it.
    pub flow: Flow,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of an external network collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ExternalServiceError {
    /// The completion API failed.
    #[error("completion: {0}")]
    Completion(#[from] ConversationError),
    /// The delivery API failed.
    #[error("delivery: {0}")]
    Delivery(#[from] WhatsAppError),
}

/// Errors surfaced while handling one inbound message.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Required inbound fields were missing.
    #[error("malformed request: {0}")]
    Malformed(#[from] WebhookError),
    /// The profile store could not be read or written.
    #[error("persistence failed: {0}")]
    Persistence(#[from] ProfileError),
    /// A completion or delivery call failed.
    #[error("external service failed: {0}")]
    ExternalService(#[from] ExternalServiceError),
}

// ---------------------------------------------------------------------------
// Per-phone serialisation
// ---------------------------------------------------------------------------

/// Table of per-phone async mutexes. Entries are dropped once unused.
#[derive(Debug, Default)]
pub struct PhoneLocks {
    table: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PhoneLocks {
    /// Wait for exclusive access to `phone`.
    pub async fn acquire(&self, phone: &str) -> PhoneGuard<'_> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(phone.to_owned()).or_default())
        };
        let guard = lock.lock_owned().await;
        PhoneGuard {
            guard: Some(guard),
            locks: self,
            phone: phone.to_owned(),
        }
    }

    /// Number of phones with a live lock entry.
    pub fn active(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive access to one phone number; released on drop.
#[derive(Debug)]
pub struct PhoneGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a PhoneLocks,
    phone: String,
}

impl Drop for PhoneGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.locks.table.lock().unwrap_or_else(|e| e.into_inner());
        if table
            .get(&self.phone)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.phone);
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight accounting
// ---------------------------------------------------------------------------

/// Interval between in-flight checks while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Decrements the in-flight counter when a spawned task ends, even on panic.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Routes inbound messages to the start or conversation flow.
pub struct Orchestrator {
    store: Arc<dyn ProfileStore>,
    catalog: Arc<TopicCatalog>,
    conversation: ConversationDelegate,
    sender: Arc<dyn ReplySender>,
    locks: PhoneLocks,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("topics", &self.catalog.len())
            .field("conversation", &self.conversation)
            .field("locks", &self.locks)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire the orchestrator to its collaborators.
    pub fn new(
        store: Arc<dyn ProfileStore>,
        catalog: Arc<TopicCatalog>,
        conversation: ConversationDelegate,
        sender: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            store,
            catalog,
            conversation,
            sender,
            locks: PhoneLocks::default(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of spawned messages still being processed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Compose the reply for `msg`, persisting any profile change first.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::Persistence`] if the profile cannot be loaded or saved.
    /// - [`OrchestratorError::ExternalService`] if the completion API fails.
    pub async fn compose_reply(&self, msg: &InboundMessage) -> Result<Reply, OrchestratorError> {
        let guard = self.locks.acquire(&msg.phone).await;
        let mut profile = self
            .store
            .find_or_create(&msg.phone, msg.name.as_deref())
            .await?;

        match classify(&msg.text) {
            Command::Start => {
                let reply = self.start_flow(&mut profile).await?;
                drop(guard);
                Ok(reply)
            }
            Command::Converse => {
                drop(guard);
                self.converse_flow(&profile, &msg.text).await
            }
        }
    }

    async fn start_flow(&self, profile: &mut LearnerProfile) -> Result<Reply, OrchestratorError> {
        let topic = self.catalog.select_topic(&profile.history);
        let record = !self.catalog.is_fallback(&topic);
        profile.assign_topic(&topic, record);
        self.store.save(profile).await?;
        info!(
            topic = %topic,
            completed = profile.history.len(),
            "daily plan issued"
        );
        Ok(Reply {
            phone: profile.phone.clone(),
            text: greeting_reply(&topic),
            flow: Flow::Start { topic },
        })
    }

    async fn converse_flow(
        &self,
        profile: &LearnerProfile,
        text: &str,
    ) -> Result<Reply, OrchestratorError> {
        let hint = profile.last_topic.as_deref().map(topic_hint);
        let answer = self
            .conversation
            .converse(text, hint.as_deref())
            .await
            .map_err(ExternalServiceError::from)?;
        let chars = answer.chars().count();
        let fitted = match fit_message_body(&answer) {
            Cow::Owned(fitted) => Some(fitted),
            Cow::Borrowed(_) => None,
        };
        let text = match fitted {
            Some(fitted) => {
                warn!(chars, "mentor answer exceeds message limit, truncated");
                fitted
            }
            None => {
                debug!(chars, "mentor answered");
                answer
            }
        };
        Ok(Reply {
            phone: profile.phone.clone(),
            text,
            flow: Flow::Converse { fallback: false },
        })
    }

    /// Compose and deliver the reply for `msg`.
    ///
    /// A completion failure is answered with [`FALLBACK_REPLY`] instead of
    /// being returned.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::Persistence`]: nothing was delivered.
    /// - [`OrchestratorError::ExternalService`] (delivery): the profile change,
    ///   if any, is already saved.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<Flow, OrchestratorError> {
        let reply = match self.compose_reply(msg).await {
            Ok(reply) => reply,
            Err(OrchestratorError::ExternalService(ExternalServiceError::Completion(e))) => {
                warn!(error = %e, "completion unavailable, sending fallback reply");
                Reply {
                    phone: msg.phone.clone(),
                    text: FALLBACK_REPLY.to_owned(),
                    flow: Flow::Converse { fallback: true },
                }
            }
            Err(e) => return Err(e),
        };

        self.sender
            .send_text(&reply.phone, &reply.text)
            .await
            .map_err(ExternalServiceError::from)?;
        Ok(reply.flow)
    }

    /// Handle `msg` inside a tracing span and log the outcome. Never fails.
    pub async fn process(&self, msg: InboundMessage) {
        let span = info_span!(
            "inbound",
            event_id = %Uuid::new_v4(),
            phone = %mask_phone(&msg.phone)
        );
        async {
            match self.handle(&msg).await {
                Ok(flow) => info!(?flow, "reply delivered"),
                Err(OrchestratorError::Persistence(e)) => {
                    error!(error = %e, "profile store failed, no reply sent");
                }
                Err(e) => warn!(error = %e, "message processing failed"),
            }
        }
        .instrument(span)
        .await;
    }

    /// Process `msg` on its own task and return immediately.
    ///
    /// The task counts towards [`Self::in_flight`] until it finishes.
    pub fn spawn(self: &Arc<Self>, msg: InboundMessage) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let guard = InFlight::enter(&self.in_flight);
        tokio::spawn(async move {
            let _guard = guard;
            this.process(msg).await;
        })
    }

    /// Wait up to `timeout` for spawned messages to finish.
    ///
    /// Returns the number still running when the deadline passed (0 when
    /// everything finished).
    pub async fn drain(&self, timeout: Duration) -> usize {
        let pending = self.in_flight();
        if pending == 0 {
            return 0;
        }
        info!(
            pending,
            timeout_secs = timeout.as_secs(),
            "waiting for in-flight messages"
        );
        let deadline = tokio::time::Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(tokio::time::Instant::now);
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                let remaining = self.in_flight();
                warn!(remaining, "shutdown deadline passed, abandoning in-flight messages");
                return remaining;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        info!("all in-flight messages finished");
        0
    }
}
