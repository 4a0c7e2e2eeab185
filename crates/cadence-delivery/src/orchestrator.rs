//! Delivery orchestrator: routes each submission to replay or live delivery.
//!
//! Accepts at most one delivery per conversation at a time, registers the
//! user message and assistant placeholder before any I/O, and drives the
//! chosen producer into the response assembler until a terminal event.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cadence_core::config::{CadenceConfig, DeliveryConfig};
use cadence_core::events::DeliveryEvent;
use cadence_core::types::{DeliveryMode, Message, MessageId};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::assembler::{AssemblyOutcome, Notification, ResponseAssembler};
use crate::error::DeliveryError;
use crate::frame::ChunkFrameParser;
use crate::mode::ModeSource;
use crate::replay::{ReplayScheduler, ReplayScript, ScenarioCatalog};
use crate::state::DeliveryState;
use crate::store::{Conversation, DeliveryTicket, UpdateSink};
use crate::transport::{DeliveryRequest, FrameStream, LiveTransport, TransportError};

/// Events buffered between a producer and the assembler.
const EVENT_BUFFER: usize = 64;

/// Which producer served a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Replay,
    Live,
}

/// Final result of one accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Reply delivered; the model name is present if the producer announced one.
    Completed { model_name: Option<String> },
    /// Finished without content; the fallback text was shown.
    Empty,
    /// Failed; the apology text was shown.
    Failed,
    /// Abandoned by a conversation reset. Nothing more was shown.
    Cancelled,
}

/// Handle to an accepted delivery running in the background.
#[derive(Debug)]
pub struct DeliveryHandle {
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    pub route: Route,
    join: JoinHandle<DeliveryOutcome>,
}

impl DeliveryHandle {
    /// Wait for the delivery to reach a terminal state.
    pub async fn wait(self) -> DeliveryOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                tracing::error!(error = %e, "Delivery task panicked");
                DeliveryOutcome::Failed
            }
            Err(_) => DeliveryOutcome::Cancelled,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Coordinates replay and live deliveries for one conversation.
///
/// Cloning shares the same conversation.
#[derive(Clone)]
pub struct DeliveryOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    conversation: Mutex<Conversation>,
    catalog: ScenarioCatalog,
    scheduler: ReplayScheduler,
    transport: Arc<dyn LiveTransport>,
    mode: Arc<dyn ModeSource>,
    sink: Arc<dyn UpdateSink>,
    delivery: DeliveryConfig,
    idle_timeout: Option<Duration>,
}

impl DeliveryOrchestrator {
    /// Create an orchestrator with an empty conversation.
    pub fn new(
        config: &CadenceConfig,
        catalog: ScenarioCatalog,
        transport: Arc<dyn LiveTransport>,
        mode: Arc<dyn ModeSource>,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                conversation: Mutex::new(Conversation::new()),
                catalog,
                scheduler: ReplayScheduler::new(config.replay.time_scale),
                transport,
                mode,
                sink,
                delivery: config.delivery.clone(),
                idle_timeout: config.backend.idle_timeout(),
            }),
        }
    }

    /// Submit a user message.
    ///
    /// The text is trimmed; the trimmed form is stored, looked up in the
    /// scenario catalog and sent to the backend. On success both messages
    /// are already in the conversation when this returns, and the delivery
    /// runs on a spawned task. Must be called within a tokio runtime.
    pub fn submit(&self, text: &str, mode: DeliveryMode) -> Result<DeliveryHandle, DeliveryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DeliveryError::EmptyMessage);
        }
        let max = self.inner.delivery.max_message_chars;
        if text.chars().count() > max {
            return Err(DeliveryError::MessageTooLong(max));
        }

        let offline = self.inner.mode.is_offline();

        let ticket = {
            let mut conversation = self.inner.lock()?;
            match conversation.begin(text) {
                Ok(ticket) => ticket,
                Err(e) => {
                    tracing::warn!(error = %e, "Submission rejected");
                    return Err(e);
                }
            }
        };

        let script = if offline {
            self.inner.catalog.lookup(text, mode).cloned()
        } else {
            None
        };
        let route = if script.is_some() {
            Route::Replay
        } else {
            Route::Live
        };
        tracing::info!(
            message_id = %ticket.assistant_message_id,
            mode = %mode,
            offline,
            route = ?route,
            "Delivery started"
        );

        let request = DeliveryRequest {
            message: text.to_string(),
            mode,
        };
        let user_message_id = ticket.user_message_id;
        let assistant_message_id = ticket.assistant_message_id;
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move { inner.drive(ticket, request, script).await });

        Ok(DeliveryHandle {
            user_message_id,
            assistant_message_id,
            route,
            join,
        })
    }

    /// Drop every message and abandon the in-flight delivery, if any.
    pub fn reset_conversation(&self) -> Result<(), DeliveryError> {
        self.inner.lock()?.reset();
        Ok(())
    }

    /// Copy of the conversation's messages, oldest first.
    pub fn messages(&self) -> Result<Vec<Message>, DeliveryError> {
        Ok(self.inner.lock()?.snapshot())
    }

    pub fn message(&self, id: MessageId) -> Result<Option<Message>, DeliveryError> {
        Ok(self.inner.lock()?.message(id).cloned())
    }

    pub fn state(&self) -> Result<DeliveryState, DeliveryError> {
        Ok(self.inner.lock()?.state())
    }

    /// Whether a delivery is pending or streaming.
    pub fn is_busy(&self) -> bool {
        self.inner
            .lock()
            .map(|c| c.state().is_in_flight())
            .unwrap_or(false)
    }
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, Conversation>, DeliveryError> {
        self.conversation.lock().map_err(|e| {
            tracing::error!("Conversation lock poisoned: {}", e);
            DeliveryError::StorageError(format!("conversation lock poisoned: {}", e))
        })
    }

    /// Run one delivery to its end.
    ///
    /// The producer and the assembler loop run concurrently on this task and
    /// talk over a bounded channel. The producer is stopped as soon as the
    /// session retires or the conversation is reset.
    async fn drive(
        &self,
        ticket: DeliveryTicket,
        request: DeliveryRequest,
        script: Option<ReplayScript>,
    ) -> DeliveryOutcome {
        let started = Instant::now();
        let stop = ticket.cancel.child_token();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let producer = {
            let stop = stop.clone();
            let target = ticket.assistant_message_id;
            async move {
                match script {
                    Some(script) => {
                        self.scheduler.run(&script, target, tx, stop).await;
                    }
                    None => self.stream_live(&request, tx, &stop).await,
                }
            }
        };
        let consumer = self.assemble(&ticket, rx, &stop);
        let ((), (assembler, settled)) = tokio::join!(producer, consumer);

        // A terminal snapshot refused by the store means the conversation was
        // reset underneath this delivery.
        let outcome = match assembler.outcome().filter(|_| settled) {
            Some(AssemblyOutcome::Completed) => DeliveryOutcome::Completed {
                model_name: assembler.session().announced_model().map(str::to_string),
            },
            Some(AssemblyOutcome::Empty) => DeliveryOutcome::Empty,
            Some(AssemblyOutcome::Failed) => DeliveryOutcome::Failed,
            None => DeliveryOutcome::Cancelled,
        };
        tracing::info!(
            message_id = %ticket.assistant_message_id,
            chunks = assembler.session().chunk_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "Delivery finished"
        );
        outcome
    }

    /// Apply events until the session retires, the producer hangs up or the
    /// delivery is cancelled.
    ///
    /// Also returns whether the terminal snapshot was committed.
    async fn assemble(
        &self,
        ticket: &DeliveryTicket,
        mut rx: mpsc::Receiver<DeliveryEvent>,
        stop: &CancellationToken,
    ) -> (ResponseAssembler, bool) {
        let mut assembler = ResponseAssembler::new(ticket.assistant_message_id, &self.delivery);
        let mut settled = false;

        loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                event = rx.recv() => event,
            };
            let event = match event {
                Some(event) => event,
                None if stop.is_cancelled() => break,
                // Producers always end with a terminal event unless stopped.
                None => DeliveryEvent::Error("producer ended without a terminal event".into()),
            };
            tracing::debug!(
                message_id = %ticket.assistant_message_id,
                kind = event.kind(),
                "Applying delivery event"
            );
            if let Some(notification) = assembler.apply(event) {
                if !self.publish(ticket, &notification, assembler.outcome()) {
                    break;
                }
                settled = notification.terminal;
            }
            if assembler.is_retired() {
                break;
            }
        }
        stop.cancel();
        (assembler, settled)
    }

    /// Commit a snapshot to the conversation, then hand it to the UI sink.
    ///
    /// Returns `false` if the conversation no longer accepts updates for
    /// this delivery.
    fn publish(
        &self,
        ticket: &DeliveryTicket,
        notification: &Notification,
        outcome: Option<AssemblyOutcome>,
    ) -> bool {
        let committed = match self.lock() {
            Ok(mut conversation) => conversation
                .commit(ticket.generation, notification, outcome)
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Failed to commit delivery update");
                    false
                }),
            Err(_) => false,
        };
        if committed {
            self.sink.on_update(notification);
        } else {
            tracing::debug!(
                message_id = %notification.message_id,
                "Dropping update for abandoned delivery"
            );
        }
        committed
    }

    /// Live producer: open the request and feed the body through the frame
    /// parser. Every transport failure becomes one `Error` event.
    async fn stream_live(
        &self,
        request: &DeliveryRequest,
        tx: mpsc::Sender<DeliveryEvent>,
        stop: &CancellationToken,
    ) {
        let opened = tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            opened = self.with_idle_timeout(self.transport.open(request)) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Live delivery could not start");
                let _ = tx.send(DeliveryEvent::Error(e.to_string())).await;
                return;
            }
        };

        let mut parser = ChunkFrameParser::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                next = self.next_fragment(&mut stream) => next,
            };
            let events = match next {
                Ok(Some(fragment)) => parser.feed(&fragment),
                Ok(None) => {
                    let mut tail = parser.finish();
                    if !tail.iter().any(DeliveryEvent::is_terminal) {
                        tracing::debug!("Live body ended without a done frame");
                        tail.push(DeliveryEvent::Done);
                    }
                    tail
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Live delivery interrupted");
                    vec![DeliveryEvent::Error(e.to_string())]
                }
            };

            let mut finished = false;
            for event in events {
                finished |= event.is_terminal();
                if tx.send(event).await.is_err() {
                    return;
                }
                if finished {
                    break;
                }
            }
            if finished {
                if parser.dropped_frames() > 0 {
                    tracing::debug!(dropped = parser.dropped_frames(), "Malformed frames skipped");
                }
                return;
            }
        }
    }

    async fn next_fragment(
        &self,
        stream: &mut FrameStream,
    ) -> Result<Option<bytes::Bytes>, TransportError> {
        self.with_idle_timeout(async { stream.next().await.transpose() })
            .await
    }

    async fn with_idle_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => fut.await,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
