//! Offline replay of pre-authored replies.
//!
//! A [`ReplayScript`] fully determines one replayed delivery: the text, how it
//! is split into chunks and how long the chunks take to arrive. The
//! [`ReplayScheduler`] turns a script into the same [`DeliveryEvent`] sequence a
//! successful live stream would produce, so the assembler never knows the
//! difference. Scripts are looked up in a [`ScenarioCatalog`] by the exact
//! submitted text.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use cadence_core::events::DeliveryEvent;
use cadence_core::types::{DeliveryMode, MessageId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DeliveryError;

// =============================================================================
// ReplayScript
// =============================================================================

/// Immutable description of one replayed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    pub full_text: String,
    /// Simulated thinking time before the first chunk.
    pub start_delay_ms: u64,
    /// Time from submission until the last chunk is due. Never below
    /// `start_delay_ms`.
    pub total_duration_ms: u64,
    /// Words per content chunk, at least 1.
    pub words_per_chunk: usize,
    pub model_name: String,
}

impl ReplayScript {
    /// Check the timing and chunking invariants.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.words_per_chunk == 0 {
            return Err(DeliveryError::Scenario(
                "words_per_chunk must be at least 1".into(),
            ));
        }
        if self.total_duration_ms < self.start_delay_ms {
            return Err(DeliveryError::Scenario(format!(
                "total_duration_ms ({}) is shorter than start_delay_ms ({})",
                self.total_duration_ms, self.start_delay_ms
            )));
        }
        Ok(())
    }

    /// Split the text into ordered word groups.
    ///
    /// Each group is its words joined by single spaces plus one trailing
    /// space, so concatenating every chunk and trimming the end restores the
    /// text with normalized spacing.
    pub fn chunks(&self) -> Vec<String> {
        let words: Vec<&str> = self.full_text.split_whitespace().collect();
        words
            .chunks(self.words_per_chunk.max(1))
            .map(|group| {
                let mut chunk = group.join(" ");
                chunk.push(' ');
                chunk
            })
            .collect()
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// Pause between two consecutive chunks for a reply of `chunk_count`
    /// chunks. Zero when there is at most one chunk.
    pub fn per_chunk_delay(&self, chunk_count: usize) -> Duration {
        if chunk_count <= 1 {
            return Duration::ZERO;
        }
        let span = self.total_duration_ms.saturating_sub(self.start_delay_ms);
        Duration::from_millis(span) / chunk_count as u32
    }
}

// =============================================================================
// ScenarioCatalog
// =============================================================================

/// Per-mode scripts for one prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioScripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<ReplayScript>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<ReplayScript>,
}

impl ScenarioScripts {
    pub fn for_mode(&self, mode: DeliveryMode) -> Option<&ReplayScript> {
        match mode {
            DeliveryMode::Router => self.router.as_ref(),
            DeliveryMode::Benchmark => self.benchmark.as_ref(),
        }
    }

    fn slot_mut(&mut self, mode: DeliveryMode) -> &mut Option<ReplayScript> {
        match mode {
            DeliveryMode::Router => &mut self.router,
            DeliveryMode::Benchmark => &mut self.benchmark,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default, rename = "scenario")]
    scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
struct ScenarioEntry {
    prompt: String,
    #[serde(default)]
    router: Option<ReplayScript>,
    #[serde(default)]
    benchmark: Option<ReplayScript>,
}

/// Scripted replies keyed by exact, case-sensitive prompt text.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: HashMap<String, ScenarioScripts>,
}

impl ScenarioCatalog {
    /// An empty catalog. Offline submissions then always fall back to live.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a TOML file with `[[scenario]]` entries.
    pub fn load(path: &Path) -> Result<Self, DeliveryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeliveryError::Scenario(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            scenarios = catalog.len(),
            "Scenario catalog loaded"
        );
        Ok(catalog)
    }

    /// Parse a catalog from TOML text. Every script is validated and each
    /// prompt may appear only once.
    pub fn from_toml_str(content: &str) -> Result<Self, DeliveryError> {
        let file: ScenarioFile =
            toml::from_str(content).map_err(|e| DeliveryError::Scenario(e.to_string()))?;

        let mut catalog = Self::new();
        for entry in file.scenarios {
            if catalog.scenarios.contains_key(&entry.prompt) {
                return Err(DeliveryError::Scenario(format!(
                    "duplicate scenario prompt: {:?}",
                    entry.prompt
                )));
            }
            for script in [&entry.router, &entry.benchmark].into_iter().flatten() {
                script.validate().map_err(|e| {
                    DeliveryError::Scenario(format!("prompt {:?}: {}", entry.prompt, e))
                })?;
            }
            catalog.scenarios.insert(
                entry.prompt,
                ScenarioScripts {
                    router: entry.router,
                    benchmark: entry.benchmark,
                },
            );
        }
        Ok(catalog)
    }

    /// Demo scenarios shipped with the client.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        let prompt = "What can you do?";
        catalog.scenarios.insert(
            prompt.to_string(),
            ScenarioScripts {
                router: Some(ReplayScript {
                    full_text: "I can answer questions, summarize documents and help you \
                                draft text. Ask me anything and I will route your request \
                                to the most suitable model."
                        .to_string(),
                    start_delay_ms: 600,
                    total_duration_ms: 2400,
                    words_per_chunk: 3,
                    model_name: "router-small".to_string(),
                }),
                benchmark: Some(ReplayScript {
                    full_text: "I can answer questions, summarize documents and help you \
                                draft text, always using the benchmark model so you can \
                                compare quality."
                        .to_string(),
                    start_delay_ms: 1200,
                    total_duration_ms: 4200,
                    words_per_chunk: 2,
                    model_name: "benchmark-large".to_string(),
                }),
            },
        );
        catalog.scenarios.insert(
            "How does offline mode work?".to_string(),
            ScenarioScripts {
                router: Some(ReplayScript {
                    full_text: "Offline mode replays a recorded answer with realistic \
                                timing whenever your message matches a known prompt."
                        .to_string(),
                    start_delay_ms: 400,
                    total_duration_ms: 2000,
                    words_per_chunk: 4,
                    model_name: "router-small".to_string(),
                }),
                benchmark: None,
            },
        );
        catalog
    }

    /// Add or replace the script for one prompt and mode.
    pub fn insert(
        &mut self,
        prompt: impl Into<String>,
        mode: DeliveryMode,
        script: ReplayScript,
    ) -> Result<(), DeliveryError> {
        script.validate()?;
        *self
            .scenarios
            .entry(prompt.into())
            .or_default()
            .slot_mut(mode) = Some(script);
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, prompt: &str, mode: DeliveryMode) -> Option<&ReplayScript> {
        self.scenarios.get(prompt).and_then(|s| s.for_mode(mode))
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

// =============================================================================
// ReplayScheduler
// =============================================================================

/// How a replay run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every event was delivered, ending with `Done`.
    Completed { chunks: usize },
    /// Cancelled, or the consumer went away. Nothing further was sent.
    Abandoned,
}

/// Emits a script's events on a timer.
#[derive(Debug, Clone)]
pub struct ReplayScheduler {
    time_scale: f64,
}

impl Default for ReplayScheduler {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ReplayScheduler {
    /// `time_scale` multiplies every delay; 0.0 replays instantly.
    pub fn new(time_scale: f64) -> Self {
        let time_scale = if time_scale.is_finite() && time_scale >= 0.0 {
            time_scale
        } else {
            1.0
        };
        Self { time_scale }
    }

    /// Replay `script` into `events`.
    ///
    /// Waits the start delay, sends one `ContentChunk` per word group with
    /// the per-chunk delay between them, then `ModelAnnounced` and `Done`.
    /// An empty script sends only `Done`. Cancelling `cancel` abandons any
    /// pending wait and sends nothing more.
    pub async fn run(
        &self,
        script: &ReplayScript,
        target: MessageId,
        events: mpsc::Sender<DeliveryEvent>,
        cancel: CancellationToken,
    ) -> ReplayOutcome {
        let chunks = script.chunks();
        let gap = self.scaled(script.per_chunk_delay(chunks.len()));
        tracing::debug!(
            message_id = %target,
            chunks = chunks.len(),
            gap_ms = gap.as_millis() as u64,
            "Replay scheduled"
        );

        if !self.pause(self.scaled(script.start_delay()), &cancel).await {
            return ReplayOutcome::Abandoned;
        }

        let count = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if i > 0 && !self.pause(gap, &cancel).await {
                return ReplayOutcome::Abandoned;
            }
            if !Self::send(&events, &cancel, DeliveryEvent::ContentChunk(chunk)).await {
                return ReplayOutcome::Abandoned;
            }
        }

        if count > 0
            && !Self::send(
                &events,
                &cancel,
                DeliveryEvent::ModelAnnounced(script.model_name.clone()),
            )
            .await
        {
            return ReplayOutcome::Abandoned;
        }
        if !Self::send(&events, &cancel, DeliveryEvent::Done).await {
            return ReplayOutcome::Abandoned;
        }
        ReplayOutcome::Completed { chunks: count }
    }

    fn scaled(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.time_scale)
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn send(
        events: &mpsc::Sender<DeliveryEvent>,
        cancel: &CancellationToken,
        event: DeliveryEvent,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        events.send(event).await.is_ok()
    }
}
