//! Extraction status tracking for the HTTP facade
//!
//! Extraction is simulated: a graph moves `queued -> processing -> ready` as
//! time passes after it was started. Time comes from an injected [`Clock`]
//! so the transitions can be driven deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};

/// Default time spent in each of the queued and processing states
pub const DEFAULT_TRANSITION: Duration = Duration::from_secs(2);

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<Instant>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Where an extraction stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionState {
    Queued,
    Processing,
    Ready,
}

impl ExtractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionState::Queued => "queued",
            ExtractionState::Processing => "processing",
            ExtractionState::Ready => "ready",
        }
    }

    /// Human readable status line
    pub fn message(&self) -> &'static str {
        match self {
            ExtractionState::Queued => "Extraction queued",
            ExtractionState::Processing => "Extraction processing",
            ExtractionState::Ready => "Extraction complete",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ExtractionState::Ready)
    }
}

impl std::fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks when each graph's extraction started
pub struct ExtractionTracker<C: Clock = SystemClock> {
    clock: C,
    transition: Duration,
    started: HashMap<String, Instant>,
}

impl ExtractionTracker<SystemClock> {
    pub fn new(transition: Duration) -> Self {
        Self::with_clock(SystemClock, transition)
    }
}

impl Default for ExtractionTracker<SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSITION)
    }
}

/// Tracker over a type-erased clock, as held by the HTTP server
pub type DynExtractionTracker = ExtractionTracker<Box<dyn Clock>>;

impl<C: Clock> ExtractionTracker<C> {
    pub fn with_clock(clock: C, transition: Duration) -> Self {
        Self {
            clock,
            transition,
            started: HashMap::new(),
        }
    }

    /// Erase the clock type, keeping any graphs already started
    pub fn boxed(self) -> DynExtractionTracker
    where
        C: 'static,
    {
        ExtractionTracker {
            clock: Box::new(self.clock),
            transition: self.transition,
            started: self.started,
        }
    }

    /// (Re)start extraction for a graph
    pub fn start(&mut self, graph_id: &str) -> ExtractionState {
        self.started.insert(graph_id.to_string(), self.clock.now());
        tracing::info!("Extraction queued for {}", graph_id);
        ExtractionState::Queued
    }

    /// Current state; polling a graph that was never started starts it.
    pub fn state(&mut self, graph_id: &str) -> ExtractionState {
        let now = self.clock.now();
        let Some(started) = self.started.get(graph_id).copied() else {
            return self.start(graph_id);
        };

        let elapsed = now.saturating_duration_since(started);
        if elapsed < self.transition {
            ExtractionState::Queued
        } else if elapsed < self.transition * 2 {
            ExtractionState::Processing
        } else {
            ExtractionState::Ready
        }
    }
}
