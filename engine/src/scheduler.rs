//! Save scheduling: debounce with a staleness ceiling.
//!
//! The scheduler is a pure state machine. It never reads a clock; the caller
//! passes `now` as milliseconds since an arbitrary epoch (usually session
//! start) and asks for the next deadline to sleep until.
//!
//! Two named deadlines are tracked:
//!
//! - [`Deadline::Debounce`] is pushed back on every mutation.
//! - [`Deadline::MaxStaleness`] is armed on the first mutation of a dirty
//!   period and never moves, so a save happens even if edits never pause.
//!
//! Whichever comes first starts the save and both are cleared.

use crate::Millis;
use serde::{Deserialize, Serialize};

/// Default quiet period after the last mutation.
pub const DEFAULT_DEBOUNCE_MS: Millis = 2_000;

/// Default upper bound on how long a document may stay dirty.
pub const DEFAULT_MAX_INTERVAL_MS: Millis = 30_000;

/// Timing configuration for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub debounce_ms: Millis,
    pub max_interval_ms: Millis,
}

impl SchedulerConfig {
    pub fn new(debounce_ms: Millis, max_interval_ms: Millis) -> Self {
        Self {
            debounce_ms,
            max_interval_ms,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_INTERVAL_MS)
    }
}

/// Where the scheduler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerPhase {
    /// Nothing pending
    Idle,
    /// At least one deadline armed
    Debouncing,
    /// A save attempt is in flight
    Saving,
}

/// The two timers a dirty period can be waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Deadline {
    Debounce,
    MaxStaleness,
}

/// Host events that bypass both timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlushReason {
    /// The document became hidden or backgrounded
    Hidden,
    /// The window lost focus
    Blurred,
    /// The page is about to unload
    Unloading,
    /// Explicit save request
    Manual,
    /// A conflict resolution produced a document to write
    Resolved,
}

/// Why a save was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveTrigger {
    Deadline(Deadline),
    Flush(FlushReason),
}

/// How an attempt ended, as far as scheduling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFinish {
    Accepted,
    Conflict,
    Failed,
}

/// Decides when the session should attempt a save.
#[derive(Debug, Clone)]
pub struct SaveScheduler {
    config: SchedulerConfig,
    phase: SchedulerPhase,
    debounce_at: Option<Millis>,
    stale_at: Option<Millis>,
    /// Flush requested while a save was in flight
    flush_pending: Option<FlushReason>,
}

impl SaveScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            phase: SchedulerPhase::Idle,
            debounce_at: None,
            stale_at: None,
            flush_pending: None,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Absolute time of a deadline, if armed.
    pub fn deadline(&self, which: Deadline) -> Option<Millis> {
        match which {
            Deadline::Debounce => self.debounce_at,
            Deadline::MaxStaleness => self.stale_at,
        }
    }

    /// The earlier of the two armed deadlines.
    ///
    /// Nothing is due while a save is in flight.
    pub fn next_deadline(&self) -> Option<(Deadline, Millis)> {
        if self.phase != SchedulerPhase::Debouncing {
            return None;
        }
        match (self.debounce_at, self.stale_at) {
            (Some(debounce), Some(stale)) if stale < debounce => {
                Some((Deadline::MaxStaleness, stale))
            }
            (Some(debounce), _) => Some((Deadline::Debounce, debounce)),
            (None, Some(stale)) => Some((Deadline::MaxStaleness, stale)),
            (None, None) => None,
        }
    }

    /// A mutation was applied to the document.
    pub fn on_mutation(&mut self, now: Millis) {
        self.debounce_at = Some(now.saturating_add(self.config.debounce_ms));
        if self.stale_at.is_none() {
            self.stale_at = Some(now.saturating_add(self.config.max_interval_ms));
        }
        if self.phase == SchedulerPhase::Idle {
            self.phase = SchedulerPhase::Debouncing;
        }
    }

    /// Fire whichever deadline has passed.
    ///
    /// On `Some`, the caller must start exactly one save attempt.
    pub fn poll(&mut self, now: Millis) -> Option<SaveTrigger> {
        let (which, at) = self.next_deadline()?;
        if at > now {
            return None;
        }
        self.start_saving();
        Some(SaveTrigger::Deadline(which))
    }

    /// Save right away because of a host event.
    ///
    /// A clean document makes this a no-op. While a save is in flight the
    /// request is remembered and handed back by [`Self::on_save_finished`].
    pub fn flush(&mut self, reason: FlushReason, dirty: bool) -> Option<SaveTrigger> {
        if !dirty {
            return None;
        }
        if self.phase == SchedulerPhase::Saving {
            self.flush_pending.get_or_insert(reason);
            return None;
        }
        self.start_saving();
        Some(SaveTrigger::Flush(reason))
    }

    /// The in-flight attempt has finished.
    ///
    /// `still_dirty` is the store's dirty flag after the result was applied.
    /// Returns a trigger when a flush was requested during the attempt and
    /// there is still something to save.
    pub fn on_save_finished(
        &mut self,
        finish: SaveFinish,
        still_dirty: bool,
        now: Millis,
    ) -> Option<SaveTrigger> {
        if self.phase != SchedulerPhase::Saving {
            return None;
        }
        if !still_dirty {
            self.reset();
            return None;
        }

        // After a conflict the resolution decides what is written next.
        let pending = self.flush_pending.take();
        if let (Some(reason), false) = (pending, finish == SaveFinish::Conflict) {
            self.start_saving();
            return Some(SaveTrigger::Flush(reason));
        }

        self.phase = SchedulerPhase::Debouncing;
        // Failures are not retried on a short timer; only the ceiling (or a
        // new mutation) brings the next attempt.
        if finish != SaveFinish::Failed && self.debounce_at.is_none() {
            self.debounce_at = Some(now.saturating_add(self.config.debounce_ms));
        }
        if self.stale_at.is_none() {
            self.stale_at = Some(now.saturating_add(self.config.max_interval_ms));
        }
        None
    }

    /// Forget all pending work.
    pub fn reset(&mut self) {
        self.phase = SchedulerPhase::Idle;
        self.debounce_at = None;
        self.stale_at = None;
        self.flush_pending = None;
    }

    fn start_saving(&mut self) {
        self.phase = SchedulerPhase::Saving;
        self.debounce_at = None;
        self.stale_at = None;
    }
}

impl Default for SaveScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
