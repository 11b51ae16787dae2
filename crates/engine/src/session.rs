// Rewind - Stepped Execution Visualizer
// Copyright (C) 2024 Rewind Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The stepping session
//!
//! A [`Session`] ties an [`Interpreter`] to the execution history, the call-tree
//! tracker and the playback scheduler. Each logical step advances the
//! interpreter by one source line, copies its state into a snapshot, and infers
//! call and return events from the change in call-stack depth.
//!
//! The interpreter is owned by the session and only touched while stepping.
//! History navigation (`step_back`, replaying forward) never reaches it, so it is
//! safe to drive from a UI while playback runs on a background task.

use std::sync::Arc;

use parking_lot::Mutex;
use rewind_common::types::{ArrayVariable, Snapshot};
use tracing::{debug, error, info, warn};

use crate::{
    CallEvent, CallTreeTracker, CallTreeView, DepthTracker, DepthTransition, EngineConfig,
    ExecutionHistory, Interpreter, PerformanceCounters, PerformanceReport, PlaybackScheduler,
    RecordedInterpreter, SchedulerStatus, SessionError, SessionObserver, SessionResult, StateQuery,
    StepResult,
};

/// Warning emitted when execution is requested with no source
pub const EMPTY_SOURCE_WARNING: &str = "Please enter some code";

/// Result of [`Session::start_execution`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The source loaded and playback began
    Started,
    /// There was nothing to run; a warning was emitted
    EmptySource,
    /// A run is already in progress
    AlreadyStarted,
}

#[derive(Debug, Default)]
struct SourceBuffer {
    text: String,
    read_only: bool,
}

/// Everything a step mutates, guarded by a single lock so that stepping and
/// reset never interleave.
struct SessionCore {
    interpreter: Box<dyn Interpreter>,
    history: ExecutionHistory,
    tracker: CallTreeTracker,
    depth: DepthTracker,
    counters: PerformanceCounters,
    source: SourceBuffer,
    has_started: bool,
    max_micro_steps: usize,
}

/// A stepping, rewindable execution of one program.
pub struct Session {
    core: Arc<Mutex<SessionCore>>,
    scheduler: PlaybackScheduler,
    observer: Arc<dyn SessionObserver>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("Session")
            .field("has_started", &core.has_started)
            .field("history", &core.history)
            .field("calls", &core.tracker.total_calls())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Session {
    /// Create a session around an interpreter
    pub fn new(
        config: EngineConfig,
        interpreter: impl Interpreter + 'static,
        observer: Arc<dyn SessionObserver>,
    ) -> SessionResult<Self> {
        config.validate().map_err(|e| SessionError::Config(e.to_string()))?;

        let mut history = ExecutionHistory::new(&config.history);
        let limit_observer = Arc::clone(&observer);
        history.set_limit_callback(move |max| limit_observer.on_history_limit(max));

        let core = Arc::new(Mutex::new(SessionCore {
            interpreter: Box::new(interpreter),
            history,
            tracker: CallTreeTracker::new(),
            depth: DepthTracker::new(),
            counters: PerformanceCounters::new(),
            source: SourceBuffer::default(),
            has_started: false,
            max_micro_steps: config.execution.max_micro_steps,
        }));

        let step_core = Arc::clone(&core);
        let step_observer = Arc::clone(&observer);
        let scheduler =
            PlaybackScheduler::from_fn(config.playback.clone(), Arc::clone(&observer), move |_| {
                let core = Arc::clone(&step_core);
                let observer = Arc::clone(&step_observer);
                async move { execute_step(&core, observer.as_ref()) }
            });

        Ok(Self { core, scheduler, observer })
    }

    /// Create a session that replays recorded traces
    pub fn recorded(config: EngineConfig, observer: Arc<dyn SessionObserver>) -> SessionResult<Self> {
        let interpreter = RecordedInterpreter::new(config.interpreter.clone());
        Self::new(config, interpreter, observer)
    }

    /// Replace the source; refused while a run holds it read-only
    pub fn set_source(&self, text: impl Into<String>) -> SessionResult<()> {
        let mut core = self.core.lock();
        if core.source.read_only {
            return Err(SessionError::SourceLocked);
        }
        core.source.text = text.into();
        Ok(())
    }

    /// Current source text
    pub fn source(&self) -> String {
        self.core.lock().source.text.clone()
    }

    /// Load the source and begin playback.
    ///
    /// An empty source only produces a warning. A load failure is reported to the
    /// observer, leaves the source editable and returns the error. Must be called
    /// from within a Tokio runtime.
    pub fn start_execution(&self) -> SessionResult<StartOutcome> {
        let outcome = self.start()?;
        if outcome == StartOutcome::Started {
            self.scheduler.play();
        }
        Ok(outcome)
    }

    fn start(&self) -> SessionResult<StartOutcome> {
        let loaded = {
            let mut core = self.core.lock();
            if core.has_started {
                return Ok(StartOutcome::AlreadyStarted);
            }
            if core.source.text.trim().is_empty() {
                None
            } else {
                core.source.read_only = true;
                core.counters.start();
                let SessionCore { interpreter, source, .. } = &mut *core;
                let loaded = interpreter.load(&source.text);
                match loaded {
                    Ok(()) => core.has_started = true,
                    Err(_) => core.source.read_only = false,
                }
                Some(loaded)
            }
        };

        match loaded {
            None => {
                warn!("Refusing to start with an empty source");
                self.observer.on_warning(EMPTY_SOURCE_WARNING);
                Ok(StartOutcome::EmptySource)
            }
            Some(Ok(())) => {
                info!("Execution started");
                Ok(StartOutcome::Started)
            }
            Some(Err(err)) => {
                let err = SessionError::Load(err.to_string());
                error!("Execution failed to start: {err}");
                self.observer.on_failure(&err);
                Err(err)
            }
        }
    }

    /// Start if idle, otherwise toggle the scheduler between playing and paused
    pub fn toggle_play_pause(&self) -> SessionResult<()> {
        if self.has_started() {
            self.scheduler.toggle_play_pause();
        } else {
            self.start_execution()?;
        }
        Ok(())
    }

    /// Advance by one step.
    ///
    /// Before the run starts this starts it paused and takes the first step.
    /// Snapshots ahead of the history cursor are replayed without touching the
    /// interpreter; otherwise the interpreter is stepped. Returns the snapshot now
    /// under the cursor if it changed.
    pub async fn step_forward(&self) -> SessionResult<Option<Arc<Snapshot>>> {
        if !self.has_started() {
            if self.start()? != StartOutcome::Started {
                return Ok(None);
            }
            self.scheduler.pause();
            self.scheduler.step_forward().await?;
            return Ok(self.current_snapshot());
        }

        let replayed = {
            let mut core = self.core.lock();
            if core.history.can_step_forward() { core.history.step_forward() } else { None }
        };
        if let Some(snapshot) = replayed {
            debug!("Replayed snapshot at step {} from history", snapshot.step_number);
            self.observer.on_snapshot(&snapshot);
            return Ok(Some(snapshot));
        }

        let before = self.current_snapshot();
        self.scheduler.step_forward().await?;
        let after = self.current_snapshot();
        Ok(match (before, after) {
            (Some(before), Some(after)) if Arc::ptr_eq(&before, &after) => None,
            (_, after) => after,
        })
    }

    /// Move back through history; a no-op at the start.
    ///
    /// Stepping back from a completed run makes it resumable again.
    pub fn step_back(&self) -> Option<Arc<Snapshot>> {
        let snapshot = self.core.lock().history.step_back()?;
        debug!("Stepped back to step {}", snapshot.step_number);
        self.observer.on_snapshot(&snapshot);
        if self.scheduler.resume_from_completed() {
            debug!("Cleared completion after stepping back");
        }
        Some(snapshot)
    }

    /// Return every component to its initial state together
    pub fn reset(&self) {
        self.scheduler.reset();
        let mut core = self.core.lock();
        core.interpreter.reset();
        core.history.clear();
        core.tracker.reset();
        core.depth.reset();
        core.counters.reset();
        core.source.read_only = false;
        core.has_started = false;
        debug!("Session reset");
    }

    /// Set the playback speed, returning the clamped value
    pub fn set_speed(&self, speed_ms: u64) -> u64 {
        self.scheduler.set_speed(speed_ms)
    }

    /// Enable or disable turbo playback
    pub fn set_turbo(&self, enabled: bool) {
        self.scheduler.set_turbo(enabled);
    }

    /// Pause playback
    pub fn pause(&self) {
        self.scheduler.pause();
    }

    /// Wait until the current playback task finishes
    pub async fn wait_for_playback(&self) {
        self.scheduler.wait().await;
    }

    /// Snapshot under the history cursor
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.core.lock().history.current()
    }

    /// Number of retained snapshots
    pub fn history_len(&self) -> usize {
        self.core.lock().history.len()
    }

    /// History cursor, `None` when empty
    pub fn history_cursor(&self) -> Option<usize> {
        self.core.lock().history.cursor()
    }

    /// Whether there is a snapshot to go back to
    pub fn can_step_back(&self) -> bool {
        self.core.lock().history.can_step_back()
    }

    /// Array-typed variables of the current snapshot
    pub fn arrays(&self) -> Vec<ArrayVariable> {
        self.core.lock().history.arrays()
    }

    /// Call tree of the first top-level call
    pub fn call_tree(&self) -> Option<CallTreeView> {
        self.core.lock().tracker.to_hierarchy()
    }

    /// Call trees of every top-level call
    pub fn call_forest(&self) -> Vec<CallTreeView> {
        self.core.lock().tracker.to_forest()
    }

    /// Run the closure against the call-tree tracker
    pub fn with_tracker<R>(&self, f: impl FnOnce(&CallTreeTracker) -> R) -> R {
        f(&self.core.lock().tracker)
    }

    /// Performance counters of the current run
    pub fn metrics(&self) -> PerformanceReport {
        self.core.lock().counters.report()
    }

    /// Scheduler status
    pub fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Whether playback ran out of work
    pub fn is_complete(&self) -> bool {
        self.scheduler.is_complete()
    }

    /// Whether a run has been started since the last reset
    pub fn has_started(&self) -> bool {
        self.core.lock().has_started
    }

    /// Whether the source is locked by a run
    pub fn is_source_read_only(&self) -> bool {
        self.core.lock().source.read_only
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.scheduler.cancel();
    }
}

/// One logical step: advance the interpreter, capture, and infer calls.
///
/// Observers are notified after the core lock is released.
fn execute_step(core: &Mutex<SessionCore>, observer: &dyn SessionObserver) -> SessionResult<StepResult> {
    let (snapshot, event, has_more) = {
        let mut guard = core.lock();
        let core = &mut *guard;
        if !core.has_started || core.interpreter.is_done() {
            core.counters.finish();
            return Ok(StepResult { has_more: false });
        }

        core.counters.record_step();
        let step = match core.interpreter.step_to_next_line(core.max_micro_steps) {
            Ok(step) => step,
            Err(err) => {
                core.source.read_only = false;
                core.counters.finish();
                return Err(err.into());
            }
        };
        if step.micro_steps > core.max_micro_steps {
            warn!(
                "Interpreter spent {} micro-steps on one line, ceiling is {}",
                step.micro_steps, core.max_micro_steps
            );
        }
        if !step.has_more {
            core.counters.finish();
        }

        let query: &dyn StateQuery = &*core.interpreter;
        let Some(snapshot) = core.history.capture(Some(query)) else {
            return Ok(StepResult { has_more: step.has_more });
        };

        core.counters.observe_depth(snapshot.depth());
        let transition = core.depth.observe(&snapshot);
        // every entered frame counts, named or not
        if matches!(transition, DepthTransition::Entered(_)) {
            core.counters.record_call();
        }
        let event = transition.into_event();
        match &event {
            Some(CallEvent::Call { function_name, arguments, step, line }) => {
                core.tracker.on_function_call(function_name.clone(), arguments.clone(), *step, *line);
            }
            Some(CallEvent::Return { value, step }) => {
                core.tracker.on_function_return(value.clone(), *step);
            }
            None => {}
        }
        (snapshot, event, step.has_more)
    };

    observer.on_snapshot(&snapshot);
    if let Some(event) = &event {
        observer.on_call_tree_updated(event);
    }
    Ok(StepResult { has_more })
}
