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

//! Timed playback of session steps
//!
//! [`PlaybackScheduler`] repeatedly invokes a step function on a Tokio task,
//! waiting between steps according to the configured speed. It moves through
//! `idle -> playing <-> paused -> completed`, with `stop` and `reset` returning
//! to rest from any state.
//!
//! Every `play` owns a fresh [`CancellationToken`]. Starting another run or
//! stopping cancels it, and the loop checks the token before and after every
//! suspension point, so a step scheduled by a cancelled run never executes.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{PlaybackConfig, SessionError, SessionObserver, SessionResult};

/// Scheduler state names carried by every status notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing has run yet
    #[default]
    Idle,
    /// The loop is stepping
    Playing,
    /// The loop is suspended
    Paused,
    /// The step function ran out of work
    Completed,
    /// Playback was aborted
    Stopped,
    /// Counters were cleared
    Reset,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Payload of a scheduler state notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// State just entered
    pub state: PlaybackState,
    /// Whether a run is active
    pub playing: bool,
    /// Whether the run is suspended
    pub paused: bool,
    /// Whether the step function reported no more work
    pub completed: bool,
    /// Steps that reported more work since the last reset
    pub current_step: usize,
    /// Highest step count observed since the last reset
    pub total_steps: usize,
    /// Configured inter-step delay in milliseconds
    pub speed_ms: u64,
}

/// Result of one step request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    /// Whether more steps remain
    pub has_more: bool,
}

/// The unit of work driven by the scheduler, given the current step index
pub type StepFn = Arc<dyn Fn(usize) -> BoxFuture<'static, SessionResult<StepResult>> + Send + Sync>;

#[derive(Debug)]
struct PlaybackFlags {
    state: PlaybackState,
    playing: bool,
    paused: bool,
    completed: bool,
    current_step: usize,
    total_steps: usize,
    speed_ms: u64,
    turbo: bool,
    token: CancellationToken,
}

impl PlaybackFlags {
    fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state,
            playing: self.playing,
            paused: self.paused,
            completed: self.completed,
            current_step: self.current_step,
            total_steps: self.total_steps,
            speed_ms: self.speed_ms,
        }
    }

    fn is_running(&self) -> bool {
        self.playing && !self.paused && !self.completed
    }
}

struct SchedulerInner {
    config: PlaybackConfig,
    flags: Mutex<PlaybackFlags>,
    step: StepFn,
    observer: Arc<dyn SessionObserver>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes step requests between the loop and manual stepping
    step_gate: tokio::sync::Mutex<()>,
}

/// Cloneable handle to a playback scheduler.
#[derive(Clone)]
pub struct PlaybackScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackScheduler").field("status", &self.status()).finish()
    }
}

impl PlaybackScheduler {
    /// Create a scheduler around a step function
    pub fn new(config: PlaybackConfig, step: StepFn, observer: Arc<dyn SessionObserver>) -> Self {
        let flags = PlaybackFlags {
            state: PlaybackState::Idle,
            playing: false,
            paused: false,
            completed: false,
            current_step: 0,
            total_steps: 0,
            speed_ms: config.clamp_speed(config.speed_ms),
            turbo: config.turbo,
            token: CancellationToken::new(),
        };
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                flags: Mutex::new(flags),
                step,
                observer,
                task: Mutex::new(None),
                step_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a scheduler from an async closure
    pub fn from_fn<F, Fut>(config: PlaybackConfig, observer: Arc<dyn SessionObserver>, step: F) -> Self
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SessionResult<StepResult>> + Send + 'static,
    {
        let step: StepFn = Arc::new(move |index| Box::pin(step(index)));
        Self::new(config, step, observer)
    }

    /// Start stepping on a background task.
    ///
    /// Returns `false` without doing anything once completed. Any previous run is
    /// cancelled first. Must be called from within a Tokio runtime.
    pub fn play(&self) -> bool {
        let token = {
            let mut flags = self.inner.flags.lock();
            if flags.completed {
                debug!("Ignoring play, playback already completed");
                return false;
            }
            flags.token.cancel();
            flags.token = CancellationToken::new();
            flags.playing = true;
            flags.paused = false;
            flags.token.clone()
        };
        self.transition(PlaybackState::Playing);

        let handle = tokio::spawn(self.clone().run_loop(token));
        if self.inner.task.lock().replace(handle).is_some() {
            trace!("Replaced previous playback task");
        }
        true
    }

    async fn run_loop(self, token: CancellationToken) {
        debug!("Playback loop started");
        loop {
            if token.is_cancelled() || !self.inner.flags.lock().is_running() {
                break;
            }

            let Some(outcome) = self.execute_loop_step(&token).await else {
                if !self.wait_while_paused(&token).await {
                    return;
                }
                continue;
            };
            if token.is_cancelled() {
                trace!("Playback cancelled while a step was in flight");
                break;
            }
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    self.complete();
                    break;
                }
                Err(err) => {
                    self.fail(&err);
                    break;
                }
            }

            if !Self::sleep(self.delay(), &token).await || !self.wait_while_paused(&token).await {
                break;
            }
        }
        debug!("Playback loop finished");
    }

    /// Poll until unpaused, returning `false` if the token fired
    async fn wait_while_paused(&self, token: &CancellationToken) -> bool {
        while self.is_paused_while_playing() {
            if !Self::sleep(self.inner.config.pause_poll(), token).await {
                debug!("Playback loop cancelled while paused");
                return false;
            }
        }
        true
    }

    /// Wait for `duration`, returning `false` if the token fired
    async fn sleep(duration: Duration, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(duration) => !token.is_cancelled(),
        }
    }

    async fn execute_step(&self) -> SessionResult<bool> {
        let _gate = self.inner.step_gate.lock().await;
        self.step_under_gate().await
    }

    /// Loop step; `None` if the run was cancelled or paused while waiting for the gate
    async fn execute_loop_step(&self, token: &CancellationToken) -> Option<SessionResult<bool>> {
        let _gate = self.inner.step_gate.lock().await;
        if token.is_cancelled() || !self.inner.flags.lock().is_running() {
            trace!("Skipping step, playback changed while waiting for the step gate");
            return None;
        }
        Some(self.step_under_gate().await)
    }

    async fn step_under_gate(&self) -> SessionResult<bool> {
        let index = self.inner.flags.lock().current_step;
        let result = (self.inner.step)(index).await?;
        if result.has_more {
            let mut flags = self.inner.flags.lock();
            flags.current_step += 1;
            flags.total_steps = flags.total_steps.max(flags.current_step);
        }
        Ok(result.has_more)
    }

    /// Suspend the loop at its next check; a step already in flight finishes
    pub fn pause(&self) {
        self.inner.flags.lock().paused = true;
        self.transition(PlaybackState::Paused);
    }

    /// Cancel any pending wait and halt playback
    pub fn stop(&self) {
        {
            let mut flags = self.inner.flags.lock();
            flags.playing = false;
            flags.paused = false;
            flags.token.cancel();
        }
        self.transition(PlaybackState::Stopped);
    }

    /// Stop, then clear the step counters and the completed flag
    pub fn reset(&self) {
        self.stop();
        {
            let mut flags = self.inner.flags.lock();
            flags.current_step = 0;
            flags.total_steps = 0;
            flags.completed = false;
        }
        self.transition(PlaybackState::Reset);
    }

    /// Perform exactly one step, pausing a running loop first.
    ///
    /// Returns whether more work remains; once completed this is a no-op
    /// returning `false`.
    pub async fn step_forward(&self) -> SessionResult<bool> {
        let (completed, running) = {
            let flags = self.inner.flags.lock();
            (flags.completed, flags.playing && !flags.paused)
        };
        if completed {
            return Ok(false);
        }
        if running {
            self.pause();
        }

        match self.execute_step().await {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.complete();
                Ok(false)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Restart when completed, pause when running, otherwise play
    pub fn toggle_play_pause(&self) {
        let (completed, running) = {
            let flags = self.inner.flags.lock();
            (flags.completed, flags.playing && !flags.paused)
        };
        if completed {
            self.reset();
            self.play();
        } else if running {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Clear the completed flag after navigating back from the end
    pub fn resume_from_completed(&self) -> bool {
        {
            let mut flags = self.inner.flags.lock();
            if !flags.completed {
                return false;
            }
            flags.completed = false;
            flags.paused = true;
        }
        self.transition(PlaybackState::Paused);
        true
    }

    /// Set the inter-step delay, clamped into the configured bounds
    pub fn set_speed(&self, speed_ms: u64) -> u64 {
        let speed_ms = self.inner.config.clamp_speed(speed_ms);
        self.inner.flags.lock().speed_ms = speed_ms;
        speed_ms
    }

    /// Halve the inter-step delay
    pub fn set_turbo(&self, enabled: bool) {
        self.inner.flags.lock().turbo = enabled;
    }

    /// Delay before the next automatic step
    pub fn delay(&self) -> Duration {
        let flags = self.inner.flags.lock();
        self.inner.config.step_delay(flags.speed_ms, flags.turbo)
    }

    /// Current status
    pub fn status(&self) -> SchedulerStatus {
        self.inner.flags.lock().status()
    }

    /// Whether the step function reported no more work
    pub fn is_complete(&self) -> bool {
        self.inner.flags.lock().completed
    }

    /// Whether a run is active
    pub fn is_playing(&self) -> bool {
        self.inner.flags.lock().playing
    }

    /// Whether the run is suspended
    pub fn is_paused(&self) -> bool {
        self.inner.flags.lock().paused
    }

    /// Wait for the playback task, including any run started while waiting
    pub async fn wait(&self) {
        loop {
            let handle = self.inner.task.lock().take();
            let Some(handle) = handle else { break };
            if let Err(err) = handle.await {
                warn!("Playback task ended abnormally: {err}");
            }
        }
    }

    /// Cancel the current run without emitting a notification
    pub fn cancel(&self) {
        self.inner.flags.lock().token.cancel();
    }

    fn is_paused_while_playing(&self) -> bool {
        let flags = self.inner.flags.lock();
        flags.paused && flags.playing
    }

    fn complete(&self) {
        {
            let mut flags = self.inner.flags.lock();
            if flags.completed {
                return;
            }
            flags.playing = false;
            flags.paused = false;
            flags.completed = true;
        }
        self.transition(PlaybackState::Completed);
        debug!("Playback completed");
        self.inner.observer.on_complete();
    }

    fn fail(&self, err: &SessionError) {
        error!("Playback halted: {err}");
        self.inner.observer.on_failure(err);
        self.stop();
    }

    fn transition(&self, state: PlaybackState) {
        let status = {
            let mut flags = self.inner.flags.lock();
            flags.state = state;
            flags.status()
        };
        trace!("Scheduler state: {state}");
        self.inner.observer.on_scheduler_state(&status);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<SchedulerStatus>>,
        completions: AtomicUsize,
        failures: Mutex<Vec<SessionError>>,
    }

    impl Recorder {
        fn state_names(&self) -> Vec<PlaybackState> {
            self.states.lock().iter().map(|s| s.state).collect()
        }
    }

    impl SessionObserver for Recorder {
        fn on_scheduler_state(&self, status: &SchedulerStatus) {
            self.states.lock().push(status.clone());
        }

        fn on_complete(&self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, error: &SessionError) {
            self.failures.lock().push(error.clone());
        }
    }

    fn config(speed_ms: u64) -> PlaybackConfig {
        PlaybackConfig { speed_ms, ..Default::default() }
    }

    /// A scheduler whose step function reports work for `limit` calls
    fn counting(speed_ms: u64, limit: usize) -> (PlaybackScheduler, Arc<Recorder>, Arc<AtomicUsize>) {
        let recorder = Arc::new(Recorder::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let scheduler = PlaybackScheduler::from_fn(config(speed_ms), recorder.clone(), move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(StepResult { has_more: n < limit }) }
        });
        (scheduler, recorder, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_waiting_for_gate_runs_no_step() {
        let (scheduler, recorder, calls) = counting(10, 100);
        let gate = scheduler.inner.step_gate.lock().await;
        assert!(scheduler.play());
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        scheduler.stop();
        drop(gate);
        scheduler.wait().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.state_names(), vec![PlaybackState::Playing, PlaybackState::Stopped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_while_waiting_for_gate_holds_the_loop() {
        let (scheduler, _recorder, calls) = counting(10, 100);
        let gate = scheduler.inner.step_gate.lock().await;
        assert!(scheduler.play());
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        scheduler.pause();
        drop(gate);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_paused());

        scheduler.stop();
        scheduler.wait().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_completion() {
        let (scheduler, recorder, calls) = counting(10, 1);
        assert!(scheduler.play());
        scheduler.wait().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_complete());
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.state_names(), vec![PlaybackState::Playing, PlaybackState::Completed]);
        assert_eq!(scheduler.status().current_step, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_to_completion() {
        let (scheduler, recorder, calls) = counting(10, 5);
        scheduler.play();
        scheduler.wait().await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let status = scheduler.status();
        assert_eq!(status.state, PlaybackState::Completed);
        assert!(status.completed && !status.playing && !status.paused);
        assert_eq!(status.current_step, 4);
        assert_eq!(status.total_steps, 4);
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 1);

        // completed playback ignores further play and step requests
        assert!(!scheduler.play());
        assert!(!scheduler.step_forward().await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_suspends_and_play_resumes() {
        let (scheduler, _recorder, calls) = counting(100, usize::MAX);
        scheduler.play();
        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.pause();
        let paused_at = calls.load(Ordering::SeqCst);
        assert!(paused_at >= 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), paused_at);
        assert!(scheduler.is_paused());

        scheduler.play();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), paused_at + 1);
        scheduler.stop();
        scheduler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_delay() {
        let (scheduler, recorder, calls) = counting(2000, usize::MAX);
        scheduler.play();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        scheduler.stop();
        scheduler.wait().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status().state, PlaybackState::Stopped);
        assert!(!scheduler.is_playing());
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_play_cancels_previous_loop() {
        let (scheduler, _recorder, calls) = counting(100, usize::MAX);
        scheduler.play();
        scheduler.play();
        scheduler.play();
        tokio::time::sleep(Duration::from_millis(1050)).await;
        scheduler.stop();
        scheduler.wait().await;

        // one loop worth of steps, not three
        let steps = calls.load(Ordering::SeqCst);
        assert!((10..=12).contains(&steps), "unexpected step count {steps}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_step_pauses_running_loop() {
        let (scheduler, recorder, calls) = counting(100, 3);
        scheduler.play();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(scheduler.step_forward().await.unwrap());
        assert!(scheduler.is_paused());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(!scheduler.step_forward().await.unwrap());
        assert!(scheduler.is_complete());
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 1);
        scheduler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_restarts_after_completion() {
        let (scheduler, recorder, calls) = counting(10, 1);
        scheduler.toggle_play_pause();
        scheduler.wait().await;
        assert!(scheduler.is_complete());

        scheduler.toggle_play_pause();
        scheduler.wait().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let names = recorder.state_names();
        assert!(names.contains(&PlaybackState::Reset));
        assert_eq!(names.last(), Some(&PlaybackState::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_pauses_running_loop() {
        let (scheduler, _recorder, _calls) = counting(100, usize::MAX);
        scheduler.toggle_play_pause();
        assert!(scheduler.is_playing());
        scheduler.toggle_play_pause();
        assert!(scheduler.is_paused());
        scheduler.stop();
        scheduler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_failure_stops_playback() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = PlaybackScheduler::from_fn(config(10), recorder.clone(), |index| async move {
            if index < 2 {
                Ok(StepResult { has_more: true })
            } else {
                Err(SessionError::Runtime("boom".into()))
            }
        });
        scheduler.play();
        scheduler.wait().await;

        assert_eq!(recorder.failures.lock().as_slice(), &[SessionError::Runtime("boom".into())]);
        let status = scheduler.status();
        assert_eq!(status.state, PlaybackState::Stopped);
        assert!(!status.completed);
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_counters() {
        let (scheduler, recorder, _calls) = counting(10, 3);
        scheduler.play();
        scheduler.wait().await;
        scheduler.reset();

        let status = scheduler.status();
        assert_eq!(status.state, PlaybackState::Reset);
        assert_eq!((status.current_step, status.total_steps), (0, 0));
        assert!(!status.completed);
        let names = recorder.state_names();
        assert_eq!(&names[names.len() - 2..], &[PlaybackState::Stopped, PlaybackState::Reset]);
    }

    #[tokio::test]
    async fn test_speed_and_turbo() {
        let (scheduler, _recorder, _calls) = counting(500, 1);
        assert_eq!(scheduler.delay(), Duration::from_millis(500));
        assert_eq!(scheduler.set_speed(5), 10);
        assert_eq!(scheduler.set_speed(9000), 2000);
        scheduler.set_turbo(true);
        assert_eq!(scheduler.delay(), Duration::from_millis(1000));
        assert_eq!(scheduler.status().speed_ms, 2000);
    }

    #[tokio::test]
    async fn test_resume_from_completed() {
        let (scheduler, _recorder, _calls) = counting(10, 1);
        assert!(!scheduler.resume_from_completed());
        assert!(!scheduler.step_forward().await.unwrap());
        assert!(scheduler.resume_from_completed());
        assert!(!scheduler.is_complete());
        assert_eq!(scheduler.status().state, PlaybackState::Paused);
    }
}
