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

//! Test utilities for integration tests

use std::sync::Arc;

use parking_lot::Mutex;

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging once for the whole test binary
    pub fn init_test_environment() {
        rewind_common::logging::ensure_test_logging(None);
    }
}

/// Builders for recorded traces
pub mod traces {
    use rewind_common::types::{CallFrame, Scope, Variable};
    use rewind_engine::{RecordedStep, RecordedTrace};
    use serde_json::{json, Value};

    /// A named frame with stringified arguments
    pub fn frame(name: &str, arguments: &[&str]) -> CallFrame {
        CallFrame::new(name, arguments.iter().map(|a| a.to_string()).collect(), None)
    }

    /// A scope holding the given name/value pairs
    pub fn scope(name: &str, variables: &[(&str, Value)]) -> Scope {
        Scope::new(
            name,
            variables.iter().map(|(n, v)| Variable::new(*n, Some(v.clone()))).collect(),
        )
    }

    /// Serialize steps into a trace document
    pub fn to_source(steps: Vec<RecordedStep>) -> String {
        RecordedTrace::new(steps).to_json()
    }

    /// A straight-line program on lines `1..=lines` with no calls
    pub fn linear(lines: usize) -> String {
        to_source((1..=lines).map(RecordedStep::at).collect())
    }

    /// A program whose captured snapshots follow `depths`.
    ///
    /// Every frame is named `level{n}`. The first trace entry is the initial
    /// position and is never captured, so the snapshots line up with `depths`.
    pub fn depth_profile(depths: &[usize]) -> String {
        let stack = |depth: usize| -> Vec<CallFrame> {
            (1..=depth).rev().map(|n| frame(&format!("level{n}"), &[])).collect()
        };
        let mut steps = vec![RecordedStep::at(1)];
        steps.extend(
            depths.iter().enumerate().map(|(i, &d)| RecordedStep::at(i + 2).with_stack(stack(d))),
        );
        to_source(steps)
    }

    /// A recursive `factorial(n)` called from global code.
    ///
    /// Each caller binds the value returned to it as `result`, so every call gets
    /// an inferred return value of `(k - 1)!`.
    pub fn factorial(n: u64) -> String {
        let global = || CallFrame::global(None);
        let stack = |innermost: u64| -> Vec<CallFrame> {
            let mut frames: Vec<CallFrame> =
                (innermost..=n).map(|k| frame("factorial", &[k.to_string().as_str()])).collect();
            frames.push(global());
            frames
        };
        let fact = |k: u64| (1..=k).product::<u64>();

        let mut steps =
            vec![RecordedStep::at(1).with_stack(vec![global()]), RecordedStep::at(6).with_stack(vec![global()])];
        for k in (1..=n).rev() {
            let locals = scope("Local", &[("n", json!(k))]);
            steps.push(RecordedStep::at(2).with_stack(stack(k)).with_scopes(vec![locals.clone()]));
            if k > 1 {
                steps.push(RecordedStep::at(3).with_stack(stack(k)).with_scopes(vec![locals]));
            }
        }
        for k in 2..=n {
            let locals = scope("Local", &[("n", json!(k)), ("result", json!(fact(k - 1)))]);
            steps.push(RecordedStep::at(4).with_stack(stack(k)).with_scopes(vec![locals.clone()]));
            steps.push(RecordedStep::at(5).with_stack(stack(k)).with_scopes(vec![locals]));
        }
        steps.push(
            RecordedStep::at(7)
                .with_stack(vec![global()])
                .with_scopes(vec![scope("Global", &[("result", json!(fact(n)))])]),
        );
        to_source(steps)
    }

    /// A straight-line program that throws when it reaches `failing_line`
    pub fn failing(lines: usize, failing_line: usize, message: &str) -> String {
        to_source(
            (1..=lines)
                .map(|line| {
                    let step = RecordedStep::at(line);
                    if line == failing_line { step.with_error(message) } else { step }
                })
                .collect(),
        )
    }
}

/// Observers that remember what they were told
pub mod observer {
    use super::*;
    use rewind_common::types::Snapshot;
    use rewind_engine::{CallEvent, PlaybackState, SchedulerStatus, SessionError, SessionEvent, SessionObserver};

    /// Records every notification in arrival order
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl RecordingObserver {
        /// Create an empty recorder behind an `Arc`
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// All notifications so far
        pub fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().clone()
        }

        /// Inferred call and return events
        pub fn call_events(&self) -> Vec<CallEvent> {
            self.filter(|e| match e {
                SessionEvent::CallTreeUpdated(event) => Some(event.clone()),
                _ => None,
            })
        }

        /// Scheduler states entered
        pub fn states(&self) -> Vec<PlaybackState> {
            self.filter(|e| match e {
                SessionEvent::SchedulerState(status) => Some(status.state),
                _ => None,
            })
        }

        /// Number of completion notifications
        pub fn completions(&self) -> usize {
            self.filter(|e| matches!(e, SessionEvent::Complete).then_some(())).len()
        }

        /// Reported failures
        pub fn failures(&self) -> Vec<SessionError> {
            self.filter(|e| match e {
                SessionEvent::Failure(err) => Some(err.clone()),
                _ => None,
            })
        }

        /// History-limit notifications
        pub fn history_limits(&self) -> Vec<usize> {
            self.filter(|e| match e {
                SessionEvent::HistoryLimit(max) => Some(*max),
                _ => None,
            })
        }

        /// Warnings shown to the user
        pub fn warnings(&self) -> Vec<String> {
            self.filter(|e| match e {
                SessionEvent::Warning(message) => Some(message.clone()),
                _ => None,
            })
        }

        /// Forget everything recorded so far
        pub fn clear(&self) {
            self.events.lock().clear();
        }

        fn filter<T>(&self, f: impl Fn(&SessionEvent) -> Option<T>) -> Vec<T> {
            self.events.lock().iter().filter_map(f).collect()
        }

        fn push(&self, event: SessionEvent) {
            self.events.lock().push(event);
        }
    }

    impl SessionObserver for RecordingObserver {
        fn on_snapshot(&self, snapshot: &Arc<Snapshot>) {
            self.push(SessionEvent::Snapshot(Arc::clone(snapshot)));
        }

        fn on_call_tree_updated(&self, event: &CallEvent) {
            self.push(SessionEvent::CallTreeUpdated(event.clone()));
        }

        fn on_scheduler_state(&self, status: &SchedulerStatus) {
            self.push(SessionEvent::SchedulerState(status.clone()));
        }

        fn on_history_limit(&self, max_history: usize) {
            self.push(SessionEvent::HistoryLimit(max_history));
        }

        fn on_complete(&self) {
            self.push(SessionEvent::Complete);
        }

        fn on_failure(&self, error: &SessionError) {
            self.push(SessionEvent::Failure(error.clone()));
        }

        fn on_warning(&self, message: &str) {
            self.push(SessionEvent::Warning(message.to_string()));
        }
    }
}

/// Logging utilities for tests
pub mod logging {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    /// A tracing layer that captures error logs
    #[derive(Clone, Default)]
    pub struct ErrorCapture {
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl ErrorCapture {
        /// Create a new ErrorCapture instance
        pub fn new() -> Self {
            Self::default()
        }

        /// Retrieve captured error messages
        pub fn get_errors(&self) -> Vec<String> {
            self.errors.lock().clone()
        }

        /// Check if any errors were captured
        pub fn has_errors(&self) -> bool {
            !self.errors.lock().is_empty()
        }
    }

    impl<S> tracing_subscriber::Layer<S> for ErrorCapture
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().level() != &Level::ERROR {
                return;
            }

            struct MessageVisitor {
                message: String,
            }

            impl tracing::field::Visit for MessageVisitor {
                fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                    if field.name() == "message" {
                        self.message = format!("{value:?}");
                    }
                }

                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "message" {
                        self.message = value.to_string();
                    }
                }
            }

            let mut visitor = MessageVisitor { message: String::new() };
            event.record(&mut visitor);
            if !visitor.message.is_empty() {
                self.errors.lock().push(visitor.message);
            }
        }
    }

    /// Capture error logs emitted on the current thread until the guard drops.
    ///
    /// Use with a current-thread runtime so that spawned playback tasks log
    /// through the same subscriber.
    pub fn capture_errors() -> (ErrorCapture, tracing::subscriber::DefaultGuard) {
        let capture = ErrorCapture::new();
        let subscriber = tracing_subscriber::registry()
            .with(capture.clone())
            .with(tracing_subscriber::fmt::layer().with_test_writer());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }
}
