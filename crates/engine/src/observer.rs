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

//! Notifications emitted by a session
//!
//! Observers are called synchronously from the stepping loop and must return
//! quickly. They must not call back into the [`Session`](crate::Session) that
//! notifies them.

use std::sync::Arc;

use rewind_common::types::Snapshot;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{CallEvent, SchedulerStatus, SessionError};

/// Receives session notifications. Every method defaults to a no-op.
pub trait SessionObserver: Send + Sync {
    /// A snapshot was captured, or navigation moved to a stored one
    fn on_snapshot(&self, _snapshot: &Arc<Snapshot>) {}

    /// The call tree changed; poll [`Session::call_tree`](crate::Session::call_tree) for the new shape
    fn on_call_tree_updated(&self, _event: &CallEvent) {}

    /// The playback scheduler changed state
    fn on_scheduler_state(&self, _status: &SchedulerStatus) {}

    /// History evicted its first snapshot; fires once per run
    fn on_history_limit(&self, _max_history: usize) {}

    /// Playback ran out of work
    fn on_complete(&self) {}

    /// A load or runtime failure
    fn on_failure(&self, _error: &SessionError) {}

    /// A user-facing warning that did not stop anything
    fn on_warning(&self, _message: &str) {}
}

/// Ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// A notification forwarded by [`ChannelObserver`]
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// See [`SessionObserver::on_snapshot`]
    Snapshot(Arc<Snapshot>),
    /// See [`SessionObserver::on_call_tree_updated`]
    CallTreeUpdated(CallEvent),
    /// See [`SessionObserver::on_scheduler_state`]
    SchedulerState(SchedulerStatus),
    /// See [`SessionObserver::on_history_limit`]
    HistoryLimit(usize),
    /// See [`SessionObserver::on_complete`]
    Complete,
    /// See [`SessionObserver::on_failure`]
    Failure(SessionError),
    /// See [`SessionObserver::on_warning`]
    Warning(String),
}

/// Forwards notifications over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("Session event dropped, receiver is gone");
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_snapshot(&self, snapshot: &Arc<Snapshot>) {
        self.send(SessionEvent::Snapshot(Arc::clone(snapshot)));
    }

    fn on_call_tree_updated(&self, event: &CallEvent) {
        self.send(SessionEvent::CallTreeUpdated(event.clone()));
    }

    fn on_scheduler_state(&self, status: &SchedulerStatus) {
        self.send(SessionEvent::SchedulerState(status.clone()));
    }

    fn on_history_limit(&self, max_history: usize) {
        self.send(SessionEvent::HistoryLimit(max_history));
    }

    fn on_complete(&self) {
        self.send(SessionEvent::Complete);
    }

    fn on_failure(&self, error: &SessionError) {
        self.send(SessionEvent::Failure(error.clone()));
    }

    fn on_warning(&self, message: &str) {
        self.send(SessionEvent::Warning(message.to_string()));
    }
}
