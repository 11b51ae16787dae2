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

//! Bounded undo/redo log of captured snapshots
//!
//! [`ExecutionHistory`] owns every snapshot the session captures. New captures
//! land at the cursor; anything after the cursor is the redo branch and is
//! discarded when a new snapshot is appended. Once full, the oldest snapshot is
//! evicted to make room.

use std::{collections::VecDeque, fmt, sync::Arc};

use chrono::Utc;
use rewind_common::types::{ArrayVariable, Snapshot};
use tracing::{debug, trace, warn};

use crate::{HistoryConfig, StateQuery};

/// Callback invoked the first time the history evicts a snapshot
pub type LimitCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Ordered snapshots plus a navigation cursor.
pub struct ExecutionHistory {
    snapshots: VecDeque<Arc<Snapshot>>,
    /// `None` while empty
    cursor: Option<usize>,
    max_history: usize,
    checkpoint_interval: usize,
    /// Captures since the last clear; drives checkpoint placement
    captures: usize,
    limit_warning_shown: bool,
    on_limit_reached: Option<LimitCallback>,
}

impl fmt::Debug for ExecutionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHistory")
            .field("len", &self.snapshots.len())
            .field("cursor", &self.cursor)
            .field("max_history", &self.max_history)
            .field("checkpoint_interval", &self.checkpoint_interval)
            .field("limit_warning_shown", &self.limit_warning_shown)
            .finish()
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

impl ExecutionHistory {
    /// Create an empty history
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: None,
            max_history: config.max_history.max(1),
            checkpoint_interval: config.checkpoint_interval.max(1),
            captures: 0,
            limit_warning_shown: false,
            on_limit_reached: None,
        }
    }

    /// Register the one-shot "limit reached" notification
    pub fn set_limit_callback(&mut self, callback: impl Fn(usize) + Send + Sync + 'static) {
        self.on_limit_reached = Some(Box::new(callback));
    }

    /// Copy the interpreter's current state into a new snapshot and append it.
    ///
    /// Returns `None` when no state is available, which is the normal signal that
    /// the interpreter is not loaded or has finished.
    pub fn capture(&mut self, source: Option<&dyn StateQuery>) -> Option<Arc<Snapshot>> {
        let source = source?;
        let state = source.state()?;

        let checkpoint = if self.captures % self.checkpoint_interval == 0 {
            source.serialize()
        } else {
            None
        };
        self.captures += 1;

        let snapshot = Arc::new(Snapshot {
            step_number: state.step_number,
            line: state.line,
            column: state.column,
            node_type: state.node_type,
            variables: source.variables(),
            call_stack: source.call_stack(),
            checkpoint,
            timestamp: Utc::now(),
        });

        self.add_to_history(Arc::clone(&snapshot));
        Some(snapshot)
    }

    /// Append a snapshot at the cursor, discarding the redo branch
    pub fn add_to_history(&mut self, snapshot: Arc<Snapshot>) {
        if let Some(cursor) = self.cursor {
            if cursor + 1 < self.snapshots.len() {
                trace!("Discarding {} redo snapshots", self.snapshots.len() - cursor - 1);
                self.snapshots.truncate(cursor + 1);
            }
        }

        if self.snapshots.len() >= self.max_history {
            if let Some(evicted) = self.snapshots.pop_front() {
                trace!("Evicted snapshot at step {}", evicted.step_number);
            }
            if !self.limit_warning_shown {
                self.limit_warning_shown = true;
                warn!("Execution history reached its limit of {} snapshots", self.max_history);
                if let Some(callback) = &self.on_limit_reached {
                    callback(self.max_history);
                }
            }
        }

        self.snapshots.push_back(snapshot);
        self.cursor = Some(self.snapshots.len() - 1);
    }

    /// The snapshot under the cursor
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.cursor.and_then(|i| self.snapshots.get(i)).cloned()
    }

    /// Whether the cursor can move back
    pub fn can_step_back(&self) -> bool {
        matches!(self.cursor, Some(i) if i > 0)
    }

    /// Whether the cursor can move forward
    pub fn can_step_forward(&self) -> bool {
        matches!(self.cursor, Some(i) if i + 1 < self.snapshots.len())
    }

    /// Move the cursor one step back
    pub fn step_back(&mut self) -> Option<Arc<Snapshot>> {
        if !self.can_step_back() {
            debug!("Already at the start of history");
            return None;
        }
        self.cursor = self.cursor.map(|i| i - 1);
        self.current()
    }

    /// Move the cursor one step forward through already-captured snapshots
    pub fn step_forward(&mut self) -> Option<Arc<Snapshot>> {
        if !self.can_step_forward() {
            debug!("Already at the end of history");
            return None;
        }
        self.cursor = self.cursor.map(|i| i + 1);
        self.current()
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Cursor position, `None` when empty
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Snapshot at an absolute index
    pub fn get(&self, index: usize) -> Option<Arc<Snapshot>> {
        self.snapshots.get(index).cloned()
    }

    /// Iterate over retained snapshots, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Snapshot>> {
        self.snapshots.iter()
    }

    /// Array-typed variables of the current snapshot
    pub fn arrays(&self) -> Vec<ArrayVariable> {
        self.current().map(|s| s.arrays()).unwrap_or_default()
    }

    /// Drop all snapshots and re-arm the limit warning
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
        self.captures = 0;
        self.limit_warning_shown = false;
    }
}
