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

//! Run-level performance counters

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Counters for a single run, reset together with the session.
#[derive(Debug, Clone, Default)]
pub struct PerformanceCounters {
    started_at: Option<Instant>,
    elapsed: Option<Duration>,
    total_steps: usize,
    function_calls: usize,
    max_stack_depth: usize,
}

/// Serializable summary of [`PerformanceCounters`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Wall-clock time from start to finish (or to now, while running)
    pub execution_time_ms: f64,
    /// Logical steps executed
    pub total_steps: usize,
    /// Named function calls observed
    pub function_calls: usize,
    /// Deepest call stack observed
    pub max_stack_depth: usize,
}

impl PerformanceCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing a run and zero the counters
    pub fn start(&mut self) {
        *self = Self { started_at: Some(Instant::now()), ..Default::default() };
    }

    /// Stop the clock; later calls keep the first measurement
    pub fn finish(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = self.started_at.map(|start| start.elapsed());
        }
    }

    /// Count one logical step
    pub fn record_step(&mut self) {
        self.total_steps += 1;
    }

    /// Count one function call
    pub fn record_call(&mut self) {
        self.function_calls += 1;
    }

    /// Track the deepest stack seen
    pub fn observe_depth(&mut self, depth: usize) {
        self.max_stack_depth = self.max_stack_depth.max(depth);
    }

    /// Whether the run has been timed to completion
    pub fn is_finished(&self) -> bool {
        self.elapsed.is_some()
    }

    /// Zero everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Snapshot the counters
    pub fn report(&self) -> PerformanceReport {
        let elapsed = self
            .elapsed
            .or_else(|| self.started_at.map(|start| start.elapsed()))
            .unwrap_or_default();
        PerformanceReport {
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
            total_steps: self.total_steps,
            function_calls: self.function_calls,
            max_stack_depth: self.max_stack_depth,
        }
    }
}
