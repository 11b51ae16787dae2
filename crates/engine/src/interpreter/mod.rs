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

//! The boundary between the engine and a script interpreter
//!
//! The engine never holds a live reference into interpreter internals. Every
//! query returns owned copies, so history and the call tree only ever see
//! immutable values.

mod recorded;
pub use recorded::*;

use rewind_common::types::{CallFrame, Scope};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of the interpreter after its most recent micro-step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterState {
    /// Number of micro-steps executed so far
    pub step_number: usize,
    /// Current source line
    pub line: Option<usize>,
    /// Current source column
    pub column: Option<usize>,
    /// Syntax node kind being evaluated
    pub node_type: Option<String>,
}

/// Outcome of advancing to the next source line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStep {
    /// Whether the interpreter can keep going
    pub has_more: bool,
    /// Whether a different source line was reached
    pub line_changed: bool,
    /// The line reached, if known
    pub new_line: Option<usize>,
    /// Micro-steps spent in this call
    pub micro_steps: usize,
}

impl LineStep {
    /// The interpreter ran out of work
    pub fn finished(micro_steps: usize) -> Self {
        Self { has_more: false, line_changed: false, new_line: None, micro_steps }
    }
}

/// Failures raised by an interpreter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    /// The source could not be parsed or loaded
    #[error("syntax error: {0}")]
    Load(String),
    /// The program raised while running
    #[error("runtime error: {0}")]
    Runtime(String),
    /// The total micro-step budget was exhausted
    #[error("execution limit exceeded ({0} steps)")]
    StepLimit(usize),
    /// The call stack grew past the configured ceiling
    #[error("stack size limit exceeded ({0} frames)")]
    StackLimit(usize),
}

/// Read-only view of interpreter state.
pub trait StateQuery {
    /// Current position, or `None` when nothing is loaded or the run finished
    fn state(&self) -> Option<InterpreterState>;

    /// Scope chain, innermost first
    fn variables(&self) -> Vec<Scope>;

    /// Call stack, innermost frame first
    fn call_stack(&self) -> Vec<CallFrame>;

    /// Full serialization of internal state, for periodic checkpoints
    fn serialize(&self) -> Option<String> {
        None
    }
}

/// A steppable interpreter driven by a session.
pub trait Interpreter: StateQuery + Send {
    /// Load a program, replacing whatever was loaded before
    fn load(&mut self, source: &str) -> Result<(), InterpreterError>;

    /// Whether the program has run to completion (or was never loaded)
    fn is_done(&self) -> bool;

    /// Advance until the source line changes, spending at most `max_micro_steps`
    fn step_to_next_line(&mut self, max_micro_steps: usize) -> Result<LineStep, InterpreterError>;

    /// Drop the loaded program and all execution state
    fn reset(&mut self);
}
