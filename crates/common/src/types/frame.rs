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

//! Call frames as reported by the interpreter for a single step

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single frame of the interpreter call stack, copied out at capture time.
///
/// Frames are rebuilt from interpreter state on every step and are only persisted
/// as part of the [`Snapshot`](crate::types::Snapshot) that carries them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    /// Name of the called function, or [`CallFrame::GLOBAL_NAME`] for top-level code
    pub function_name: String,
    /// Arguments, already formatted for display by the interpreter
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Source line of the call site
    #[serde(default)]
    pub line: Option<usize>,
    /// Source column of the call site
    #[serde(default)]
    pub column: Option<usize>,
}

impl CallFrame {
    /// Synthetic name used for the frame that represents top-level code
    pub const GLOBAL_NAME: &'static str = "(global)";

    /// Create a frame for a function call
    pub fn new(function_name: impl Into<String>, arguments: Vec<String>, line: Option<usize>) -> Self {
        Self { function_name: function_name.into(), arguments, line, column: None }
    }

    /// Create the synthetic top-level frame
    pub fn global(line: Option<usize>) -> Self {
        Self { function_name: Self::GLOBAL_NAME.to_string(), arguments: vec![], line, column: Some(0) }
    }

    /// Set the source column
    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// Whether this is the synthetic top-level frame
    pub fn is_global(&self) -> bool {
        self.function_name == Self::GLOBAL_NAME
    }

    /// Whether this frame names a real function that can appear in the call tree
    pub fn is_named_call(&self) -> bool {
        !self.function_name.is_empty() && !self.is_global()
    }
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function_name, self.arguments.join(", "))?;
        if let Some(line) = self.line {
            write!(f, " @ line {line}")?;
        }
        Ok(())
    }
}
