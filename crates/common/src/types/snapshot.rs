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

//! The immutable record of one logical execution step

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{CallFrame, Scope};

/// Implicit pseudo-variables that never show up as user arrays
pub const IMPLICIT_VARIABLE_NAMES: [&str; 3] = ["arguments", "callee", "caller"];

/// State captured after a single logical step.
///
/// Snapshots are created by the session, handed to the execution history and
/// shared behind an `Arc` from then on; nothing mutates them after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Interpreter step counter at capture time
    pub step_number: usize,
    /// Current source line
    pub line: Option<usize>,
    /// Current source column
    pub column: Option<usize>,
    /// Syntax node kind the interpreter was positioned on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Scope chain, innermost first
    pub variables: Vec<Scope>,
    /// Call stack, innermost frame first
    pub call_stack: Vec<CallFrame>,
    /// Full interpreter serialization, present only on periodic checkpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// Wall-clock capture time
    pub timestamp: DateTime<Utc>,
}

/// An array-typed variable projected out of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayVariable {
    /// Variable name
    pub name: String,
    /// Array items
    pub value: Vec<Value>,
    /// Name of the scope the variable lives in
    pub scope: String,
}

impl Snapshot {
    /// Call-stack depth used for call/return inference
    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    /// The innermost call frame
    pub fn innermost_frame(&self) -> Option<&CallFrame> {
        self.call_stack.first()
    }

    /// The innermost scope
    pub fn innermost_scope(&self) -> Option<&Scope> {
        self.variables.first()
    }

    /// Whether this snapshot carries a full serialization checkpoint
    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Every array-typed variable in the scope chain, excluding implicit pseudo-variables
    pub fn arrays(&self) -> Vec<ArrayVariable> {
        self.variables
            .iter()
            .flat_map(|scope| {
                scope.variables.iter().filter_map(move |var| {
                    if IMPLICIT_VARIABLE_NAMES.contains(&var.name.as_str()) {
                        return None;
                    }
                    var.array_items().map(|items| ArrayVariable {
                        name: var.name.clone(),
                        value: items.clone(),
                        scope: scope.name.clone(),
                    })
                })
            })
            .collect()
    }
}
