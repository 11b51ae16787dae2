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

//! Errors that cross the session boundary

use thiserror::Error;

use crate::InterpreterError;

/// Failures reported to session observers.
///
/// Steady-state conditions such as the end of history or a return with no
/// matching call are handled internally and never become a `SessionError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The interpreter rejected the source
    #[error("failed to load source: {0}")]
    Load(String),
    /// The interpreter raised mid-run or exceeded a sandbox limit
    #[error("runtime error: {0}")]
    Runtime(String),
    /// The session was built with an invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The source was edited while a run holds it read-only
    #[error("source is read-only while execution is in progress")]
    SourceLocked,
}

impl SessionError {
    /// Whether this failure is surfaced to observers
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Load(_) | Self::Runtime(_))
    }
}

impl From<InterpreterError> for SessionError {
    fn from(err: InterpreterError) -> Self {
        match err {
            InterpreterError::Load(msg) => Self::Load(msg),
            InterpreterError::Runtime(msg) => Self::Runtime(msg),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Result alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
