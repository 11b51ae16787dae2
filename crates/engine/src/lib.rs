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

//! Rewind Engine - stepped, rewindable execution
//!
//! The engine drives an [`Interpreter`] one source line at a time, records a
//! [`Snapshot`](rewind_common::types::Snapshot) after every step, reconstructs the
//! call tree from changes in stack depth, and plays the whole thing back at a
//! configurable pace.

pub mod config;
pub use config::*;

pub mod error;
pub use error::*;

pub mod history;
pub use history::*;

pub mod inference;
pub use inference::*;

pub mod interpreter;
pub use interpreter::*;

pub mod metrics;
pub use metrics::*;

pub mod observer;
pub use observer::*;

pub mod scheduler;
pub use scheduler::*;

pub mod session;
pub use session::*;

pub mod tracker;
pub use tracker::*;
