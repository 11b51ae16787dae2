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

// Copyright (C) 2024 Rewind Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Rewind Common - Shared functionality for Rewind components
//!
//! This crate provides the value-level data model shared by the engine and the
//! command-line front end: captured snapshots, call frames, scopes and variables,
//! together with the value formatting rules and logging setup.

/// Common types used throughout Rewind including snapshots, call frames and variables
pub mod types;

/// Best-effort value formatting for call-tree labels, arguments and variable displays
pub mod format;
/// Logging setup and utilities for consistent logging across Rewind components
pub mod logging;

pub use format::*;
pub use logging::*;
