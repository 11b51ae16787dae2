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

//! Call/return inference from call-stack depth
//!
//! Interpreters only expose the shape of the call stack at each step, not
//! discrete call and return events. The session recovers those events by
//! comparing the depth of consecutive snapshots:
//!
//! - deeper than before: the innermost frame was just entered
//! - shallower than before: the innermost call returned
//! - same depth: nothing happened
//!
//! This is approximate. A return immediately followed by a call at the same
//! depth within one logical step leaves the depth unchanged and is missed, and
//! a jump of several frames at once is reported as a single event. The return
//! value is guessed from conventional variable names in the innermost scope.

use rewind_common::types::{Snapshot, ValueKind};
use serde_json::Value;

/// Variable names searched, in order, for a function's return value
pub const RESULT_VARIABLE_NAMES: [&str; 7] =
    ["result", "res", "ret", "output", "value", "data", "sorted"];

/// An inferred call-tree event
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// A named function was entered
    Call {
        /// Called function
        function_name: String,
        /// Arguments as reported by the interpreter
        arguments: Vec<Value>,
        /// Step at which the call was observed
        step: usize,
        /// Source line of the frame
        line: Option<usize>,
    },
    /// The innermost call returned
    Return {
        /// Best-effort return value
        value: Option<Value>,
        /// Step at which the return was observed
        step: usize,
    },
}

/// Outcome of comparing one snapshot against the previous depth
#[derive(Debug, Clone, PartialEq)]
pub enum DepthTransition {
    /// First observation; only seeds the baseline
    Seeded,
    /// Depth unchanged
    Unchanged,
    /// Depth grew; carries a call event unless the new frame is unnamed or global
    Entered(Option<CallEvent>),
    /// Depth shrank
    Returned(CallEvent),
}

impl DepthTransition {
    /// The call-tree event, if any
    pub fn into_event(self) -> Option<CallEvent> {
        match self {
            Self::Entered(event) => event,
            Self::Returned(event) => Some(event),
            Self::Seeded | Self::Unchanged => None,
        }
    }
}

/// Classify a snapshot against the previously observed depth.
pub fn classify_transition(previous_depth: Option<usize>, snapshot: &Snapshot) -> DepthTransition {
    let Some(previous) = previous_depth else {
        return DepthTransition::Seeded;
    };

    let depth = snapshot.depth();
    if depth > previous {
        let event = snapshot.innermost_frame().filter(|frame| frame.is_named_call()).map(|frame| {
            CallEvent::Call {
                function_name: frame.function_name.clone(),
                arguments: frame.arguments.iter().cloned().map(Value::String).collect(),
                step: snapshot.step_number,
                line: frame.line,
            }
        });
        DepthTransition::Entered(event)
    } else if depth < previous {
        DepthTransition::Returned(CallEvent::Return {
            value: extract_return_value(snapshot),
            step: snapshot.step_number,
        })
    } else {
        DepthTransition::Unchanged
    }
}

/// Guess a return value from the innermost scope of `snapshot`.
///
/// Tries [`RESULT_VARIABLE_NAMES`] in order, then the first array, then the first
/// defined non-function value.
pub fn extract_return_value(snapshot: &Snapshot) -> Option<Value> {
    let vars = snapshot.innermost_scope().map(|s| s.variables.as_slice()).unwrap_or_default();

    RESULT_VARIABLE_NAMES
        .iter()
        .find_map(|name| vars.iter().find(|v| v.name == *name).and_then(|v| v.value.clone()))
        .or_else(|| vars.iter().find_map(|v| v.array_items().map(|items| Value::Array(items.clone()))))
        .or_else(|| {
            vars.iter().filter(|v| v.kind != ValueKind::Function).find_map(|v| v.value.clone())
        })
}

/// Remembers the last observed depth between snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthTracker {
    last_depth: Option<usize>,
}

impl DepthTracker {
    /// Create a tracker with no baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `snapshot` and record its depth as the new baseline
    pub fn observe(&mut self, snapshot: &Snapshot) -> DepthTransition {
        let transition = classify_transition(self.last_depth, snapshot);
        self.last_depth = Some(snapshot.depth());
        transition
    }

    /// Last observed depth
    pub fn last_depth(&self) -> Option<usize> {
        self.last_depth
    }

    /// Forget the baseline
    pub fn reset(&mut self) {
        self.last_depth = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rewind_common::types::{CallFrame, Scope, Variable};
    use serde_json::json;

    use super::*;

    fn snapshot(step: usize, frames: &[&str], locals: Vec<Variable>) -> Snapshot {
        Snapshot {
            step_number: step,
            line: Some(step + 1),
            column: None,
            node_type: None,
            variables: vec![Scope::new("Local", locals)],
            call_stack: frames
                .iter()
                .map(|name| CallFrame::new(*name, vec![step.to_string()], Some(step + 1)))
                .collect(),
            checkpoint: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_depth_sequence_yields_calls_then_returns() {
        let stacks: [&[&str]; 5] = [&[], &["f"], &["g", "f"], &["f"], &[]];
        let mut tracker = DepthTracker::new();
        let events: Vec<_> = stacks
            .iter()
            .enumerate()
            .filter_map(|(step, frames)| tracker.observe(&snapshot(step, frames, vec![])).into_event())
            .collect();

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], CallEvent::Call { function_name, step: 1, .. } if function_name == "f"));
        assert!(matches!(&events[1], CallEvent::Call { function_name, step: 2, .. } if function_name == "g"));
        assert!(matches!(events[2], CallEvent::Return { step: 3, .. }));
        assert!(matches!(events[3], CallEvent::Return { step: 4, .. }));
    }

    #[test]
    fn test_first_observation_only_seeds() {
        let mut tracker = DepthTracker::new();
        assert_eq!(tracker.observe(&snapshot(0, &["f", "g"], vec![])), DepthTransition::Seeded);
        assert_eq!(tracker.last_depth(), Some(2));
        assert_eq!(tracker.observe(&snapshot(1, &["h", "g"], vec![])), DepthTransition::Unchanged);

        tracker.reset();
        assert_eq!(tracker.observe(&snapshot(2, &[], vec![])), DepthTransition::Seeded);
    }

    #[test]
    fn test_global_frame_entry_emits_no_call() {
        let transition = classify_transition(Some(0), &snapshot(1, &[CallFrame::GLOBAL_NAME], vec![]));
        assert_eq!(transition, DepthTransition::Entered(None));

        let transition = classify_transition(Some(0), &snapshot(1, &[""], vec![]));
        assert_eq!(transition, DepthTransition::Entered(None));
    }

    #[test]
    fn test_call_event_carries_frame_details() {
        let event = classify_transition(Some(1), &snapshot(7, &["fib", "(global)"], vec![])).into_event();
        assert_eq!(
            event,
            Some(CallEvent::Call {
                function_name: "fib".to_string(),
                arguments: vec![json!("7")],
                step: 7,
                line: Some(8),
            })
        );
    }

    #[test]
    fn test_return_value_priority() {
        let locals = vec![
            Variable::new("n", Some(json!(4))),
            Variable::new("arr", Some(json!([1, 2]))),
            Variable::new("res", Some(json!(10))),
            Variable::new("result", Some(json!(24))),
        ];
        assert_eq!(extract_return_value(&snapshot(0, &[], locals)), Some(json!(24)));

        let locals = vec![Variable::new("result", None), Variable::new("res", Some(json!(10)))];
        assert_eq!(extract_return_value(&snapshot(0, &[], locals)), Some(json!(10)));
    }

    #[test]
    fn test_return_value_fallbacks() {
        let locals = vec![Variable::new("n", Some(json!(4))), Variable::new("left", Some(json!([3, 1])))];
        assert_eq!(extract_return_value(&snapshot(0, &[], locals)), Some(json!([3, 1])));

        let locals = vec![
            Variable::function("helper"),
            Variable::new("unset", None),
            Variable::new("n", Some(json!(4))),
        ];
        assert_eq!(extract_return_value(&snapshot(0, &[], locals)), Some(json!(4)));

        assert_eq!(extract_return_value(&snapshot(0, &[], vec![Variable::function("f")])), None);
    }
}
