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

//! An interpreter that replays a recorded execution trace.
//!
//! The "source" handed to [`RecordedInterpreter::load`] is a JSON document with
//! one entry per micro-step:
//!
//! ```json
//! {
//!   "steps": [
//!     { "line": 1, "call_stack": [{ "function_name": "(global)" }] },
//!     { "line": 4, "call_stack": [{ "function_name": "fib", "arguments": ["3"] },
//!                                 { "function_name": "(global)" }],
//!       "variables": [{ "name": "Local", "variables": [{ "name": "n", "value": 3 }] }] },
//!     { "line": 5, "error": "n is not defined" }
//!   ]
//! }
//! ```
//!
//! Reaching an entry that carries `error` raises a runtime failure, the same way a
//! live interpreter would throw at that point.

use rewind_common::types::{CallFrame, Scope, ValueKind, Variable};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{InterpreterError, InterpreterLimits, InterpreterState, LineStep, StateQuery};

use super::Interpreter;

/// One recorded micro-step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordedStep {
    /// Source line
    pub line: Option<usize>,
    /// Source column
    pub column: Option<usize>,
    /// Syntax node kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Call stack, innermost first
    pub call_stack: Vec<CallFrame>,
    /// Scope chain, innermost first
    pub variables: Vec<Scope>,
    /// Runtime error raised when this step is reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordedStep {
    /// A step positioned on `line` with an empty stack and no variables
    pub fn at(line: usize) -> Self {
        Self { line: Some(line), ..Default::default() }
    }

    /// Set the call stack, innermost first
    pub fn with_stack(mut self, call_stack: Vec<CallFrame>) -> Self {
        self.call_stack = call_stack;
        self
    }

    /// Set the scope chain, innermost first
    pub fn with_scopes(mut self, variables: Vec<Scope>) -> Self {
        self.variables = variables;
        self
    }

    /// Mark this step as raising a runtime error
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

/// A full recorded execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedTrace {
    /// Micro-steps in execution order
    pub steps: Vec<RecordedStep>,
}

impl RecordedTrace {
    /// Wrap a list of steps
    pub fn new(steps: Vec<RecordedStep>) -> Self {
        Self { steps }
    }

    /// Parse a trace document
    pub fn from_json(source: &str) -> Result<Self, InterpreterError> {
        let mut trace: Self =
            serde_json::from_str(source).map_err(|e| InterpreterError::Load(e.to_string()))?;
        if trace.steps.is_empty() {
            return Err(InterpreterError::Load("trace contains no steps".to_string()));
        }
        trace.normalize();
        Ok(trace)
    }

    /// Serialize back into a trace document
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Number of recorded micro-steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the trace has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of logical steps, i.e. runs of consecutive entries on the same line
    pub fn line_count(&self) -> usize {
        let mut count = 0;
        let mut previous = None;
        for step in &self.steps {
            if step.line.is_some() && step.line != previous {
                count += 1;
                previous = step.line;
            }
        }
        count
    }

    /// Deepest call stack in the trace
    pub fn max_depth(&self) -> usize {
        self.steps.iter().map(|s| s.call_stack.len()).max().unwrap_or(0)
    }

    /// Fill in type and display for variables recorded with only a name and value
    fn normalize(&mut self) {
        for scope in self.steps.iter_mut().flat_map(|s| s.variables.iter_mut()) {
            for var in scope.variables.iter_mut().filter(|v| v.display.is_empty()) {
                *var = if var.kind == ValueKind::Function {
                    Variable::function(std::mem::take(&mut var.name))
                } else {
                    Variable::new(std::mem::take(&mut var.name), var.value.take())
                };
            }
        }
    }
}

/// Replays a [`RecordedTrace`] under the same sandbox limits as a live interpreter.
#[derive(Debug, Clone, Default)]
pub struct RecordedInterpreter {
    limits: InterpreterLimits,
    trace: Option<RecordedTrace>,
    position: usize,
    step_count: usize,
    running: bool,
    error: Option<String>,
}

impl RecordedInterpreter {
    /// Create an interpreter with the given limits
    pub fn new(limits: InterpreterLimits) -> Self {
        Self { limits, ..Default::default() }
    }

    /// The message of the error that stopped the run, if any
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn current(&self) -> Option<&RecordedStep> {
        if !self.running {
            return None;
        }
        self.trace.as_ref()?.steps.get(self.position)
    }

    fn current_line(&self) -> Option<usize> {
        self.current().and_then(|s| s.line)
    }

    fn fail(&mut self, err: InterpreterError) -> InterpreterError {
        debug!("Recorded interpreter stopped: {err}");
        self.error = Some(err.to_string());
        err
    }

    /// Execute one micro-step, returning whether more remain
    fn step(&mut self) -> Result<bool, InterpreterError> {
        if !self.running || self.error.is_some() {
            return Ok(false);
        }
        if self.step_count >= self.limits.max_steps {
            return Err(self.fail(InterpreterError::StepLimit(self.limits.max_steps)));
        }
        let depth = self.current().map(|s| s.call_stack.len()).unwrap_or_default();
        if depth > self.limits.max_stack_size {
            return Err(self.fail(InterpreterError::StackLimit(self.limits.max_stack_size)));
        }

        let len = self.trace.as_ref().map(RecordedTrace::len).unwrap_or_default();
        if self.position + 1 >= len {
            self.running = false;
            return Ok(false);
        }

        self.position += 1;
        self.step_count += 1;
        trace!("Recorded interpreter at micro-step {}", self.step_count);

        if let Some(message) = self.current().and_then(|s| s.error.clone()) {
            return Err(self.fail(InterpreterError::Runtime(message)));
        }
        Ok(true)
    }
}

impl StateQuery for RecordedInterpreter {
    fn state(&self) -> Option<InterpreterState> {
        self.current().map(|step| InterpreterState {
            step_number: self.step_count,
            line: step.line,
            column: step.column,
            node_type: step.node_type.clone(),
        })
    }

    fn variables(&self) -> Vec<Scope> {
        self.current().map(|s| s.variables.clone()).unwrap_or_default()
    }

    fn call_stack(&self) -> Vec<CallFrame> {
        self.current().map(|s| s.call_stack.clone()).unwrap_or_default()
    }

    fn serialize(&self) -> Option<String> {
        self.trace.as_ref()?;
        serde_json::to_string(&serde_json::json!({
            "position": self.position,
            "step_count": self.step_count,
        }))
        .ok()
    }
}

impl Interpreter for RecordedInterpreter {
    fn load(&mut self, source: &str) -> Result<(), InterpreterError> {
        self.reset();
        let trace = RecordedTrace::from_json(source).map_err(|e| self.fail(e))?;
        debug!("Loaded recorded trace with {} steps", trace.len());
        self.trace = Some(trace);
        self.running = true;
        Ok(())
    }

    fn is_done(&self) -> bool {
        !self.running || self.error.is_some()
    }

    fn step_to_next_line(&mut self, max_micro_steps: usize) -> Result<LineStep, InterpreterError> {
        if self.trace.is_none() || self.is_done() {
            return Ok(LineStep::finished(0));
        }

        let start_line = self.current_line();
        let mut micro_steps = 0;
        let mut has_more = true;

        while has_more && micro_steps < max_micro_steps {
            has_more = self.step()?;
            micro_steps += 1;
            if !has_more {
                break;
            }

            let line = self.current_line();
            if line.is_some() && line != start_line {
                return Ok(LineStep { has_more: true, line_changed: true, new_line: line, micro_steps });
            }
        }

        Ok(LineStep { has_more, line_changed: micro_steps > 0, new_line: self.current_line(), micro_steps })
    }

    fn reset(&mut self) {
        self.trace = None;
        self.position = 0;
        self.step_count = 0;
        self.running = false;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(steps: Vec<RecordedStep>) -> RecordedInterpreter {
        let mut interp = RecordedInterpreter::new(InterpreterLimits::default());
        interp.load(&RecordedTrace::new(steps).to_json()).unwrap();
        interp
    }

    #[test]
    fn test_load_rejects_garbage_and_empty_traces() {
        let mut interp = RecordedInterpreter::default();
        assert!(matches!(interp.load("function ("), Err(InterpreterError::Load(_))));
        assert!(matches!(interp.load(r#"{"steps": []}"#), Err(InterpreterError::Load(_))));
        assert!(interp.is_done());
        assert!(interp.state().is_none());
    }

    #[test]
    fn test_step_to_next_line_skips_same_line_entries() {
        let mut interp = load(vec![
            RecordedStep::at(1),
            RecordedStep::at(1),
            RecordedStep::at(1),
            RecordedStep::at(2),
            RecordedStep::at(3),
        ]);
        assert_eq!(interp.state().unwrap().line, Some(1));

        let step = interp.step_to_next_line(100).unwrap();
        assert_eq!(step, LineStep { has_more: true, line_changed: true, new_line: Some(2), micro_steps: 3 });
        assert_eq!(interp.state().unwrap().step_number, 3);

        let step = interp.step_to_next_line(100).unwrap();
        assert_eq!(step.new_line, Some(3));

        let step = interp.step_to_next_line(100).unwrap();
        assert!(!step.has_more);
        assert!(interp.is_done());
        assert!(interp.state().is_none());
    }

    #[test]
    fn test_micro_step_ceiling_is_respected() {
        let mut interp = load((0..10).map(|_| RecordedStep::at(7)).collect());
        let step = interp.step_to_next_line(4).unwrap();
        assert_eq!(step.micro_steps, 4);
        assert!(step.has_more);
        assert_eq!(step.new_line, Some(7));
    }

    #[test]
    fn test_error_entry_raises_runtime_failure() {
        let mut interp = load(vec![RecordedStep::at(1), RecordedStep::at(2).with_error("boom")]);
        let err = interp.step_to_next_line(100).unwrap_err();
        assert_eq!(err, InterpreterError::Runtime("boom".to_string()));
        assert!(interp.is_done());
        assert!(interp.error_message().is_some());
    }

    #[test]
    fn test_limits() {
        let mut interp =
            RecordedInterpreter::new(InterpreterLimits { max_steps: 2, max_stack_size: 10_000 });
        interp.load(&RecordedTrace::new((1..=5).map(RecordedStep::at).collect()).to_json()).unwrap();
        interp.step_to_next_line(100).unwrap();
        interp.step_to_next_line(100).unwrap();
        assert_eq!(interp.step_to_next_line(100), Err(InterpreterError::StepLimit(2)));

        let deep = vec![CallFrame::new("f", vec![], None); 3];
        let mut interp = RecordedInterpreter::new(InterpreterLimits { max_steps: 100, max_stack_size: 2 });
        interp
            .load(&RecordedTrace::new(vec![RecordedStep::at(1).with_stack(deep), RecordedStep::at(2)]).to_json())
            .unwrap();
        assert_eq!(interp.step_to_next_line(100), Err(InterpreterError::StackLimit(2)));
    }

    #[test]
    fn test_variables_are_normalized_on_load() {
        let source = r#"{"steps": [{"line": 1, "variables": [{"name": "Local", "variables": [
            {"name": "arr", "value": [3, 1, 2]},
            {"name": "missing"},
            {"name": "f", "type": "function"}
        ]}]}]}"#;
        let mut interp = RecordedInterpreter::default();
        interp.load(source).unwrap();

        let scopes = interp.variables();
        let vars = &scopes[0].variables;
        assert_eq!(vars[0].kind, ValueKind::Array);
        assert_eq!(vars[0].display, "[3, 1, 2]");
        assert_eq!(vars[1].kind, ValueKind::Undefined);
        assert_eq!(vars[1].display, "undefined");
        assert_eq!(vars[2].kind, ValueKind::Function);
    }

    #[test]
    fn test_line_count() {
        let trace = RecordedTrace::new(vec![
            RecordedStep::at(1),
            RecordedStep::at(1),
            RecordedStep::at(2),
            RecordedStep::default(),
            RecordedStep::at(1),
        ]);
        assert_eq!(trace.line_count(), 3);
        assert_eq!(trace.len(), 5);
    }
}
