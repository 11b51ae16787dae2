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

//! Call-tree reconstruction
//!
//! The tracker receives explicit call and return events and arranges them into
//! a tree. It never looks at interpreter state itself; deciding when a call or
//! return happened is the session's job (see [`crate::inference`]).
//!
//! Nodes live in an arena indexed by [`NodeId`]. Ids are assigned in call order,
//! so a parent always has a smaller id than any of its descendants.

use std::fmt::Write as _;

use rewind_common::{format_arguments, format_value, FormatLimits};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

/// Index of a node in the tracker arena
pub type NodeId = usize;

/// A single function invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTreeNode {
    /// Unique id, assigned in call order
    pub id: NodeId,
    /// Called function
    pub function_name: String,
    /// Arguments rendered for display
    pub formatted_arguments: String,
    /// Arguments as received
    pub raw_arguments: Vec<Value>,
    /// Return value rendered for display, set on return
    pub return_value: Option<String>,
    /// Return value as received
    pub raw_return_value: Option<Value>,
    /// Whether the call has returned
    pub has_returned: bool,
    /// Whether this is the innermost outstanding call
    pub is_active: bool,
    /// Nesting depth, 0 for a root
    pub depth: usize,
    /// Step at which the call was observed
    pub start_step: usize,
    /// Step at which the return was observed
    pub end_step: Option<usize>,
    /// Source line of the call
    pub line: Option<usize>,
    /// Callees in call order
    pub children: Vec<NodeId>,
    /// Caller, `None` for a root
    pub parent: Option<NodeId>,
}

/// Read-only rendering model of a call subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTreeView {
    /// Node id
    pub id: NodeId,
    /// Called function
    pub name: String,
    /// Arguments rendered for display
    pub arguments: String,
    /// Return value rendered for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<String>,
    /// Whether the call has returned
    pub has_returned: bool,
    /// Whether this is the innermost outstanding call
    pub is_active: bool,
    /// Nesting depth
    pub depth: usize,
    /// Step at which the call was observed
    pub start_step: usize,
    /// Step at which the return was observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_step: Option<usize>,
    /// Callees in call order
    pub children: Vec<CallTreeView>,
}

impl CallTreeView {
    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(view) = pending.pop() {
            count += 1;
            pending.extend(view.children.iter());
        }
        count
    }

    /// Label used when rendering, e.g. `fib(3) => 2`
    pub fn label(&self) -> String {
        match &self.return_value {
            Some(value) if self.has_returned => format!("{}({}) => {value}", self.name, self.arguments),
            _ => format!("{}({})", self.name, self.arguments),
        }
    }
}

/// Builds the call tree from call and return events.
#[derive(Debug, Clone, Default)]
pub struct CallTreeTracker {
    nodes: Vec<CallTreeNode>,
    roots: Vec<NodeId>,
    /// Outstanding calls, innermost last
    stack: Vec<NodeId>,
}

impl CallTreeTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call as a child of the active node, or as a new root.
    pub fn on_function_call(
        &mut self,
        function_name: impl Into<String>,
        arguments: Vec<Value>,
        step: usize,
        line: Option<usize>,
    ) -> NodeId {
        let id = self.nodes.len();
        let parent = self.stack.last().copied();
        let function_name = function_name.into();

        debug!("Call #{id} {function_name} at step {step} (depth {})", self.stack.len());

        self.nodes.push(CallTreeNode {
            id,
            formatted_arguments: format_arguments(&arguments, &FormatLimits::CALL_TREE),
            function_name,
            raw_arguments: arguments,
            return_value: None,
            raw_return_value: None,
            has_returned: false,
            is_active: true,
            depth: self.stack.len(),
            start_step: step,
            end_step: None,
            line,
            children: Vec::new(),
            parent,
        });

        match parent {
            Some(parent) => {
                let parent = &mut self.nodes[parent];
                parent.children.push(id);
                parent.is_active = false;
            }
            None => self.roots.push(id),
        }
        self.stack.push(id);
        id
    }

    /// Close the innermost outstanding call and reactivate its caller.
    ///
    /// A return with no outstanding call is ignored and yields `None`.
    pub fn on_function_return(&mut self, value: Option<Value>, step: usize) -> Option<NodeId> {
        let Some(id) = self.stack.pop() else {
            trace!("Ignoring return at step {step} with no outstanding call");
            return None;
        };

        let node = &mut self.nodes[id];
        node.return_value = Some(format_value(value.as_ref(), &FormatLimits::CALL_TREE));
        node.raw_return_value = value;
        node.has_returned = true;
        node.is_active = false;
        node.end_step = Some(step);
        debug!("Return #{id} {} => {:?} at step {step}", node.function_name, node.return_value);

        if let Some(&caller) = self.stack.last() {
            self.nodes[caller].is_active = true;
        }
        Some(id)
    }

    /// View of the first root's subtree, `None` before any call
    pub fn to_hierarchy(&self) -> Option<CallTreeView> {
        self.to_forest().into_iter().next()
    }

    /// Views of every root, in call order
    pub fn to_forest(&self) -> Vec<CallTreeView> {
        let mut built: Vec<Option<CallTreeView>> = vec![None; self.nodes.len()];

        // children always have larger ids than their parent
        for node in self.nodes.iter().rev() {
            let children = node.children.iter().filter_map(|&child| built[child].take()).collect();
            built[node.id] = Some(CallTreeView {
                id: node.id,
                name: node.function_name.clone(),
                arguments: node.formatted_arguments.clone(),
                return_value: node.return_value.clone(),
                has_returned: node.has_returned,
                is_active: node.is_active,
                depth: node.depth,
                start_step: node.start_step,
                end_step: node.end_step,
                children,
            });
        }

        self.roots.iter().filter_map(|&root| built[root].take()).collect()
    }

    /// Node lookup by id
    pub fn node(&self, id: NodeId) -> Option<&CallTreeNode> {
        self.nodes.get(id)
    }

    /// All nodes in call order
    pub fn nodes(&self) -> &[CallTreeNode] {
        &self.nodes
    }

    /// Root node ids in call order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// The innermost outstanding call
    pub fn current_node(&self) -> Option<&CallTreeNode> {
        self.stack.last().and_then(|&id| self.nodes.get(id))
    }

    /// Number of outstanding calls
    pub fn outstanding(&self) -> usize {
        self.stack.len()
    }

    /// Number of calls recorded
    pub fn total_calls(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest nesting observed
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Whether any call has been recorded
    pub fn has_tree(&self) -> bool {
        !self.roots.is_empty()
    }

    /// Drop the whole tree and restart id assignment
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.stack.clear();
    }
}

/// Render call trees as indented text.
///
/// ```text
/// fib(3) => 2
/// ├── fib(2) => 1
/// │   ├── fib(1) => 1
/// │   └── fib(0) => 0
/// └── fib(1) => 1
/// ```
pub fn render_tree(roots: &[CallTreeView]) -> String {
    let mut out = String::new();
    // (view, prefix, is_last, is_root)
    let mut pending: Vec<(&CallTreeView, String, bool, bool)> =
        roots.iter().rev().map(|root| (root, String::new(), true, true)).collect();

    while let Some((view, prefix, is_last, is_root)) = pending.pop() {
        let connector = match (is_root, is_last) {
            (true, _) => "",
            (false, true) => "└── ",
            (false, false) => "├── ",
        };
        let marker = if view.is_active { " <" } else { "" };
        let _ = writeln!(out, "{prefix}{connector}{}{marker}", view.label());

        let child_prefix = match (is_root, is_last) {
            (true, _) => prefix,
            (false, true) => format!("{prefix}    "),
            (false, false) => format!("{prefix}│   "),
        };
        let count = view.children.len();
        for (i, child) in view.children.iter().enumerate().rev() {
            pending.push((child, child_prefix.clone(), i + 1 == count, false));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn active_count(tracker: &CallTreeTracker) -> usize {
        tracker.nodes().iter().filter(|n| n.is_active).count()
    }

    fn assert_depths(tracker: &CallTreeTracker) {
        for node in tracker.nodes() {
            let expected = node.parent.map(|p| tracker.node(p).unwrap().depth + 1).unwrap_or(0);
            assert_eq!(node.depth, expected, "depth of node {}", node.id);
        }
    }

    #[test]
    fn test_nested_call_and_return() {
        let mut tracker = CallTreeTracker::new();
        let f = tracker.on_function_call("f", vec![json!(3)], 1, Some(1));
        let g = tracker.on_function_call("g", vec![json!(2)], 2, Some(2));
        assert!(!tracker.node(f).unwrap().is_active);
        assert!(tracker.node(g).unwrap().is_active);

        assert_eq!(tracker.on_function_return(Some(json!(5)), 3), Some(g));
        assert!(tracker.node(f).unwrap().is_active);
        assert_eq!(tracker.on_function_return(Some(json!(8)), 4), Some(f));
        assert_eq!(active_count(&tracker), 0);

        let tree = tracker.to_hierarchy().unwrap();
        assert_eq!(tree.name, "f");
        assert_eq!(tree.arguments, "3");
        assert_eq!(tree.return_value.as_deref(), Some("8"));
        assert!(tree.has_returned);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "g");
        assert_eq!(tree.children[0].return_value.as_deref(), Some("5"));
        assert_eq!(tree.children[0].depth, 1);
        assert_eq!(tree.children[0].end_step, Some(3));
    }

    #[test]
    fn test_spurious_return_is_ignored() {
        let mut tracker = CallTreeTracker::new();
        assert_eq!(tracker.on_function_return(Some(json!(1)), 0), None);
        assert!(!tracker.has_tree());

        tracker.on_function_call("f", vec![], 1, None);
        tracker.on_function_return(None, 2);
        assert_eq!(tracker.on_function_return(None, 3), None);
        assert_eq!(tracker.node(0).unwrap().end_step, Some(2));
        assert_eq!(tracker.node(0).unwrap().return_value.as_deref(), Some("undefined"));
    }

    #[test]
    fn test_single_active_node_and_depth_invariants() {
        let mut tracker = CallTreeTracker::new();
        let events = [true, true, false, true, true, false, false, false, true, false];
        for (step, &is_call) in events.iter().enumerate() {
            if is_call {
                tracker.on_function_call("fib", vec![json!(step)], step, None);
            } else {
                tracker.on_function_return(Some(json!(step)), step);
            }
            assert!(active_count(&tracker) <= 1);
            assert_eq!(active_count(&tracker), usize::from(tracker.outstanding() > 0));
            assert_depths(&tracker);
        }
        assert_eq!(tracker.total_calls(), 5);
        assert_eq!(tracker.max_depth(), 2);
    }

    #[test]
    fn test_children_keep_call_order() {
        let mut tracker = CallTreeTracker::new();
        tracker.on_function_call("root", vec![], 0, None);
        for name in ["a", "b", "c"] {
            tracker.on_function_call(name, vec![], 1, None);
            tracker.on_function_return(None, 2);
        }
        let tree = tracker.to_hierarchy().unwrap();
        let names: Vec<_> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(tree.is_active);
        assert_eq!(tree.size(), 4);
    }

    #[test]
    fn test_later_top_level_call_becomes_new_root() {
        let mut tracker = CallTreeTracker::new();
        tracker.on_function_call("first", vec![], 0, None);
        tracker.on_function_return(None, 1);
        tracker.on_function_call("second", vec![], 2, None);

        assert_eq!(tracker.roots(), &[0, 1]);
        assert_eq!(tracker.node(1).unwrap().depth, 0);
        assert_eq!(tracker.to_hierarchy().unwrap().name, "first");
        assert_eq!(tracker.to_forest().len(), 2);
    }

    #[test]
    fn test_formatting_of_arguments_and_returns() {
        let mut tracker = CallTreeTracker::new();
        tracker.on_function_call("sort", vec![json!("[5, 3, 1]"), json!([1, 2, 3, 4, 5, 6])], 0, None);
        tracker.on_function_return(Some(json!("a string that is long")), 1);

        let node = tracker.node(0).unwrap();
        assert_eq!(node.formatted_arguments, "[5, 3, 1], [1, 2, 3, 4, 5, ...]");
        assert_eq!(node.return_value.as_deref(), Some("\"a string that i...\""));
        assert_eq!(node.raw_arguments.len(), 2);
    }

    #[test]
    fn test_hierarchy_does_not_mutate() {
        let mut tracker = CallTreeTracker::new();
        assert!(tracker.to_hierarchy().is_none());
        tracker.on_function_call("f", vec![], 0, None);
        let before = tracker.nodes().to_vec();
        let _ = tracker.to_hierarchy();
        let _ = tracker.to_forest();
        assert_eq!(tracker.nodes(), before.as_slice());
    }

    #[test]
    fn test_reset_restarts_ids() {
        let mut tracker = CallTreeTracker::new();
        tracker.on_function_call("f", vec![], 0, None);
        tracker.on_function_call("g", vec![], 1, None);
        tracker.reset();
        assert!(!tracker.has_tree());
        assert!(tracker.current_node().is_none());
        assert_eq!(tracker.on_function_call("h", vec![], 0, None), 0);
    }

    #[test]
    fn test_render_tree() {
        let mut tracker = CallTreeTracker::new();
        tracker.on_function_call("fib", vec![json!(3)], 0, None);
        tracker.on_function_call("fib", vec![json!(2)], 1, None);
        tracker.on_function_call("fib", vec![json!(1)], 2, None);
        tracker.on_function_return(Some(json!(1)), 3);
        tracker.on_function_call("fib", vec![json!(0)], 4, None);
        tracker.on_function_return(Some(json!(0)), 5);
        tracker.on_function_return(Some(json!(1)), 6);
        tracker.on_function_call("fib", vec![json!(1)], 7, None);

        let rendered = render_tree(&tracker.to_forest());
        let expected = "\
fib(3)
├── fib(2) => 1
│   ├── fib(1) => 1
│   └── fib(0) => 0
└── fib(1) <
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_deep_recursion_is_not_limited_by_native_stack() {
        let mut tracker = CallTreeTracker::new();
        for step in 0..20_000 {
            tracker.on_function_call("down", vec![], step, None);
        }
        let tree = tracker.to_hierarchy().unwrap();
        assert_eq!(tree.size(), 20_000);
        // dropping a deeply nested view recurses; unwind it by hand
        let mut pending = vec![tree];
        while let Some(mut view) = pending.pop() {
            pending.append(&mut view.children);
        }
    }
}
