//! Slot-order traversal of a populated message tree.
//!
//! This is the read side an encoder relies on: children are visited in **declaration
//! order** of their group's slots, and repetitions in **creation order**. Nothing is created
//! while walking; empty slots are skipped.
//!
//! ## Paths
//!
//! Every callback receives the path from the root to the current instance as a slice of
//! [`Step`]s. The first step is the root group itself; each later step is the *slot* name
//! in the parent (an alias if one was declared) and the repetition index in that slot.
//! [`format_path`] renders a path as `/ADT_A01/PATIENT(1)/PID`, omitting `(0)`.
//!
//! ## Example
//!
//! ```ignore
//! use hl7tree::walk::{segment_names, walk_message, Visitor};
//!
//! let order = segment_names(msg.root());
//! // ["MSH", "PID", "NK1", "NK1"] in wire order
//! ```

use crate::structure::{Group, Message, Segment, Structure};
use std::fmt::Write as _;

/// One level of a path: slot name and repetition index within that slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step<'a> {
    pub name: &'a str,
    pub rep: usize,
}

/// Callbacks for [`walk_group`]. Only `segment` is mandatory.
pub trait Visitor {
    /// Called before a group's children. Return `false` to skip them (and `exit_group`).
    fn enter_group(&mut self, _path: &[Step<'_>], _group: &Group) -> bool {
        true
    }

    fn exit_group(&mut self, _path: &[Step<'_>], _group: &Group) {}

    fn segment(&mut self, path: &[Step<'_>], segment: &Segment);
}

/// Visit `group` and everything below it in slot order.
pub fn walk_group<V: Visitor + ?Sized>(group: &Group, visitor: &mut V) {
    let mut path = vec![Step {
        name: group.name(),
        rep: 0,
    }];
    visit_group(group, &mut path, visitor);
}

pub fn walk_message<V: Visitor + ?Sized>(message: &Message, visitor: &mut V) {
    walk_group(message.root(), visitor);
}

fn visit_group<'a, V: Visitor + ?Sized>(group: &'a Group, path: &mut Vec<Step<'a>>, visitor: &mut V) {
    if !visitor.enter_group(path, group) {
        return;
    }
    for (slot, reps) in group.iter() {
        for (rep, child) in reps.iter().enumerate() {
            path.push(Step { name: slot.name(), rep });
            match child {
                Structure::Segment(s) => visitor.segment(path, s),
                Structure::Group(g) => visit_group(g, path, visitor),
            }
            path.pop();
        }
    }
    visitor.exit_group(path, group);
}

/// Render a path as `/A/B(2)/C`; repetition 0 is implicit.
pub fn format_path(path: &[Step<'_>]) -> String {
    let mut out = String::new();
    for step in path {
        out.push('/');
        out.push_str(step.name);
        if step.rep > 0 {
            let _ = write!(out, "({})", step.rep);
        }
    }
    out
}

/// Names of populated segments in the order an encoder would emit them.
pub fn segment_names(group: &Group) -> Vec<String> {
    struct Names(Vec<String>);

    impl Visitor for Names {
        fn segment(&mut self, _path: &[Step<'_>], segment: &Segment) {
            self.0.push(segment.name().to_string());
        }
    }

    let mut names = Names(Vec::new());
    walk_group(group, &mut names);
    names.0
}
