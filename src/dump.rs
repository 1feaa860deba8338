//! Format a populated message tree for display (debug dump, CLI output).

use crate::structure::{Group, Message, Segment};
use crate::value::Value;
use crate::walk::{walk_group, Step, Visitor};
use std::fmt::Write as _;

/// Display form of a value: the raw string of a primitive, or components joined with `^`
/// (nested components with `&`), trailing empty components dropped.
pub fn format_value(v: &Value) -> String {
    format_at_depth(v, 0)
}

fn format_at_depth(v: &Value, depth: usize) -> String {
    match v {
        Value::Primitive(p) => p.value().unwrap_or_default().to_string(),
        Value::Composite(c) => {
            let sep = if depth == 0 { "^" } else { "&" };
            let mut parts: Vec<String> = c
                .components()
                .iter()
                .map(|sub| format_at_depth(sub, depth + 1))
                .collect();
            while parts.last().is_some_and(String::is_empty) {
                parts.pop();
            }
            parts.join(sep)
        }
    }
}

struct Dump {
    out: String,
}

impl Dump {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

fn label(step: &Step<'_>) -> String {
    if step.rep > 0 {
        format!("{}({})", step.name, step.rep)
    } else {
        step.name.to_string()
    }
}

impl Visitor for Dump {
    fn enter_group(&mut self, path: &[Step<'_>], group: &Group) -> bool {
        if group.is_empty() {
            return false;
        }
        if let Some(step) = path.last() {
            self.line(path.len() - 1, &label(step));
        }
        true
    }

    fn segment(&mut self, path: &[Step<'_>], segment: &Segment) {
        let depth = path.len() - 1;
        let step = path.last();
        let mut head = step.map(label).unwrap_or_default();
        // Aliased slot: show the segment class too.
        if step.is_some_and(|s| s.name != segment.name()) {
            let _ = write!(head, " [{}]", segment.name());
        }
        self.line(depth, &head);
        for (slot, reps) in segment.iter() {
            for (rep, v) in reps.iter().enumerate() {
                if v.is_empty() {
                    continue;
                }
                let mut text = format!("{}", slot.position());
                if slot.repetitions().is_repeating() {
                    let _ = write!(text, "[{}]", rep);
                }
                let _ = write!(text, " {}: {}", v.type_name(), format_value(v));
                self.line(depth + 1, &text);
            }
        }
    }
}

/// Indented dump of every non-empty group, segment and field value below `group`.
pub fn dump_group(group: &Group) -> String {
    let mut d = Dump { out: String::new() };
    walk_group(group, &mut d);
    d.out
}

/// Like [`dump_group`], headed by the message version.
pub fn dump_message(message: &Message) -> String {
    let mut out = format!("# version {}\n", message.version());
    out.push_str(&dump_group(message.root()));
    out
}
