//! Advisory validation of a populated message.
//!
//! The engine never blocks construction of an incomplete tree; this pass reports what an
//! encoder or receiver would object to.
//!
//! ## Checks
//!
//! - **Missing required structure**: a required slot of the message, or of any populated
//!   group, has no repetition.
//! - **Missing required field**: a required field of a populated segment has no non-empty
//!   repetition.
//! - **Max length**: a field's display form (see [`format_value`]) is longer than the
//!   declared length.
//! - **Table value**: a value bound to a coding table is not in that table, according to
//!   a [`TableLookup`]. Tables the lookup does not know are skipped.

use crate::dump::format_value;
use crate::structure::{Group, Message, Segment};
use crate::value::Value;
use crate::walk::{format_path, walk_group, Step, Visitor};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Identifies which check produced the finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    MissingRequiredStructure,
    MissingRequiredField,
    MaxLength,
    TableValue,
}

#[derive(Debug, Clone)]
pub struct Finding {
    /// Location, e.g. `/ADT_A01/PATIENT(1)/PID-3[2]`.
    pub path: String,
    pub check: Check,
    pub severity: Severity,
    pub message: String,
}

/// Coding-table membership. `None` means the table is unknown to this lookup.
pub trait TableLookup {
    fn contains(&self, table_id: u32, value: &str) -> Option<bool>;
}

/// In-memory tables.
#[derive(Debug, Clone, Default)]
pub struct MapTableLookup {
    tables: HashMap<u32, HashSet<String>>,
}

impl MapTableLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, table_id: u32, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .entry(table_id)
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }
}

impl TableLookup for MapTableLookup {
    fn contains(&self, table_id: u32, value: &str) -> Option<bool> {
        self.tables.get(&table_id).map(|t| t.contains(value))
    }
}

struct Validator<'t> {
    tables: Option<&'t dyn TableLookup>,
    findings: Vec<Finding>,
}

impl Validator<'_> {
    fn push(&mut self, path: String, check: Check, severity: Severity, message: String) {
        log::debug!("{}: {}", path, message);
        self.findings.push(Finding {
            path,
            check,
            severity,
            message,
        });
    }

    fn check_tables(&mut self, path: &str, v: &Value) {
        let Some(tables) = self.tables else {
            return;
        };
        let (table_id, raw) = match v {
            Value::Primitive(p) => (p.table_id(), p.value()),
            Value::Composite(c) => (c.table_id(), v.raw()),
        };
        if let (Some(id), Some(raw)) = (table_id, raw.filter(|r| !r.is_empty())) {
            if tables.contains(id, raw) == Some(false) {
                let message = format!("{:?} not in table {}", raw, id);
                self.push(path.to_string(), Check::TableValue, Severity::Warning, message);
            }
        }
        if let Value::Composite(c) = v {
            for (i, sub) in c.components().iter().enumerate() {
                self.check_tables(&format!("{}.{}", path, i + 1), sub);
            }
        }
    }
}

impl Visitor for Validator<'_> {
    fn enter_group(&mut self, path: &[Step<'_>], group: &Group) -> bool {
        for (slot, reps) in group.iter() {
            if slot.is_required() && reps.is_empty() {
                self.push(
                    format_path(path),
                    Check::MissingRequiredStructure,
                    Severity::Error,
                    format!("required {} {} is missing", slot.kind(), slot.name()),
                );
            }
        }
        true
    }

    fn segment(&mut self, path: &[Step<'_>], segment: &Segment) {
        let base = format_path(path);
        for (slot, reps) in segment.iter() {
            let position = slot.position();
            if slot.is_required() && reps.iter().all(Value::is_empty) {
                self.push(
                    format!("{}-{}", base, position),
                    Check::MissingRequiredField,
                    Severity::Error,
                    format!("required field {} ({}) is empty", position, slot.description()),
                );
            }
            for (rep, v) in reps.iter().enumerate() {
                if v.is_empty() {
                    continue;
                }
                let path = if slot.repetitions().is_repeating() {
                    format!("{}-{}[{}]", base, position, rep)
                } else {
                    format!("{}-{}", base, position)
                };
                if let Some(max) = slot.length_limit() {
                    let len = format_value(v).chars().count();
                    if len > max {
                        let message = format!("length {} exceeds {}", len, max);
                        self.push(path.clone(), Check::MaxLength, Severity::Error, message);
                    }
                }
                self.check_tables(&path, v);
            }
        }
    }
}

/// Run every check over `message`; findings come in walk order.
pub fn validate_message(message: &Message, tables: Option<&dyn TableLookup>) -> Vec<Finding> {
    validate_group(message.root(), tables)
}

pub fn validate_group(group: &Group, tables: Option<&dyn TableLookup>) -> Vec<Finding> {
    let mut v = Validator {
        tables,
        findings: Vec::new(),
    };
    walk_group(group, &mut v);
    v.findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{Component, CompositeType, PrimitiveType};
    use crate::slot::{FieldSlot, GroupSchema, SegmentSchema, StructureSlot};
    use std::sync::Arc;

    fn message() -> Message {
        let st = PrimitiveType::shared("ST");
        let id = PrimitiveType::shared("ID");
        let ce: crate::datatype::TypeRef = Arc::new(CompositeType::new(
            "CE",
            vec![Component::new("identifier", st.clone()), Component::new("system", id.clone()).with_table(396)],
        ));
        let mut pid = SegmentSchema::builder("PID");
        pid.declare_field(FieldSlot::new(1, st.clone()).required(true))
            .and_then(|b| b.declare_field(FieldSlot::new(2, st).max_length(5)))
            .and_then(|b| b.declare_field(FieldSlot::new(3, id).table(1)))
            .and_then(|b| b.declare_field(FieldSlot::new(4, ce).max_reps(0)))
            .expect("PID");
        let evn = SegmentSchema::builder("EVN").build();
        let mut msg = GroupSchema::builder("ADT_A01");
        msg.declare_structure(StructureSlot::new(Arc::new(pid.build())).required(true))
            .and_then(|b| b.declare_structure(StructureSlot::new(Arc::new(evn)).required(true)))
            .expect("ADT_A01");
        Message::new(msg.build(), "2.5")
    }

    #[test]
    fn reports_missing_required() {
        let mut msg = message();
        msg.segment("PID", 0).expect("PID");
        let findings = validate_message(&msg, None);
        let checks: Vec<(Check, &str)> = findings.iter().map(|f| (f.check, f.path.as_str())).collect();
        assert_eq!(
            checks,
            [
                (Check::MissingRequiredStructure, "/ADT_A01"),
                (Check::MissingRequiredField, "/ADT_A01/PID-1"),
            ]
        );
        assert!(findings[0].message.contains("EVN"));
    }

    #[test]
    fn reports_length_and_table_values() {
        let mut msg = message();
        let pid = msg.segment("PID", 0).expect("PID");
        pid.set_field_value(1, 0, "1").expect("PID-1");
        pid.set_field_value(2, 0, "toolong").expect("PID-2");
        pid.set_field_value(3, 0, "X").expect("PID-3");
        pid.set_field_value(4, 1, "abc").expect("PID-4");
        let sys = pid
            .get_field(4, 1)
            .expect("PID-4")
            .as_composite_mut()
            .and_then(|c| c.component_mut(2))
            .expect("component 2");
        sys.set_raw("LN");

        let mut tables = MapTableLookup::new();
        tables.insert(1, ["F", "M"]);
        tables.insert(396, ["LN"]);
        let findings = validate_message(&msg, Some(&tables));
        let checks: Vec<(Check, &str)> = findings
            .iter()
            .filter(|f| f.check != Check::MissingRequiredStructure)
            .map(|f| (f.check, f.path.as_str()))
            .collect();
        assert_eq!(
            checks,
            [(Check::MaxLength, "/ADT_A01/PID-2"), (Check::TableValue, "/ADT_A01/PID-3")]
        );

        let mut strict = MapTableLookup::new();
        strict.insert(396, ["SCT"]);
        let findings = validate_message(&msg, Some(&strict));
        assert!(findings
            .iter()
            .any(|f| f.check == Check::TableValue && f.path == "/ADT_A01/PID-4[1].2"));
    }
}
