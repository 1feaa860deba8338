//! Abstract Syntax Tree for the schema DSL.

use crate::slot::SchemaError;
use std::collections::{HashMap, HashSet};

/// Root schema definition: one protocol version's datatypes, segments, groups and messages.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub version: Option<String>,
    pub datatypes: Vec<DatatypeSection>,
    pub segments: Vec<SegmentSection>,
    pub groups: Vec<GroupSection>,
    pub messages: Vec<GroupSection>,
}

#[derive(Debug, Clone)]
pub struct DatatypeSection {
    pub name: String,
    pub kind: DatatypeKind,
}

#[derive(Debug, Clone)]
pub enum DatatypeKind {
    Primitive,
    Composite(Vec<ComponentDecl>),
}

#[derive(Debug, Clone)]
pub struct ComponentDecl {
    pub name: String,
    pub type_name: String,
    pub table_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SegmentSection {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub position: usize,
    pub type_name: String,
    pub required: bool,
    /// Declared form: 0 = unbounded.
    pub max_reps: usize,
    /// 0 = no limit.
    pub max_length: usize,
    pub table_id: Option<u32>,
    pub label: Option<String>,
    pub strict: bool,
}

/// A group or a message: both are ordered lists of child structures.
#[derive(Debug, Clone)]
pub struct GroupSection {
    pub name: String,
    pub children: Vec<ChildDecl>,
}

#[derive(Debug, Clone)]
pub struct ChildDecl {
    pub alias: Option<String>,
    pub target: String,
    pub required: bool,
    pub repeating: bool,
    pub strict: bool,
}

impl ChildDecl {
    /// Name of the slot in the parent: the alias if given, else the target class name.
    pub fn slot_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.target)
    }
}

/// What a child reference points at.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Segment(&'a SegmentSection),
    Group(&'a GroupSection),
}

/// Resolved schema: names indexed, references checked, build order computed.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema: Schema,
    pub version: String,
    datatypes_by_name: HashMap<String, usize>,
    segments_by_name: HashMap<String, usize>,
    groups_by_name: HashMap<String, usize>,
    messages_by_name: HashMap<String, usize>,
    /// Datatype indices, components before the composites that use them.
    pub datatype_order: Vec<usize>,
    /// Group indices, nested groups before the groups that contain them.
    pub group_order: Vec<usize>,
}

impl ResolvedSchema {
    pub fn resolve(schema: Schema) -> Result<Self, SchemaError> {
        let version = schema
            .version
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SchemaError::Invalid("missing version declaration".to_string()))?;

        let datatypes_by_name = index_names(schema.datatypes.iter().map(|d| d.name.as_str()), &mut HashSet::new())?;
        // Segments, groups and messages share one namespace: children refer to them by name.
        let mut structures = HashSet::new();
        let segments_by_name = index_names(schema.segments.iter().map(|s| s.name.as_str()), &mut structures)?;
        let groups_by_name = index_names(schema.groups.iter().map(|g| g.name.as_str()), &mut structures)?;
        let messages_by_name = index_names(schema.messages.iter().map(|m| m.name.as_str()), &mut structures)?;

        let resolved = ResolvedSchema {
            schema,
            version,
            datatypes_by_name,
            segments_by_name,
            groups_by_name,
            messages_by_name,
            datatype_order: Vec::new(),
            group_order: Vec::new(),
        };
        resolved.check_references()?;
        let datatype_order = resolved.order_datatypes()?;
        let group_order = resolved.order_groups()?;
        Ok(ResolvedSchema {
            datatype_order,
            group_order,
            ..resolved
        })
    }

    fn check_references(&self) -> Result<(), SchemaError> {
        for d in &self.schema.datatypes {
            if let DatatypeKind::Composite(components) = &d.kind {
                if components.is_empty() {
                    return Err(SchemaError::Invalid(format!("composite {} has no components", d.name)));
                }
                for c in components {
                    if self.get_datatype(&c.type_name).is_none() {
                        return Err(SchemaError::UnknownReference(format!(
                            "{}.{}: datatype {}",
                            d.name, c.name, c.type_name
                        )));
                    }
                }
            }
        }
        for s in &self.schema.segments {
            for f in &s.fields {
                if self.get_datatype(&f.type_name).is_none() {
                    return Err(SchemaError::UnknownReference(format!(
                        "{}-{}: datatype {}",
                        s.name, f.position, f.type_name
                    )));
                }
            }
        }
        for g in self.schema.groups.iter().chain(&self.schema.messages) {
            for c in &g.children {
                if self.target(&c.target).is_some() {
                    continue;
                }
                if self.get_message(&c.target).is_some() {
                    return Err(SchemaError::Invalid(format!(
                        "{}: message {} cannot be used as a child",
                        g.name, c.target
                    )));
                }
                return Err(SchemaError::UnknownReference(format!(
                    "{}: structure {}",
                    g.name, c.target
                )));
            }
        }
        Ok(())
    }

    fn order_datatypes(&self) -> Result<Vec<usize>, SchemaError> {
        let deps = move |i: usize| -> Vec<usize> {
            match &self.schema.datatypes[i].kind {
                DatatypeKind::Primitive => Vec::new(),
                DatatypeKind::Composite(components) => components
                    .iter()
                    .filter_map(|c| self.datatypes_by_name.get(&c.type_name).copied())
                    .collect(),
            }
        };
        let name = move |i: usize| self.schema.datatypes[i].name.as_str();
        topo_order(self.schema.datatypes.len(), deps, name, "composite")
    }

    fn order_groups(&self) -> Result<Vec<usize>, SchemaError> {
        let deps = move |i: usize| -> Vec<usize> {
            self.schema.groups[i]
                .children
                .iter()
                .filter_map(|c| self.groups_by_name.get(&c.target).copied())
                .collect()
        };
        let name = move |i: usize| self.schema.groups[i].name.as_str();
        topo_order(self.schema.groups.len(), deps, name, "group")
    }

    pub fn get_datatype(&self, name: &str) -> Option<&DatatypeSection> {
        self.datatypes_by_name
            .get(name)
            .map(|&i| &self.schema.datatypes[i])
    }

    pub fn get_segment(&self, name: &str) -> Option<&SegmentSection> {
        self.segments_by_name
            .get(name)
            .map(|&i| &self.schema.segments[i])
    }

    pub fn get_group(&self, name: &str) -> Option<&GroupSection> {
        self.groups_by_name
            .get(name)
            .map(|&i| &self.schema.groups[i])
    }

    pub fn get_message(&self, name: &str) -> Option<&GroupSection> {
        self.messages_by_name
            .get(name)
            .map(|&i| &self.schema.messages[i])
    }

    /// Resolve a child reference to a segment or group.
    pub fn target(&self, name: &str) -> Option<Target<'_>> {
        self.get_segment(name)
            .map(Target::Segment)
            .or_else(|| self.get_group(name).map(Target::Group))
    }
}

fn index_names<'a>(
    names: impl Iterator<Item = &'a str>,
    seen: &mut HashSet<String>,
) -> Result<HashMap<String, usize>, SchemaError> {
    let mut by_name = HashMap::new();
    for (i, name) in names.enumerate() {
        if !seen.insert(name.to_string()) {
            return Err(SchemaError::DuplicateDeclaration(name.to_string()));
        }
        by_name.insert(name.to_string(), i);
    }
    Ok(by_name)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Depth-first post-order over `0..n`; an edge back to an active node is a cycle.
fn topo_order<'a, D, N>(n: usize, deps: D, name: N, what: &str) -> Result<Vec<usize>, SchemaError>
where
    D: Fn(usize) -> Vec<usize>,
    N: Fn(usize) -> &'a str,
{
    fn visit<'a, D, N>(
        i: usize,
        deps: &D,
        name: &N,
        what: &str,
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> Result<(), SchemaError>
    where
        D: Fn(usize) -> Vec<usize>,
        N: Fn(usize) -> &'a str,
    {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                return Err(SchemaError::Cycle(format!("{} {} contains itself", what, name(i))));
            }
            Mark::New => {}
        }
        marks[i] = Mark::Active;
        for d in deps(i) {
            visit(d, deps, name, what, marks, order)?;
        }
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }

    let mut marks = vec![Mark::New; n];
    let mut order = Vec::with_capacity(n);
    for i in 0..n {
        visit(i, &deps, &name, what, &mut marks, &mut order)?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primitive(name: &str) -> DatatypeSection {
        DatatypeSection {
            name: name.to_string(),
            kind: DatatypeKind::Primitive,
        }
    }

    fn composite(name: &str, types: &[&str]) -> DatatypeSection {
        DatatypeSection {
            name: name.to_string(),
            kind: DatatypeKind::Composite(
                types
                    .iter()
                    .enumerate()
                    .map(|(i, t)| ComponentDecl {
                        name: format!("c{}", i + 1),
                        type_name: t.to_string(),
                        table_id: None,
                    })
                    .collect(),
            ),
        }
    }

    fn child(target: &str) -> ChildDecl {
        ChildDecl {
            alias: None,
            target: target.to_string(),
            required: false,
            repeating: false,
            strict: false,
        }
    }

    fn group(name: &str, children: &[&str]) -> GroupSection {
        GroupSection {
            name: name.to_string(),
            children: children.iter().map(|c| child(c)).collect(),
        }
    }

    fn schema() -> Schema {
        Schema {
            version: Some("2.5".to_string()),
            ..Schema::default()
        }
    }

    #[test]
    fn datatype_order_puts_components_first() {
        let mut s = schema();
        s.datatypes = vec![composite("CX", &["HD", "ST"]), composite("HD", &["IS"]), primitive("ST"), primitive("IS")];
        let r = ResolvedSchema::resolve(s).expect("resolve");
        let names: Vec<&str> = r
            .datatype_order
            .iter()
            .map(|&i| r.schema.datatypes[i].name.as_str())
            .collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).expect("present");
        assert!(pos("IS") < pos("HD"));
        assert!(pos("HD") < pos("CX"));
        assert!(pos("ST") < pos("CX"));
    }

    #[test]
    fn composite_cycle_is_rejected() {
        let mut s = schema();
        s.datatypes = vec![composite("AA", &["BB"]), composite("BB", &["AA"])];
        let err = ResolvedSchema::resolve(s).unwrap_err();
        assert!(matches!(err, SchemaError::Cycle(_)), "{}", err);
    }

    #[test]
    fn group_cycle_is_rejected() {
        let mut s = schema();
        s.segments = vec![SegmentSection {
            name: "PID".to_string(),
            fields: Vec::new(),
        }];
        s.groups = vec![group("A", &["PID", "B"]), group("B", &["A"])];
        let err = ResolvedSchema::resolve(s).unwrap_err();
        assert!(matches!(err, SchemaError::Cycle(ref m) if m.contains("group")), "{}", err);
    }

    #[test]
    fn message_as_child_is_invalid() {
        let mut s = schema();
        s.messages = vec![group("ADT_A01", &[]), group("ADT_A02", &["ADT_A01"])];
        let err = ResolvedSchema::resolve(s).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)), "{}", err);
    }

    #[test]
    fn structure_names_share_a_namespace() {
        let mut s = schema();
        s.segments = vec![SegmentSection {
            name: "PID".to_string(),
            fields: Vec::new(),
        }];
        s.groups = vec![group("PID", &[])];
        let err = ResolvedSchema::resolve(s).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateDeclaration(ref n) if n == "PID"));
    }

    #[test]
    fn missing_version_is_invalid() {
        let err = ResolvedSchema::resolve(Schema::default()).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)));
    }
}
