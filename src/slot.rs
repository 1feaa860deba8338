//! Slot tables: the ordered, immutable layout of segments and groups.
//!
//! A [`SegmentSchema`] lists field slots by position; a [`GroupSchema`] lists named
//! structure slots. Both are declared once through their builders and are cheap to clone
//! (`Arc` inside), so every instance of a segment or group shares one table.

use crate::datatype::TypeRef;
use crate::navigate::Cardinality;
use crate::structure::StructureDescriptor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Construction-time fault: the schema (or one of its tables) is unusable.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Parse: {0}")]
    Parse(String),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("{owner}: duplicate slot name {name}")]
    DuplicateSlot { owner: String, name: String },
    #[error("{owner}: field position {position} out of sequence (expected {expected})")]
    OutOfSequence {
        owner: String,
        position: usize,
        expected: usize,
    },
    #[error("Duplicate declaration: {0}")]
    DuplicateDeclaration(String),
    #[error("Unknown reference: {0}")]
    UnknownReference(String),
    #[error("Cycle: {0}")]
    Cycle(String),
    #[error("Invalid schema: {0}")]
    Invalid(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Maximum repetitions of a slot. Declared as `0` for unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxReps {
    Unbounded,
    Limit(usize),
}

impl MaxReps {
    pub fn from_declared(n: usize) -> Self {
        if n == 0 {
            MaxReps::Unbounded
        } else {
            MaxReps::Limit(n)
        }
    }

    /// The declared form (`0` = unbounded).
    pub fn declared(&self) -> usize {
        match self {
            MaxReps::Unbounded => 0,
            MaxReps::Limit(n) => *n,
        }
    }

    /// Whether repetition index `rep` (0-based) is within bounds.
    pub fn allows(&self, rep: usize) -> bool {
        match self {
            MaxReps::Unbounded => true,
            MaxReps::Limit(n) => rep < *n,
        }
    }

    pub fn is_repeating(&self) -> bool {
        !matches!(self, MaxReps::Limit(1))
    }
}

impl fmt::Display for MaxReps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxReps::Unbounded => f.write_str("*"),
            MaxReps::Limit(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    Segment,
    Group,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureKind::Segment => f.write_str("segment"),
            StructureKind::Group => f.write_str("group"),
        }
    }
}

/// A positioned, typed place in a segment.
#[derive(Debug, Clone)]
pub struct FieldSlot {
    position: usize,
    datatype: TypeRef,
    required: bool,
    max_reps: MaxReps,
    max_length: usize,
    table_id: Option<u32>,
    label: String,
    auto_fill: bool,
}

impl FieldSlot {
    /// Optional, non-repeating, no length limit, no table, auto-fill on.
    pub fn new(position: usize, datatype: TypeRef) -> Self {
        FieldSlot {
            position,
            datatype,
            required: false,
            max_reps: MaxReps::Limit(1),
            max_length: 0,
            table_id: None,
            label: String::new(),
            auto_fill: true,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// `0` = unbounded.
    pub fn max_reps(mut self, n: usize) -> Self {
        self.max_reps = MaxReps::from_declared(n);
        self
    }

    /// `0` = no limit.
    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = n;
        self
    }

    pub fn table(mut self, table_id: u32) -> Self {
        self.table_id = Some(table_id);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Disable auto-fill: repetitions must be addressed contiguously.
    pub fn strict(mut self) -> Self {
        self.auto_fill = false;
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn datatype(&self) -> &TypeRef {
        &self.datatype
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn repetitions(&self) -> MaxReps {
        self.max_reps
    }

    pub fn length_limit(&self) -> Option<usize> {
        (self.max_length > 0).then_some(self.max_length)
    }

    pub fn table_id(&self) -> Option<u32> {
        self.table_id
    }

    pub fn description(&self) -> &str {
        &self.label
    }

    pub fn cardinality(&self) -> Cardinality {
        Cardinality {
            max: self.max_reps,
            auto_fill: self.auto_fill,
        }
    }
}

#[derive(Debug)]
struct SegmentTable {
    name: String,
    fields: Vec<FieldSlot>,
}

/// Field slot table of one segment class.
#[derive(Debug, Clone)]
pub struct SegmentSchema(Arc<SegmentTable>);

impl SegmentSchema {
    pub fn builder(name: impl Into<String>) -> SegmentBuilder {
        SegmentBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Slots in position order (position `i + 1` at index `i`).
    pub fn fields(&self) -> &[FieldSlot] {
        &self.0.fields
    }

    pub fn field(&self, position: usize) -> Option<&FieldSlot> {
        position.checked_sub(1).and_then(|i| self.0.fields.get(i))
    }

    pub fn len(&self) -> usize {
        self.0.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.fields.is_empty()
    }

    /// Same table (identity, not structural equality).
    pub fn ptr_eq(&self, other: &SegmentSchema) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

pub struct SegmentBuilder {
    name: String,
    fields: Vec<FieldSlot>,
}

impl SegmentBuilder {
    /// Declare the next field. Positions must run 1, 2, 3, ... in declaration order.
    pub fn declare_field(&mut self, slot: FieldSlot) -> Result<&mut Self, SchemaError> {
        let expected = self.fields.len() + 1;
        if slot.position != expected {
            return Err(SchemaError::OutOfSequence {
                owner: self.name.clone(),
                position: slot.position,
                expected,
            });
        }
        self.fields.push(slot);
        Ok(self)
    }

    pub fn build(self) -> SegmentSchema {
        SegmentSchema(Arc::new(SegmentTable {
            name: self.name,
            fields: self.fields,
        }))
    }
}

/// A named place in a group for a child segment or group.
#[derive(Debug, Clone)]
pub struct StructureSlot {
    name: String,
    descriptor: Arc<dyn StructureDescriptor>,
    required: bool,
    repeating: bool,
    auto_fill: bool,
}

impl StructureSlot {
    /// Slot named after the descriptor; optional and non-repeating.
    pub fn new(descriptor: Arc<dyn StructureDescriptor>) -> Self {
        let name = descriptor.name().to_string();
        Self::named(name, descriptor)
    }

    /// Slot with an explicit name (e.g. the same group class under two roles).
    pub fn named(name: impl Into<String>, descriptor: Arc<dyn StructureDescriptor>) -> Self {
        StructureSlot {
            name: name.into(),
            descriptor,
            required: false,
            repeating: false,
            auto_fill: true,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn repeating(mut self, repeating: bool) -> Self {
        self.repeating = repeating;
        self
    }

    pub fn strict(mut self) -> Self {
        self.auto_fill = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<dyn StructureDescriptor> {
        &self.descriptor
    }

    pub fn kind(&self) -> StructureKind {
        self.descriptor.kind()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    pub fn cardinality(&self) -> Cardinality {
        Cardinality {
            max: if self.repeating {
                MaxReps::Unbounded
            } else {
                MaxReps::Limit(1)
            },
            auto_fill: self.auto_fill,
        }
    }
}

#[derive(Debug)]
struct GroupTable {
    name: String,
    slots: Vec<StructureSlot>,
    by_name: HashMap<String, usize>,
}

/// Structure slot table of one group or message class.
#[derive(Debug, Clone)]
pub struct GroupSchema(Arc<GroupTable>);

impl GroupSchema {
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder {
            name: name.into(),
            slots: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Slots in declaration order (wire order).
    pub fn slots(&self) -> &[StructureSlot] {
        &self.0.slots
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.by_name.get(name).copied()
    }

    pub fn slot(&self, name: &str) -> Option<&StructureSlot> {
        self.index_of(name).map(|i| &self.0.slots[i])
    }

    pub fn len(&self) -> usize {
        self.0.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.slots.is_empty()
    }

    pub fn ptr_eq(&self, other: &GroupSchema) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

pub struct GroupBuilder {
    name: String,
    slots: Vec<StructureSlot>,
    by_name: HashMap<String, usize>,
}

impl GroupBuilder {
    /// Declare the next child structure. Slot names must be unique within the group.
    pub fn declare_structure(&mut self, slot: StructureSlot) -> Result<&mut Self, SchemaError> {
        if self.by_name.contains_key(slot.name()) {
            return Err(SchemaError::DuplicateSlot {
                owner: self.name.clone(),
                name: slot.name().to_string(),
            });
        }
        self.by_name.insert(slot.name().to_string(), self.slots.len());
        self.slots.push(slot);
        Ok(self)
    }

    pub fn build(self) -> GroupSchema {
        GroupSchema(Arc::new(GroupTable {
            name: self.name,
            slots: self.slots,
            by_name: self.by_name,
        }))
    }
}
