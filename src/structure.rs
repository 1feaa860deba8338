//! Runtime message tree: segments, groups and the message root.
//!
//! Instances are created empty and grow on demand. A [`Group`] holds, per structure slot,
//! the repetitions of its children; a [`Segment`] holds, per field slot, the repetitions
//! of its values. Ownership is a plain tree: dropping a group drops its subtree.
//!
//! Every instance shares its message's [`TreeContext`] (version tag, fault reporter,
//! instance id counter). Children never point back at their parent.

use crate::datatype::{BuildContext, BuildError};
use crate::fault::{report_internal, FaultReporter, LogReporter, NavError, SlotKey};
use crate::navigate::{Addr, Repetitions};
use crate::slot::{FieldSlot, GroupSchema, SegmentSchema, StructureKind, StructureSlot};
use crate::value::Value;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Builds the instance that goes into a structure slot.
pub trait StructureDescriptor: fmt::Debug + Send + Sync {
    /// Class name; also the default slot name.
    fn name(&self) -> &str;
    fn kind(&self) -> StructureKind;
    fn build(&self, ctx: &Arc<TreeContext>) -> Result<Structure, BuildError>;

    /// Slot table of the group this descriptor builds, if it builds a group.
    fn group_schema(&self) -> Option<&GroupSchema> {
        None
    }
}

impl StructureDescriptor for SegmentSchema {
    fn name(&self) -> &str {
        SegmentSchema::name(self)
    }

    fn kind(&self) -> StructureKind {
        StructureKind::Segment
    }

    fn build(&self, ctx: &Arc<TreeContext>) -> Result<Structure, BuildError> {
        Ok(Structure::Segment(Segment::new(self.clone(), ctx)))
    }
}

impl StructureDescriptor for GroupSchema {
    fn name(&self) -> &str {
        GroupSchema::name(self)
    }

    fn kind(&self) -> StructureKind {
        StructureKind::Group
    }

    fn build(&self, ctx: &Arc<TreeContext>) -> Result<Structure, BuildError> {
        Ok(Structure::Group(Group::new(self.clone(), ctx)))
    }

    fn group_schema(&self) -> Option<&GroupSchema> {
        Some(self)
    }
}

/// Identity of one segment or group instance, unique within its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State shared by every instance of one message tree.
#[derive(Debug)]
pub struct TreeContext {
    version: Arc<str>,
    reporter: Arc<dyn FaultReporter>,
    next_id: AtomicU64,
}

impl TreeContext {
    pub fn new(version: &str, reporter: Arc<dyn FaultReporter>) -> Arc<Self> {
        Arc::new(TreeContext {
            version: Arc::from(version),
            reporter,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn reporter(&self) -> &dyn FaultReporter {
        self.reporter.as_ref()
    }

    fn next_id(&self) -> InstanceId {
        InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// A child of a group: either a segment or a nested group.
#[derive(Debug)]
pub enum Structure {
    Segment(Segment),
    Group(Group),
}

impl Structure {
    pub fn name(&self) -> &str {
        match self {
            Structure::Segment(s) => s.name(),
            Structure::Group(g) => g.name(),
        }
    }

    pub fn id(&self) -> InstanceId {
        match self {
            Structure::Segment(s) => s.id(),
            Structure::Group(g) => g.id(),
        }
    }

    pub fn kind(&self) -> StructureKind {
        match self {
            Structure::Segment(_) => StructureKind::Segment,
            Structure::Group(_) => StructureKind::Group,
        }
    }

    pub fn as_segment(&self) -> Option<&Segment> {
        match self {
            Structure::Segment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_segment_mut(&mut self) -> Option<&mut Segment> {
        match self {
            Structure::Segment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Structure::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match self {
            Structure::Group(g) => Some(g),
            _ => None,
        }
    }

    /// No populated values anywhere below this instance.
    pub fn is_empty(&self) -> bool {
        match self {
            Structure::Segment(s) => s.is_empty(),
            Structure::Group(g) => g.is_empty(),
        }
    }
}

/// One segment instance: per field slot, the repetitions of its value.
#[derive(Debug)]
pub struct Segment {
    id: InstanceId,
    schema: SegmentSchema,
    ctx: Arc<TreeContext>,
    fields: Vec<Repetitions<Value>>,
}

impl Segment {
    pub fn new(schema: SegmentSchema, ctx: &Arc<TreeContext>) -> Self {
        let fields = (0..schema.len()).map(|_| Repetitions::new()).collect();
        Segment {
            id: ctx.next_id(),
            schema,
            ctx: Arc::clone(ctx),
            fields,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &SegmentSchema {
        &self.schema
    }

    pub fn version(&self) -> &str {
        self.ctx.version()
    }

    /// Field slots in position order.
    pub fn slots(&self) -> &[FieldSlot] {
        self.schema.fields()
    }

    fn index(&self, position: usize) -> Result<usize, NavError> {
        if position == 0 || position > self.fields.len() {
            return Err(Addr::position(self.schema.name(), position).unknown());
        }
        Ok(position - 1)
    }

    /// Repetition `rep` of field `position`, created (with any missing earlier
    /// repetitions) if it is not there yet.
    pub fn get_field(&mut self, position: usize, rep: usize) -> Result<&mut Value, NavError> {
        let i = self.index(position)?;
        let (schema, ctx) = (&self.schema, &self.ctx);
        let slot = &schema.fields()[i];
        let at = Addr::position(schema.name(), position);
        self.fields[i].get_or_create(rep, slot.cardinality(), &at, || {
            build_value(ctx, schema.name(), slot)
        })
    }

    /// Repetition `rep` of field `position` if populated; never creates. A `rep` the
    /// slot can never hold is a cardinality fault, not `None`.
    pub fn field(&self, position: usize, rep: usize) -> Result<Option<&Value>, NavError> {
        let i = self.index(position)?;
        let at = Addr::position(self.schema.name(), position);
        self.schema.fields()[i].cardinality().check(rep, &at)?;
        Ok(self.fields[i].get(rep))
    }

    /// Every populated repetition of field `position`, in order; never creates.
    pub fn get_all_fields(&self, position: usize) -> Result<&[Value], NavError> {
        let i = self.index(position)?;
        Ok(self.fields[i].as_slice())
    }

    pub fn repetitions_used(&self, position: usize) -> Result<usize, NavError> {
        let i = self.index(position)?;
        Ok(self.fields[i].len())
    }

    /// Append a new repetition to field `position`.
    pub fn add_field(&mut self, position: usize) -> Result<&mut Value, NavError> {
        let i = self.index(position)?;
        let (schema, ctx) = (&self.schema, &self.ctx);
        let slot = &schema.fields()[i];
        let at = Addr::position(schema.name(), position);
        self.fields[i].append(slot.cardinality(), &at, || build_value(ctx, schema.name(), slot))
    }

    /// Remove repetition `index` of field `position`; later repetitions shift down.
    pub fn remove_field_repetition(&mut self, position: usize, index: usize) -> Result<Value, NavError> {
        let i = self.index(position)?;
        let at = Addr::position(self.schema.name(), position);
        self.fields[i].remove_at(index, &at)
    }

    /// Shorthand for `get_field(position, rep)?.set_raw(raw)`.
    pub fn set_field_value(&mut self, position: usize, rep: usize, raw: impl Into<String>) -> Result<(), NavError> {
        self.get_field(position, rep)?.set_raw(raw);
        Ok(())
    }

    /// Slots in position order, each with its populated repetitions.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldSlot, &[Value])> + '_ {
        self.schema
            .fields()
            .iter()
            .zip(self.fields.iter().map(Repetitions::as_slice))
    }

    pub fn is_empty(&self) -> bool {
        self.fields
            .iter()
            .all(|reps| reps.as_slice().iter().all(Value::is_empty))
    }
}

fn build_value(ctx: &TreeContext, owner: &str, slot: &FieldSlot) -> Result<Value, NavError> {
    let bctx = BuildContext {
        version: ctx.version(),
        owner,
        table_id: slot.table_id(),
    };
    slot.datatype().build(&bctx).map_err(|e| {
        report_internal(
            ctx.reporter(),
            ctx.version(),
            owner,
            SlotKey::Position(slot.position()),
            e,
        )
    })
}

/// One group instance: per structure slot, the repetitions of its children.
#[derive(Debug)]
pub struct Group {
    id: InstanceId,
    schema: GroupSchema,
    ctx: Arc<TreeContext>,
    children: Vec<Repetitions<Structure>>,
}

impl Group {
    pub fn new(schema: GroupSchema, ctx: &Arc<TreeContext>) -> Self {
        let children = (0..schema.len()).map(|_| Repetitions::new()).collect();
        Group {
            id: ctx.next_id(),
            schema,
            ctx: Arc::clone(ctx),
            children,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &GroupSchema {
        &self.schema
    }

    pub fn version(&self) -> &str {
        self.ctx.version()
    }

    fn index(&self, name: &str) -> Result<usize, NavError> {
        self.schema
            .index_of(name)
            .ok_or_else(|| Addr::name(self.schema.name(), name).unknown())
    }

    /// Repetition 0 of `name`, created if absent.
    pub fn get_structure(&mut self, name: &str) -> Result<&mut Structure, NavError> {
        self.get_structure_at(name, 0)
    }

    /// Repetition `rep` of `name`; missing repetitions up to `rep` are created in order.
    pub fn get_structure_at(&mut self, name: &str, rep: usize) -> Result<&mut Structure, NavError> {
        let i = self.index(name)?;
        child_at(&mut self.children[i], &self.schema, &self.ctx, i, rep)
    }

    /// Append a new repetition of `name` after the current last one.
    pub fn add_structure(&mut self, name: &str) -> Result<&mut Structure, NavError> {
        let i = self.index(name)?;
        let (schema, ctx) = (&self.schema, &self.ctx);
        let slot = &schema.slots()[i];
        let at = Addr::name(schema.name(), name);
        self.children[i].append(slot.cardinality(), &at, || build_child(ctx, schema.name(), slot))
    }

    /// Remove the repetition of `name` whose identity is `id`.
    pub fn remove_structure(&mut self, name: &str, id: InstanceId) -> Result<Structure, NavError> {
        let i = self.index(name)?;
        let at = Addr::name(self.schema.name(), name);
        self.children[i].remove_where(&at, &|| format!("instance {}", id), |s| s.id() == id)
    }

    /// Remove repetition `index` of `name`; later repetitions shift down.
    pub fn remove_repetition(&mut self, name: &str, index: usize) -> Result<Structure, NavError> {
        let i = self.index(name)?;
        let at = Addr::name(self.schema.name(), name);
        self.children[i].remove_at(index, &at)
    }

    /// Populated repetitions of `name`, in creation order; never creates.
    pub fn get_all(&self, name: &str) -> Result<&[Structure], NavError> {
        let i = self.index(name)?;
        Ok(self.children[i].as_slice())
    }

    pub fn repetitions_used(&self, name: &str) -> Result<usize, NavError> {
        let i = self.index(name)?;
        Ok(self.children[i].len())
    }

    /// Like [`get_structure_at`](Self::get_structure_at) for a slot holding segments.
    pub fn segment(&mut self, name: &str, rep: usize) -> Result<&mut Segment, NavError> {
        let i = self.expect_kind(name, StructureKind::Segment)?;
        match child_at(&mut self.children[i], &self.schema, &self.ctx, i, rep)? {
            Structure::Segment(s) => Ok(s),
            Structure::Group(_) => Err(Addr::name(self.schema.name(), name).kind_mismatch(StructureKind::Segment)),
        }
    }

    /// Like [`get_structure_at`](Self::get_structure_at) for a slot holding groups.
    pub fn group(&mut self, name: &str, rep: usize) -> Result<&mut Group, NavError> {
        let i = self.expect_kind(name, StructureKind::Group)?;
        match child_at(&mut self.children[i], &self.schema, &self.ctx, i, rep)? {
            Structure::Group(g) => Ok(g),
            Structure::Segment(_) => Err(Addr::name(self.schema.name(), name).kind_mismatch(StructureKind::Group)),
        }
    }

    /// Slot index of `name`, if that slot holds `kind`.
    fn expect_kind(&self, name: &str, kind: StructureKind) -> Result<usize, NavError> {
        let i = self.index(name)?;
        if self.schema.slots()[i].kind() != kind {
            return Err(Addr::name(self.schema.name(), name).kind_mismatch(kind));
        }
        Ok(i)
    }

    /// Slot names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.schema.slots().iter().map(StructureSlot::name)
    }

    pub fn slot(&self, name: &str) -> Option<&StructureSlot> {
        self.schema.slot(name)
    }

    /// Slots in declaration order, each with its populated repetitions.
    pub fn iter(&self) -> impl Iterator<Item = (&StructureSlot, &[Structure])> + '_ {
        self.schema
            .slots()
            .iter()
            .zip(self.children.iter().map(Repetitions::as_slice))
    }

    pub fn is_empty(&self) -> bool {
        self.children
            .iter()
            .all(|reps| reps.as_slice().iter().all(Structure::is_empty))
    }
}

/// Repetition `rep` of slot `i`, created on demand.
fn child_at<'a>(
    reps: &'a mut Repetitions<Structure>,
    schema: &GroupSchema,
    ctx: &Arc<TreeContext>,
    i: usize,
    rep: usize,
) -> Result<&'a mut Structure, NavError> {
    let slot = &schema.slots()[i];
    let at = Addr::name(schema.name(), slot.name());
    reps.get_or_create(rep, slot.cardinality(), &at, || build_child(ctx, schema.name(), slot))
}

fn build_child(ctx: &Arc<TreeContext>, owner: &str, slot: &StructureSlot) -> Result<Structure, NavError> {
    let built = slot.descriptor().build(ctx).and_then(|s| {
        if s.kind() == slot.kind() {
            Ok(s)
        } else {
            Err(BuildError::new(
                slot.descriptor().name(),
                format!("descriptor declared {} but built {}", slot.kind(), s.kind()),
            ))
        }
    });
    built.map_err(|e| {
        report_internal(
            ctx.reporter(),
            ctx.version(),
            owner,
            SlotKey::Name(slot.name().to_string()),
            e,
        )
    })
}

/// Root group of one HL7 transmission, tagged with its protocol version.
#[derive(Debug)]
pub struct Message {
    root: Group,
    ctx: Arc<TreeContext>,
}

impl Message {
    /// New, empty message; internal faults go to the `log` facade.
    pub fn new(schema: GroupSchema, version: &str) -> Self {
        Self::with_reporter(schema, version, Arc::new(LogReporter))
    }

    pub fn with_reporter(schema: GroupSchema, version: &str, reporter: Arc<dyn FaultReporter>) -> Self {
        let ctx = TreeContext::new(version, reporter);
        let root = Group::new(schema, &ctx);
        Message { root, ctx }
    }

    pub fn version(&self) -> &str {
        self.ctx.version()
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Group {
        &mut self.root
    }

    pub fn into_root(self) -> Group {
        self.root
    }
}

impl Deref for Message {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.root
    }
}

impl DerefMut for Message {
    fn deref_mut(&mut self) -> &mut Group {
        &mut self.root
    }
}
