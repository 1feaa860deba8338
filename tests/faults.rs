//! Internal fault reporting: descriptors that fail to build, and what the reporter sees.

use hl7tree::datatype::{BuildContext, Component, TypeKind};
use hl7tree::fault::ReportedFault;
use hl7tree::structure::TreeContext;
use hl7tree::{
    BuildError, CompositeType, FieldSlot, GroupSchema, MemoryReporter, Message, NavError, PrimitiveType,
    SegmentSchema, SlotKey, Structure, StructureDescriptor, StructureKind, StructureSlot, TypeDescriptor, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds `ok` primitives, then fails every time after that.
#[derive(Debug)]
struct FailsAfter {
    ok: usize,
    built: AtomicUsize,
}

impl FailsAfter {
    fn new(ok: usize) -> Arc<Self> {
        Arc::new(FailsAfter {
            ok,
            built: AtomicUsize::new(0),
        })
    }
}

impl TypeDescriptor for FailsAfter {
    fn name(&self) -> &str {
        "FLAKY"
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Primitive
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Value, BuildError> {
        if self.built.fetch_add(1, Ordering::SeqCst) >= self.ok {
            return Err(BuildError::new("FLAKY", "out of instances"));
        }
        PrimitiveType::new("FLAKY").build(ctx)
    }
}

/// Remembers the owner and version of every build request.
#[derive(Debug, Default)]
struct Recording(Mutex<Vec<(String, String, Option<u32>)>>);

impl TypeDescriptor for Recording {
    fn name(&self) -> &str {
        "REC"
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Primitive
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Value, BuildError> {
        if let Ok(mut seen) = self.0.lock() {
            seen.push((ctx.owner.to_string(), ctx.version.to_string(), ctx.table_id));
        }
        PrimitiveType::new("REC").build(ctx)
    }
}

/// Structure descriptor that never builds.
#[derive(Debug)]
struct Unbuildable;

impl StructureDescriptor for Unbuildable {
    fn name(&self) -> &str {
        "ZUB"
    }

    fn kind(&self) -> StructureKind {
        StructureKind::Segment
    }

    fn build(&self, _ctx: &Arc<TreeContext>) -> Result<Structure, BuildError> {
        Err(BuildError::new("ZUB", "no such class"))
    }
}

/// Declares a segment but hands back a group.
#[derive(Debug)]
struct WrongKind(GroupSchema);

impl StructureDescriptor for WrongKind {
    fn name(&self) -> &str {
        "ZWK"
    }

    fn kind(&self) -> StructureKind {
        StructureKind::Segment
    }

    fn build(&self, ctx: &Arc<TreeContext>) -> Result<Structure, BuildError> {
        self.0.build(ctx)
    }
}

fn segment_with(datatype: hl7tree::TypeRef) -> SegmentSchema {
    let mut b = SegmentSchema::builder("ZFL");
    b.declare_field(FieldSlot::new(1, PrimitiveType::shared("ST")).required(true))
        .and_then(|b| b.declare_field(FieldSlot::new(2, datatype).max_reps(0).label("Flaky")))
        .expect("ZFL");
    b.build()
}

fn message_with(slots: Vec<StructureSlot>, reporter: Arc<MemoryReporter>) -> Message {
    let mut b = GroupSchema::builder("ZZZ_MSG");
    for slot in slots {
        b.declare_structure(slot).expect("declare");
    }
    Message::with_reporter(b.build(), "2.5", reporter)
}

#[test]
fn failing_datatype_is_reported_and_returned() {
    init_logger();
    let reporter = Arc::new(MemoryReporter::new());
    let seg = segment_with(FailsAfter::new(0));
    let mut msg = message_with(vec![StructureSlot::new(Arc::new(seg))], reporter.clone());

    let zfl = msg.segment("ZFL", 0).expect("segment builds");
    zfl.set_field_value(1, 0, "fine").expect("ST field");
    let err = zfl.get_field(2, 0).unwrap_err();
    assert!(!err.is_structural());
    match &err {
        NavError::InternalConstruction { owner, slot, source } => {
            assert_eq!(owner, "ZFL");
            assert_eq!(slot, &SlotKey::Position(2));
            assert_eq!(source.type_name, "FLAKY");
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(
        reporter.faults(),
        [ReportedFault {
            version: "2.5".to_string(),
            owner: "ZFL".to_string(),
            slot: SlotKey::Position(2),
            fault: BuildError::new("FLAKY", "out of instances"),
        }]
    );
    assert_eq!(zfl.repetitions_used(2).expect("used"), 0);
}

#[test]
fn partial_fill_keeps_built_repetitions() {
    init_logger();
    let reporter = Arc::new(MemoryReporter::new());
    let seg = segment_with(FailsAfter::new(2));
    let mut msg = message_with(vec![StructureSlot::new(Arc::new(seg))], reporter.clone());

    let zfl = msg.segment("ZFL", 0).expect("segment");
    let err = zfl.get_field(2, 4).unwrap_err();
    assert!(matches!(err, NavError::InternalConstruction { .. }));
    assert_eq!(zfl.repetitions_used(2).expect("used"), 2);
    assert_eq!(reporter.len(), 1);
}

#[test]
fn structural_faults_are_not_reported() {
    init_logger();
    let reporter = Arc::new(MemoryReporter::new());
    let seg = segment_with(PrimitiveType::shared("ST"));
    let mut msg = message_with(vec![StructureSlot::new(Arc::new(seg))], reporter.clone());

    assert!(matches!(msg.get_structure_at("ZFL", 1), Err(NavError::Cardinality { .. })));
    assert!(matches!(msg.get_structure("NOPE"), Err(NavError::UnknownSlot { .. })));
    let zfl = msg.segment("ZFL", 0).expect("segment");
    assert!(matches!(zfl.get_field(1, 1), Err(NavError::Cardinality { .. })));
    assert!(reporter.is_empty());
}

#[test]
fn failing_structure_descriptor() {
    init_logger();
    let reporter = Arc::new(MemoryReporter::new());
    let mut msg = message_with(vec![StructureSlot::new(Arc::new(Unbuildable)).repeating(true)], reporter.clone());

    let err = msg.get_structure_at("ZUB", 2).unwrap_err();
    assert_eq!(err.owner(), "ZZZ_MSG");
    assert_eq!(err.slot(), &SlotKey::Name("ZUB".to_string()));
    assert!(err.to_string().contains("no such class"), "{}", err);
    assert_eq!(msg.repetitions_used("ZUB").expect("used"), 0);

    let faults = reporter.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].owner, "ZZZ_MSG");
    assert_eq!(faults[0].fault.reason, "no such class");
}

#[test]
fn descriptor_building_the_wrong_kind() {
    init_logger();
    let reporter = Arc::new(MemoryReporter::new());
    let inner = GroupSchema::builder("ZWK").build();
    let mut msg = message_with(vec![StructureSlot::new(Arc::new(WrongKind(inner)))], reporter.clone());

    let err = msg.segment("ZWK", 0).unwrap_err();
    match err {
        NavError::InternalConstruction { source, .. } => {
            assert!(source.reason.contains("declared segment but built group"), "{}", source)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(reporter.len(), 1);
}

#[test]
fn composite_component_failure_names_the_component() {
    init_logger();
    let reporter = Arc::new(MemoryReporter::new());
    let broken: hl7tree::TypeRef = Arc::new(CompositeType::new(
        "ZCE",
        vec![
            Component::new("identifier", PrimitiveType::shared("ST")),
            Component::new("flaky", FailsAfter::new(0)),
        ],
    ));
    let seg = segment_with(broken);
    let mut msg = message_with(vec![StructureSlot::new(Arc::new(seg))], reporter.clone());

    let err = msg.segment("ZFL", 0).expect("segment").get_field(2, 0).unwrap_err();
    let NavError::InternalConstruction { source, .. } = err else {
        panic!("expected internal fault");
    };
    assert_eq!(source.type_name, "ZCE");
    assert!(source.reason.starts_with("component 2 (flaky)"), "{}", source.reason);
    assert_eq!(reporter.faults()[0].fault, source);
}

#[test]
fn default_reporter_still_returns_the_fault() {
    init_logger();
    let seg = segment_with(FailsAfter::new(0));
    let mut b = GroupSchema::builder("ZZZ_MSG");
    b.declare_structure(StructureSlot::new(Arc::new(seg))).expect("declare");
    let mut msg = Message::new(b.build(), "2.3");
    let err = msg.segment("ZFL", 0).expect("segment").get_field(2, 0).unwrap_err();
    assert!(matches!(err, NavError::InternalConstruction { .. }));
    // Other slots stay usable after an internal fault.
    msg.segment("ZFL", 0)
        .expect("segment")
        .set_field_value(1, 0, "ok")
        .expect("field 1");
}

#[test]
fn descriptors_see_owner_and_version() {
    init_logger();
    let rec = Arc::new(Recording::default());
    let nested: hl7tree::TypeRef = Arc::new(CompositeType::new(
        "ZCE",
        vec![Component::new("coded", rec.clone()).with_table(99)],
    ));
    let mut b = SegmentSchema::builder("ZRC");
    b.declare_field(FieldSlot::new(1, rec.clone()).table(7))
        .and_then(|b| b.declare_field(FieldSlot::new(2, nested)))
        .expect("ZRC");
    let mut msg = message_with(vec![StructureSlot::new(Arc::new(b.build()))], Arc::new(MemoryReporter::new()));

    let zrc = msg.segment("ZRC", 0).expect("segment");
    zrc.get_field(1, 0).expect("field 1");
    zrc.get_field(2, 0).expect("field 2");
    let seen = rec.0.lock().expect("lock").clone();
    assert_eq!(
        seen,
        [
            ("ZRC".to_string(), "2.5".to_string(), Some(7)),
            ("ZRC".to_string(), "2.5".to_string(), Some(99)),
        ]
    );
}
