//! Per-version schema registry and the catalog of all loaded versions.
//!
//! A [`SchemaRegistry`] turns one resolved schema into shared slot tables: datatypes are
//! built first, then segments, then groups (nested groups before their parents), then
//! messages. Everything is immutable once registered.

use crate::ast::{DatatypeKind, GroupSection, ResolvedSchema, SegmentSection, Target};
use crate::datatype::{Component, CompositeType, PrimitiveType, TypeRef};
use crate::fault::FaultReporter;
use crate::parser;
use crate::slot::{FieldSlot, GroupSchema, SchemaError, SegmentSchema, StructureSlot};
use crate::structure::{Message, StructureDescriptor};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Slot tables and datatypes of one protocol version.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: String,
    datatypes: BTreeMap<String, TypeRef>,
    segments: BTreeMap<String, SegmentSchema>,
    groups: BTreeMap<String, GroupSchema>,
    messages: BTreeMap<String, GroupSchema>,
}

impl SchemaRegistry {
    /// Empty registry, for declaring tables programmatically.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            datatypes: BTreeMap::new(),
            segments: BTreeMap::new(),
            groups: BTreeMap::new(),
            messages: BTreeMap::new(),
        }
    }

    /// Parse, resolve and build a schema from DSL source.
    pub fn load(source: &str) -> Result<Self, SchemaError> {
        let schema = parser::parse(source)?;
        let resolved = ResolvedSchema::resolve(schema)?;
        Self::from_resolved(&resolved)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        log::debug!("loading schema {}", path.display());
        Self::load(&source)
    }

    pub fn from_resolved(resolved: &ResolvedSchema) -> Result<Self, SchemaError> {
        let mut reg = Self::new(resolved.version.clone());
        let schema = &resolved.schema;

        for &i in &resolved.datatype_order {
            let d = &schema.datatypes[i];
            let datatype: TypeRef = match &d.kind {
                DatatypeKind::Primitive => PrimitiveType::shared(&d.name),
                DatatypeKind::Composite(decls) => {
                    let mut components = Vec::with_capacity(decls.len());
                    for c in decls {
                        let mut component = Component::new(c.name.as_str(), reg.datatype_ref(&c.type_name)?);
                        if let Some(t) = c.table_id {
                            component = component.with_table(t);
                        }
                        components.push(component);
                    }
                    Arc::new(CompositeType::new(&d.name, components))
                }
            };
            reg.register_datatype(datatype)?;
        }

        for s in &schema.segments {
            let table = reg.build_segment(s)?;
            reg.register_segment(table)?;
        }
        for &i in &resolved.group_order {
            let table = reg.build_group(resolved, &schema.groups[i])?;
            reg.register_group(table)?;
        }
        for m in &schema.messages {
            let table = reg.build_group(resolved, m)?;
            reg.register_message(table)?;
        }

        log::debug!(
            "schema {}: {} datatypes, {} segments, {} groups, {} messages",
            reg.version,
            reg.datatypes.len(),
            reg.segments.len(),
            reg.groups.len(),
            reg.messages.len()
        );
        Ok(reg)
    }

    fn build_segment(&self, s: &SegmentSection) -> Result<SegmentSchema, SchemaError> {
        let mut builder = SegmentSchema::builder(s.name.as_str());
        for f in &s.fields {
            let mut slot = FieldSlot::new(f.position, self.datatype_ref(&f.type_name)?)
                .required(f.required)
                .max_reps(f.max_reps)
                .max_length(f.max_length);
            if let Some(t) = f.table_id {
                slot = slot.table(t);
            }
            if let Some(label) = &f.label {
                slot = slot.label(label.as_str());
            }
            if f.strict {
                slot = slot.strict();
            }
            builder.declare_field(slot)?;
        }
        Ok(builder.build())
    }

    fn build_group(&self, resolved: &ResolvedSchema, g: &GroupSection) -> Result<GroupSchema, SchemaError> {
        let mut builder = GroupSchema::builder(g.name.as_str());
        for c in &g.children {
            let descriptor: Arc<dyn StructureDescriptor> = match resolved.target(&c.target) {
                Some(Target::Segment(_)) => Arc::new(self.segment_or_err(&c.target)?.clone()),
                Some(Target::Group(_)) => Arc::new(self.group_or_err(&c.target)?.clone()),
                None => return Err(SchemaError::UnknownReference(format!("{}: structure {}", g.name, c.target))),
            };
            let mut slot = StructureSlot::named(c.slot_name(), descriptor)
                .required(c.required)
                .repeating(c.repeating);
            if c.strict {
                slot = slot.strict();
            }
            builder.declare_structure(slot)?;
        }
        Ok(builder.build())
    }

    fn datatype_ref(&self, name: &str) -> Result<TypeRef, SchemaError> {
        self.datatypes
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownReference(format!("datatype {}", name)))
    }

    fn segment_or_err(&self, name: &str) -> Result<&SegmentSchema, SchemaError> {
        self.segments
            .get(name)
            .ok_or_else(|| SchemaError::UnknownReference(format!("segment {}", name)))
    }

    fn group_or_err(&self, name: &str) -> Result<&GroupSchema, SchemaError> {
        self.groups
            .get(name)
            .ok_or_else(|| SchemaError::UnknownReference(format!("group {}", name)))
    }

    pub fn register_datatype(&mut self, datatype: TypeRef) -> Result<(), SchemaError> {
        let name = datatype.name().to_string();
        insert_unique(&mut self.datatypes, name, datatype)
    }

    pub fn register_segment(&mut self, segment: SegmentSchema) -> Result<(), SchemaError> {
        self.check_structure_name(segment.name())?;
        insert_unique(&mut self.segments, segment.name().to_string(), segment)
    }

    pub fn register_group(&mut self, group: GroupSchema) -> Result<(), SchemaError> {
        self.check_structure_name(group.name())?;
        insert_unique(&mut self.groups, group.name().to_string(), group)
    }

    pub fn register_message(&mut self, message: GroupSchema) -> Result<(), SchemaError> {
        self.check_structure_name(message.name())?;
        insert_unique(&mut self.messages, message.name().to_string(), message)
    }

    fn check_structure_name(&self, name: &str) -> Result<(), SchemaError> {
        if self.segments.contains_key(name) || self.groups.contains_key(name) || self.messages.contains_key(name) {
            return Err(SchemaError::DuplicateDeclaration(name.to_string()));
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn datatype(&self, name: &str) -> Option<&TypeRef> {
        self.datatypes.get(name)
    }

    pub fn segment(&self, name: &str) -> Option<&SegmentSchema> {
        self.segments.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&GroupSchema> {
        self.groups.get(name)
    }

    pub fn message(&self, name: &str) -> Option<&GroupSchema> {
        self.messages.get(name)
    }

    pub fn datatypes(&self) -> impl Iterator<Item = &TypeRef> + '_ {
        self.datatypes.values()
    }

    /// Segments in name order.
    pub fn segments(&self) -> impl Iterator<Item = &SegmentSchema> + '_ {
        self.segments.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupSchema> + '_ {
        self.groups.values()
    }

    pub fn messages(&self) -> impl Iterator<Item = &GroupSchema> + '_ {
        self.messages.values()
    }

    /// New, empty message of structure `name`, tagged with this registry's version.
    pub fn new_message(&self, name: &str) -> Result<Message, SchemaError> {
        let schema = self.message_or_err(name)?;
        Ok(Message::new(schema.clone(), &self.version))
    }

    pub fn new_message_with_reporter(
        &self,
        name: &str,
        reporter: Arc<dyn FaultReporter>,
    ) -> Result<Message, SchemaError> {
        let schema = self.message_or_err(name)?;
        Ok(Message::with_reporter(schema.clone(), &self.version, reporter))
    }

    fn message_or_err(&self, name: &str) -> Result<&GroupSchema, SchemaError> {
        self.messages
            .get(name)
            .ok_or_else(|| SchemaError::NotFound(format!("message {} in version {}", name, self.version)))
    }
}

fn insert_unique<V>(map: &mut BTreeMap<String, V>, name: String, value: V) -> Result<(), SchemaError> {
    if map.contains_key(&name) {
        return Err(SchemaError::DuplicateDeclaration(name));
    }
    map.insert(name, value);
    Ok(())
}

/// All loaded versions, keyed by version tag.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    versions: HashMap<String, Arc<SchemaRegistry>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registry; a second registry for the same version is rejected.
    pub fn insert(&mut self, registry: SchemaRegistry) -> Result<Arc<SchemaRegistry>, SchemaError> {
        let version = registry.version().to_string();
        if self.versions.contains_key(&version) {
            return Err(SchemaError::DuplicateDeclaration(format!("version {}", version)));
        }
        let registry = Arc::new(registry);
        self.versions.insert(version, Arc::clone(&registry));
        Ok(registry)
    }

    /// Load a DSL source and add it under the version it declares.
    pub fn load(&mut self, source: &str) -> Result<Arc<SchemaRegistry>, SchemaError> {
        self.insert(SchemaRegistry::load(source)?)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<SchemaRegistry>, SchemaError> {
        self.insert(SchemaRegistry::load_file(path)?)
    }

    pub fn get(&self, version: &str) -> Option<&Arc<SchemaRegistry>> {
        self.versions.get(version)
    }

    /// Loaded version tags, sorted.
    pub fn versions(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.versions.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    pub fn new_message(&self, version: &str, name: &str) -> Result<Message, SchemaError> {
        self.versions
            .get(version)
            .ok_or_else(|| SchemaError::NotFound(format!("version {}", version)))?
            .new_message(name)
    }
}
