//! Type descriptors: how a field slot builds its value.
//!
//! A descriptor is stateless and shared (`Arc`) between every slot that uses the type.
//! The engine never looks inside a value; it only asks the descriptor for a fresh,
//! empty instance when a repetition is created.

use crate::value::{Composite, Primitive, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Primitive,
    Composite,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Primitive => f.write_str("primitive"),
            TypeKind::Composite => f.write_str("composite"),
        }
    }
}

/// Arguments available to a descriptor when it builds an instance.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Version tag of the message that will own the value.
    pub version: &'a str,
    /// Segment that owns the field slot.
    pub owner: &'a str,
    /// Coding table declared on the slot (or component), if any.
    pub table_id: Option<u32>,
}

/// A descriptor could not produce an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{type_name}: {reason}")]
pub struct BuildError {
    pub type_name: String,
    pub reason: String,
}

impl BuildError {
    pub fn new(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        BuildError {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

pub trait TypeDescriptor: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> TypeKind;
    fn build(&self, ctx: &BuildContext<'_>) -> Result<Value, BuildError>;
}

/// Shared handle to a type descriptor, as stored in slot tables.
pub type TypeRef = Arc<dyn TypeDescriptor>;

/// A leaf type holding one raw string (ST, ID, NM, TS, ...).
#[derive(Debug, Clone)]
pub struct PrimitiveType {
    name: Arc<str>,
}

impl PrimitiveType {
    pub fn new(name: &str) -> Self {
        PrimitiveType { name: Arc::from(name) }
    }

    pub fn shared(name: &str) -> TypeRef {
        Arc::new(Self::new(name))
    }
}

impl TypeDescriptor for PrimitiveType {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Primitive
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Value, BuildError> {
        Ok(Value::Primitive(Primitive::new(self.name.clone(), ctx.table_id)))
    }
}

/// One ordered component of a composite type.
#[derive(Debug, Clone)]
pub struct Component {
    pub label: String,
    pub datatype: TypeRef,
    pub table_id: Option<u32>,
}

impl Component {
    pub fn new(label: impl Into<String>, datatype: TypeRef) -> Self {
        Component {
            label: label.into(),
            datatype,
            table_id: None,
        }
    }

    pub fn with_table(mut self, table_id: u32) -> Self {
        self.table_id = Some(table_id);
        self
    }
}

/// A type made of ordered components (CE, CX, XPN, ...); components may be composite too.
#[derive(Debug, Clone)]
pub struct CompositeType {
    name: Arc<str>,
    components: Vec<Component>,
}

impl CompositeType {
    pub fn new(name: &str, components: Vec<Component>) -> Self {
        CompositeType {
            name: Arc::from(name),
            components,
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }
}

impl TypeDescriptor for CompositeType {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Composite
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Value, BuildError> {
        let mut values = Vec::with_capacity(self.components.len());
        for (i, c) in self.components.iter().enumerate() {
            let sub = BuildContext {
                version: ctx.version,
                owner: ctx.owner,
                table_id: c.table_id,
            };
            let v = c.datatype.build(&sub).map_err(|e| {
                BuildError::new(
                    self.name.as_ref(),
                    format!("component {} ({}): {}", i + 1, c.label, e),
                )
            })?;
            values.push(v);
        }
        Ok(Value::Composite(Composite::new(
            self.name.clone(),
            ctx.table_id,
            values,
        )))
    }
}
