//! Runtime datatype values held in segment field repetitions.

use crate::datatype::TypeKind;
use std::sync::Arc;

/// One field repetition (or one component of a composite).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Primitive(Primitive),
    Composite(Composite),
}

/// Leaf value: a raw string, absent until set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    type_name: Arc<str>,
    table_id: Option<u32>,
    value: Option<String>,
}

impl Primitive {
    pub fn new(type_name: Arc<str>, table_id: Option<u32>) -> Self {
        Primitive {
            type_name,
            table_id,
            value: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table_id(&self) -> Option<u32> {
        self.table_id
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = Some(value.into());
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    pub fn is_empty(&self) -> bool {
        self.value.as_deref().map_or(true, str::is_empty)
    }
}

/// Ordered components; positions are 1-based like HL7 component numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    type_name: Arc<str>,
    table_id: Option<u32>,
    components: Vec<Value>,
}

impl Composite {
    pub fn new(type_name: Arc<str>, table_id: Option<u32>, components: Vec<Value>) -> Self {
        Composite {
            type_name,
            table_id,
            components,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table_id(&self) -> Option<u32> {
        self.table_id
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Value] {
        &self.components
    }

    pub fn component(&self, position: usize) -> Option<&Value> {
        position.checked_sub(1).and_then(|i| self.components.get(i))
    }

    pub fn component_mut(&mut self, position: usize) -> Option<&mut Value> {
        position
            .checked_sub(1)
            .and_then(move |i| self.components.get_mut(i))
    }

    pub fn is_empty(&self) -> bool {
        self.components.iter().all(Value::is_empty)
    }
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Value::Primitive(p) => p.type_name(),
            Value::Composite(c) => c.type_name(),
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Value::Primitive(_) => TypeKind::Primitive,
            Value::Composite(_) => TypeKind::Composite,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_primitive_mut(&mut self) -> Option<&mut Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Value::Composite(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut Composite> {
        match self {
            Value::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Raw text of a primitive. For a composite, the raw text of its first component,
    /// which is where unstructured text lands for a composite field.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Value::Primitive(p) => p.value(),
            Value::Composite(c) => c.component(1).and_then(Value::raw),
        }
    }

    /// Set raw text; on a composite this sets the first component.
    pub fn set_raw(&mut self, raw: impl Into<String>) {
        match self {
            Value::Primitive(p) => p.set_value(raw),
            Value::Composite(c) => {
                if let Some(first) = c.component_mut(1) {
                    first.set_raw(raw);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Primitive(p) => p.is_empty(),
            Value::Composite(c) => c.is_empty(),
        }
    }
}
