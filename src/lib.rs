//! # hl7tree: hierarchical message structure engine for HL7 v2.x
//!
//! One runtime engine represents any HL7 v2.x message as a tree of named,
//! cardinality-constrained structures (segments and groups) and positioned fields. The
//! layout of each segment, group and message class lives in immutable slot tables; the
//! per-version schemas that fill those tables are plain data, written in a small DSL.
//!
//! ## Schema DSL
//!
//! - `version "2.5";` tags every message built from the schema
//! - `primitive ST;` and `composite CE { identifier: ST; system: ID table(396); }`
//! - `segment PID { 1: ST required len(4) "Set ID"; 2: CX repeating; }`; positions run
//!   1, 2, 3, ... with attributes `required`, `optional`, `repeating`, `reps(n)`, `len(n)`,
//!   `table(n)`, `strict`
//! - `group` / `message` list child structures in wire order, optionally aliased:
//!   `NEXT_OF_KIN: PATIENT repeating;`
//!
//! ## Example
//!
//! ```text
//! version "2.5";
//! primitive ST;
//! segment MSH { 1: ST required; 2: ST required; }
//! segment NK1 { 1: ST; 2: ST repeating "Name"; }
//! message ADT_A01 { MSH required; NK1 repeating; }
//! ```
//!
//! ```ignore
//! let reg = hl7tree::SchemaRegistry::load(src)?;
//! let mut msg = reg.new_message("ADT_A01")?;
//! msg.segment("NK1", 1)?.set_field_value(2, 0, "Smith")?;
//! assert_eq!(msg.repetitions_used("NK1")?, 2);
//! ```
//!
//! ## Navigation
//!
//! Addressing an absent repetition creates it (and any missing earlier ones) unless the
//! slot is `strict`. Every failure is a [`NavError`]: structural faults (unknown slot,
//! cardinality, repetition gap, not found, kind mismatch) go back to the caller; a
//! descriptor that fails to build an instance is reported through the message's
//! [`FaultReporter`] first.

pub mod ast;
pub mod datatype;
pub mod dump;
pub mod fault;
pub mod navigate;
pub mod parser;
pub mod registry;
pub mod slot;
pub mod structure;
pub mod validate;
pub mod value;
pub mod walk;

pub use ast::{ResolvedSchema, Schema};
pub use datatype::{BuildError, CompositeType, PrimitiveType, TypeDescriptor, TypeKind, TypeRef};
pub use fault::{FaultReporter, LogReporter, MemoryReporter, NavError, SlotKey};
pub use parser::parse;
pub use registry::{ModelCatalog, SchemaRegistry};
pub use slot::{FieldSlot, GroupSchema, MaxReps, SchemaError, SegmentSchema, StructureKind, StructureSlot};
pub use structure::{Group, InstanceId, Message, Segment, Structure, StructureDescriptor, TreeContext};
pub use validate::{validate_message, Finding, MapTableLookup, TableLookup};
pub use value::Value;
