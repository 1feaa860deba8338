//! Navigation faults and the injected fault reporter.
//!
//! Two classes of failure leave the engine:
//!
//! - **Structural** faults ([`NavError::UnknownSlot`], [`NavError::Cardinality`],
//!   [`NavError::RepetitionGap`], [`NavError::NotFound`], [`NavError::KindMismatch`]):
//!   the caller addressed something the slot tables do not allow or that is not there.
//!   A parser typically recovers from these (e.g. a segment is simply absent).
//! - **Internal** faults ([`NavError::InternalConstruction`]): a type or structure
//!   descriptor failed to build an instance. That is a schema defect, so it is reported
//!   through the tree's [`FaultReporter`] before being returned.

use crate::datatype::BuildError;
use crate::slot::StructureKind;
use std::fmt;
use std::sync::Mutex;

/// Address of a slot inside its owner: a structure name or a field position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    Name(String),
    Position(usize),
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Name(n) => write!(f, "{}", n),
            SlotKey::Position(p) => write!(f, "field {}", p),
        }
    }
}

/// Error returned by every navigation operation on a segment, group or message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavError {
    #[error("{owner}: unknown slot {slot}")]
    UnknownSlot { owner: String, slot: SlotKey },
    #[error("{owner} {slot}: repetition {rep} exceeds max repetitions {max}")]
    Cardinality {
        owner: String,
        slot: SlotKey,
        rep: usize,
        max: usize,
    },
    #[error("{owner} {slot}: repetition {rep} requested but only {used} present (auto-fill disabled)")]
    RepetitionGap {
        owner: String,
        slot: SlotKey,
        rep: usize,
        used: usize,
    },
    #[error("{owner} {slot}: {target} not found")]
    NotFound {
        owner: String,
        slot: SlotKey,
        target: String,
    },
    #[error("{owner} {slot}: slot does not hold a {expected}")]
    KindMismatch {
        owner: String,
        slot: SlotKey,
        expected: StructureKind,
    },
    #[error("{owner} {slot}: internal construction fault: {source}")]
    InternalConstruction {
        owner: String,
        slot: SlotKey,
        source: BuildError,
    },
}

impl NavError {
    /// True for faults caused by how the tree was addressed; false for schema defects.
    pub fn is_structural(&self) -> bool {
        !matches!(self, NavError::InternalConstruction { .. })
    }

    pub fn owner(&self) -> &str {
        match self {
            NavError::UnknownSlot { owner, .. }
            | NavError::Cardinality { owner, .. }
            | NavError::RepetitionGap { owner, .. }
            | NavError::NotFound { owner, .. }
            | NavError::KindMismatch { owner, .. }
            | NavError::InternalConstruction { owner, .. } => owner,
        }
    }

    pub fn slot(&self) -> &SlotKey {
        match self {
            NavError::UnknownSlot { slot, .. }
            | NavError::Cardinality { slot, .. }
            | NavError::RepetitionGap { slot, .. }
            | NavError::NotFound { slot, .. }
            | NavError::KindMismatch { slot, .. }
            | NavError::InternalConstruction { slot, .. } => slot,
        }
    }
}

/// Where an internal fault happened.
#[derive(Debug, Clone, Copy)]
pub struct FaultContext<'a> {
    pub version: &'a str,
    pub owner: &'a str,
    pub slot: &'a SlotKey,
}

/// Logging capability handed to every message tree.
///
/// Only internal faults go through here; structural faults are the caller's business.
pub trait FaultReporter: fmt::Debug + Send + Sync {
    fn internal_fault(&self, ctx: &FaultContext<'_>, fault: &BuildError);
}

/// Forwards internal faults to the `log` facade at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl FaultReporter for LogReporter {
    fn internal_fault(&self, ctx: &FaultContext<'_>, fault: &BuildError) {
        log::error!(
            target: "hl7tree::fault",
            "v{} {} {}: failed to construct instance: {}",
            ctx.version,
            ctx.owner,
            ctx.slot,
            fault
        );
    }
}

/// One fault captured by [`MemoryReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFault {
    pub version: String,
    pub owner: String,
    pub slot: SlotKey,
    pub fault: BuildError,
}

/// Keeps internal faults in memory (tests, diagnostics endpoints).
#[derive(Debug, Default)]
pub struct MemoryReporter {
    faults: Mutex<Vec<ReportedFault>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the faults reported so far, oldest first.
    pub fn faults(&self) -> Vec<ReportedFault> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FaultReporter for MemoryReporter {
    fn internal_fault(&self, ctx: &FaultContext<'_>, fault: &BuildError) {
        log::debug!(target: "hl7tree::fault", "recording fault at {} {}", ctx.owner, ctx.slot);
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(ReportedFault {
                version: ctx.version.to_string(),
                owner: ctx.owner.to_string(),
                slot: ctx.slot.clone(),
                fault: fault.clone(),
            });
    }
}

/// Report an internal fault, then turn it into the error handed back to the caller.
pub(crate) fn report_internal(
    reporter: &dyn FaultReporter,
    version: &str,
    owner: &str,
    slot: SlotKey,
    fault: BuildError,
) -> NavError {
    reporter.internal_fault(
        &FaultContext {
            version,
            owner,
            slot: &slot,
        },
        &fault,
    );
    NavError::InternalConstruction {
        owner: owner.to_string(),
        slot,
        source: fault,
    }
}
