//! Repetition addressing shared by field slots (segments) and structure slots (groups).
//!
//! Every slot owns a [`Repetitions`] list. The list keeps indices contiguous from 0:
//! addressing index `n` when only `k <= n` exist creates the missing ones in order
//! (unless the slot is strict), and removal shifts later repetitions down.

use crate::fault::{NavError, SlotKey};
use crate::slot::{MaxReps, StructureKind};

/// Bounds and fill policy of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub max: MaxReps,
    /// Create missing intermediate repetitions when addressing past the end.
    pub auto_fill: bool,
}

impl Cardinality {
    /// Fails with a cardinality fault when `rep` is past the declared maximum.
    pub(crate) fn check(&self, rep: usize, at: &Addr<'_>) -> Result<(), NavError> {
        match self.max {
            MaxReps::Limit(max) if !self.max.allows(rep) => Err(at.cardinality(rep, max)),
            _ => Ok(()),
        }
    }
}

/// Borrowed slot address, turned into an owned [`SlotKey`] only when a fault is raised.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotRef<'a> {
    Name(&'a str),
    Position(usize),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Addr<'a> {
    pub owner: &'a str,
    pub slot: SlotRef<'a>,
}

impl<'a> Addr<'a> {
    pub fn name(owner: &'a str, name: &'a str) -> Self {
        Addr {
            owner,
            slot: SlotRef::Name(name),
        }
    }

    pub fn position(owner: &'a str, position: usize) -> Self {
        Addr {
            owner,
            slot: SlotRef::Position(position),
        }
    }

    pub fn key(&self) -> SlotKey {
        match self.slot {
            SlotRef::Name(n) => SlotKey::Name(n.to_string()),
            SlotRef::Position(p) => SlotKey::Position(p),
        }
    }

    pub fn unknown(&self) -> NavError {
        log::debug!("{}: unknown slot {}", self.owner, self.key());
        NavError::UnknownSlot {
            owner: self.owner.to_string(),
            slot: self.key(),
        }
    }

    pub fn cardinality(&self, rep: usize, max: usize) -> NavError {
        log::debug!("{} {}: repetition {} over max {}", self.owner, self.key(), rep, max);
        NavError::Cardinality {
            owner: self.owner.to_string(),
            slot: self.key(),
            rep,
            max,
        }
    }

    pub fn gap(&self, rep: usize, used: usize) -> NavError {
        log::debug!("{} {}: gap at repetition {} ({} used)", self.owner, self.key(), rep, used);
        NavError::RepetitionGap {
            owner: self.owner.to_string(),
            slot: self.key(),
            rep,
            used,
        }
    }

    pub fn not_found(&self, target: String) -> NavError {
        log::debug!("{} {}: {} not found", self.owner, self.key(), target);
        NavError::NotFound {
            owner: self.owner.to_string(),
            slot: self.key(),
            target,
        }
    }

    pub fn kind_mismatch(&self, expected: StructureKind) -> NavError {
        NavError::KindMismatch {
            owner: self.owner.to_string(),
            slot: self.key(),
            expected,
        }
    }
}

/// The populated repetitions of one slot, in creation order.
#[derive(Debug, Clone)]
pub(crate) struct Repetitions<T> {
    items: Vec<T>,
}

impl<T> Default for Repetitions<T> {
    fn default() -> Self {
        Repetitions { items: Vec::new() }
    }
}

impl<T> Repetitions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, rep: usize) -> Option<&T> {
        self.items.get(rep)
    }

    /// Repetition `rep`, creating it (and any missing ones before it) with `make`.
    pub fn get_or_create<F>(
        &mut self,
        rep: usize,
        card: Cardinality,
        at: &Addr<'_>,
        mut make: F,
    ) -> Result<&mut T, NavError>
    where
        F: FnMut() -> Result<T, NavError>,
    {
        card.check(rep, at)?;
        if rep > self.items.len() && !card.auto_fill {
            return Err(at.gap(rep, self.items.len()));
        }
        while self.items.len() <= rep {
            let item = make()?;
            self.items.push(item);
        }
        Ok(&mut self.items[rep])
    }

    /// Append a new repetition after the current last one.
    pub fn append<F>(&mut self, card: Cardinality, at: &Addr<'_>, make: F) -> Result<&mut T, NavError>
    where
        F: FnOnce() -> Result<T, NavError>,
    {
        card.check(self.items.len(), at)?;
        let item = make()?;
        self.items.push(item);
        let last = self.items.len() - 1;
        Ok(&mut self.items[last])
    }

    /// Remove repetition `index`; later repetitions shift down by one.
    pub fn remove_at(&mut self, index: usize, at: &Addr<'_>) -> Result<T, NavError> {
        if index >= self.items.len() {
            return Err(at.not_found(format!("repetition {}", index)));
        }
        Ok(self.items.remove(index))
    }

    /// Remove the first repetition matching `pred`; later repetitions shift down by one.
    pub fn remove_where<P>(&mut self, at: &Addr<'_>, target: &dyn Fn() -> String, pred: P) -> Result<T, NavError>
    where
        P: FnMut(&T) -> bool,
    {
        match self.items.iter().position(pred) {
            Some(i) => Ok(self.items.remove(i)),
            None => Err(at.not_found(target())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: Cardinality = Cardinality {
        max: MaxReps::Limit(1),
        auto_fill: true,
    };
    const MANY: Cardinality = Cardinality {
        max: MaxReps::Unbounded,
        auto_fill: true,
    };
    const STRICT: Cardinality = Cardinality {
        max: MaxReps::Unbounded,
        auto_fill: false,
    };

    fn counter() -> impl FnMut() -> Result<u32, NavError> {
        let mut n = 0;
        move || {
            n += 1;
            Ok(n)
        }
    }

    #[test]
    fn get_or_create_fills_gaps_in_order() {
        let at = Addr::name("G", "S");
        let mut reps = Repetitions::new();
        let v = *reps.get_or_create(3, MANY, &at, counter()).expect("create");
        assert_eq!(v, 4);
        assert_eq!(reps.as_slice(), &[1u32, 2, 3, 4]);
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let at = Addr::name("G", "S");
        let mut reps = Repetitions::new();
        let mut make = counter();
        assert_eq!(*reps.get_or_create(0, ONE, &at, &mut make).expect("first"), 1);
        assert_eq!(*reps.get_or_create(0, ONE, &at, &mut make).expect("second"), 1);
        assert_eq!(reps.len(), 1);
    }

    #[test]
    fn non_repeating_rejects_second_repetition() {
        let at = Addr::position("PID", 1);
        let mut reps: Repetitions<u32> = Repetitions::new();
        let err = reps.get_or_create(1, ONE, &at, counter()).unwrap_err();
        assert!(matches!(err, NavError::Cardinality { rep: 1, max: 1, .. }));
        assert_eq!(reps.len(), 0);
        reps.append(ONE, &at, || Ok(7)).expect("append first");
        let err = reps.append(ONE, &at, || Ok(8)).unwrap_err();
        assert!(matches!(err, NavError::Cardinality { rep: 1, .. }));
    }

    #[test]
    fn bounded_slot_fills_up_to_its_limit() {
        let three = Cardinality {
            max: MaxReps::Limit(3),
            auto_fill: true,
        };
        let at = Addr::position("OBX", 5);
        let mut reps = Repetitions::new();
        let mut make = counter();
        assert_eq!(*reps.get_or_create(2, three, &at, &mut make).expect("fill"), 3);
        let err = reps.get_or_create(3, three, &at, &mut make).unwrap_err();
        assert!(matches!(err, NavError::Cardinality { rep: 3, max: 3, .. }), "{}", err);
        let err = reps.append(three, &at, &mut make).unwrap_err();
        assert!(matches!(err, NavError::Cardinality { rep: 3, max: 3, .. }), "{}", err);
        assert_eq!(reps.as_slice(), &[1u32, 2, 3]);
        assert!(three.check(2, &at).is_ok());
        assert!(MANY.check(10_000, &at).is_ok());
    }

    #[test]
    fn strict_slot_rejects_gap_but_allows_next() {
        let at = Addr::name("G", "S");
        let mut reps = Repetitions::new();
        let err = reps.get_or_create(2, STRICT, &at, counter()).unwrap_err();
        assert!(matches!(err, NavError::RepetitionGap { rep: 2, used: 0, .. }));
        let mut make = counter();
        reps.get_or_create(0, STRICT, &at, &mut make).expect("0");
        reps.get_or_create(1, STRICT, &at, &mut make).expect("1");
        assert_eq!(reps.len(), 2);
    }

    #[test]
    fn removal_shifts_down() {
        let at = Addr::name("G", "S");
        let mut reps = Repetitions::new();
        reps.get_or_create(2, MANY, &at, counter()).expect("fill");
        assert_eq!(reps.remove_at(1, &at).expect("remove"), 2);
        assert_eq!(reps.as_slice(), &[1u32, 3]);
        let err = reps.remove_at(2, &at).unwrap_err();
        assert!(matches!(err, NavError::NotFound { .. }));
        let removed = reps
            .remove_where(&at, &|| "three".to_string(), |v| *v == 3)
            .expect("by value");
        assert_eq!(removed, 3);
        let err = reps
            .remove_where(&at, &|| "nine".to_string(), |v| *v == 9)
            .unwrap_err();
        assert_eq!(err.to_string(), "G S: nine not found");
    }

    #[test]
    fn failed_make_keeps_what_was_built() {
        let at = Addr::name("G", "S");
        let mut reps = Repetitions::new();
        let mut n = 0;
        let err = reps
            .get_or_create(3, MANY, &at, || {
                n += 1;
                if n == 3 {
                    Err(at.unknown())
                } else {
                    Ok(n)
                }
            })
            .unwrap_err();
        assert!(matches!(err, NavError::UnknownSlot { .. }));
        assert_eq!(reps.as_slice(), &[1u32, 2]);
    }
}
