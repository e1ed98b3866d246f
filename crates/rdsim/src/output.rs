//! Observer boundary: molecule snapshots and reaction records.
//!
//! Output writers live outside the kernel; the kernel only emits records
//! through the [`SimObserver`] trait. The in-memory collector is what the
//! test suite uses.

use glam::DVec3;

use crate::molecule::MoleculeId;
use crate::species::SpeciesId;

/// One molecule's state at a snapshot iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoleculeSnapshot {
    pub iteration: u64,
    pub molecule_id: MoleculeId,
    pub species_id: SpeciesId,
    pub pos: DVec3,
}

/// What kind of reaction produced a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionKind {
    Unimolecular,
    Bimolecular,
    SurfaceClass,
    Absorption,
}

/// One observed reaction.
#[derive(Clone, Debug)]
pub struct ReactionRecord {
    pub time: f64,
    pub kind: ReactionKind,
    pub reactants: Vec<MoleculeId>,
    pub products: Vec<MoleculeId>,
    pub pos: DVec3,
}

/// Sink for kernel observables.
pub trait SimObserver {
    /// Called at the configured cadence with every live molecule.
    fn viz_snapshot(&mut self, _iteration: u64, _molecules: &[MoleculeSnapshot]) {}

    /// Called once per observed reaction, in firing order.
    fn reaction(&mut self, _record: &ReactionRecord) {}
}

/// Collects everything in memory.
#[derive(Default)]
pub struct MemoryObserver {
    pub snapshots: Vec<MoleculeSnapshot>,
    pub reactions: Vec<ReactionRecord>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SimObserver for MemoryObserver {
    fn viz_snapshot(&mut self, _iteration: u64, molecules: &[MoleculeSnapshot]) {
        self.snapshots.extend_from_slice(molecules);
    }

    fn reaction(&mut self, record: &ReactionRecord) {
        self.reactions.push(record.clone());
    }
}

/// A shared handle can observe too; callers keep a clone to inspect what
/// was collected after the run.
impl SimObserver for std::rc::Rc<std::cell::RefCell<MemoryObserver>> {
    fn viz_snapshot(&mut self, iteration: u64, molecules: &[MoleculeSnapshot]) {
        self.borrow_mut().viz_snapshot(iteration, molecules);
    }

    fn reaction(&mut self, record: &ReactionRecord) {
        self.borrow_mut().reaction(record);
    }
}
