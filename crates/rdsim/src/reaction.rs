//! Reaction classes and the reaction catalogue.
//!
//! A reaction class groups the pathways sharing one ordered reactant tuple.
//! Each class precomputes the cumulative pathway probabilities used for
//! binary-search pathway selection, the first pathway probability
//! (`min_noreaction_p`) and the total (`max_fixed_p`). The catalogue is
//! read-only during an event; variable-rate schedules are applied between
//! events.

use rustc_hash::FxHashMap;

use crate::error::SimError;
use crate::species::{SpeciesId, ALL_MOLECULES, ALL_SURFACE_MOLECULES, ALL_VOLUME_MOLECULES};

pub type RxnClassId = usize;

/// Behavior class of a reaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxnType {
    /// Reactants are consumed and products placed.
    Standard,
    /// The wall or region border lets the molecule through.
    Transparent,
    /// The wall or region border reflects the molecule.
    Reflect,
    /// A surface molecule crossing the region border is absorbed.
    AbsorbRegionBorder,
}

/// One product of a pathway: species plus wall-side orientation
/// (+1 front, -1 back, 0 volume/any).
#[derive(Clone, Copy, Debug)]
pub struct Product {
    pub species_id: SpeciesId,
    pub orientation: i8,
}

/// One outcome of a reaction class.
#[derive(Clone, Debug)]
pub struct Pathway {
    pub products: Vec<Product>,
    pub probability: f64,
}

/// A reaction class: the pathways sharing one reactant tuple.
#[derive(Clone, Debug)]
pub struct RxnClass {
    pub id: RxnClassId,
    /// Ordered reactant tuple; unimolecular classes have no second
    /// reactant. The second slot may hold a reserved wildcard id for
    /// surface-class reactions.
    pub reactants: (SpeciesId, Option<SpeciesId>),
    pub rxn_type: RxnType,
    pub pathways: Vec<Pathway>,
    /// Cumulative pathway probabilities; non-decreasing, last element equals
    /// `max_fixed_p`.
    pub cum_probs: Vec<f64>,
    /// First pathway probability.
    pub min_noreaction_p: f64,
    /// Total probability over all pathways.
    pub max_fixed_p: f64,
    /// Increasing (time, rate) schedule replacing the class rate; empty for
    /// fixed-rate classes.
    pub variable_rates: Vec<(f64, f64)>,
    next_variable_rate: usize,
}

impl RxnClass {
    pub fn new(
        id: RxnClassId,
        reactants: (SpeciesId, Option<SpeciesId>),
        rxn_type: RxnType,
        pathways: Vec<Pathway>,
    ) -> Result<Self, SimError> {
        if pathways.is_empty() {
            return Err(SimError::config("reaction class with no pathways"));
        }
        if pathways.iter().any(|p| p.probability < 0.0) {
            return Err(SimError::config("negative reaction probability"));
        }
        let mut class = Self {
            id,
            reactants,
            rxn_type,
            pathways,
            cum_probs: Vec::new(),
            min_noreaction_p: 0.0,
            max_fixed_p: 0.0,
            variable_rates: Vec::new(),
            next_variable_rate: 0,
        };
        class.recompute_probs();
        Ok(class)
    }

    /// Attach an increasing (time, rate) schedule.
    pub fn with_variable_rates(mut self, schedule: Vec<(f64, f64)>) -> Result<Self, SimError> {
        if schedule.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(SimError::config(
                "variable-rate schedule times must be strictly increasing",
            ));
        }
        if schedule.iter().any(|&(_, rate)| rate < 0.0) {
            return Err(SimError::config("negative rate in variable-rate schedule"));
        }
        self.variable_rates = schedule;
        Ok(self)
    }

    fn recompute_probs(&mut self) {
        self.cum_probs.clear();
        let mut total = 0.0;
        for p in &self.pathways {
            total += p.probability;
            self.cum_probs.push(total);
        }
        self.min_noreaction_p = self.pathways[0].probability;
        self.max_fixed_p = total;
    }

    /// Apply schedule entries that have come due. Pathway probabilities are
    /// rescaled so the class total equals the scheduled rate. Returns true
    /// if anything changed.
    pub fn update_variable_rate(&mut self, time: f64) -> bool {
        let mut changed = false;
        while self.next_variable_rate < self.variable_rates.len()
            && self.variable_rates[self.next_variable_rate].0 <= time
        {
            let (_, rate) = self.variable_rates[self.next_variable_rate];
            self.next_variable_rate += 1;
            let old_total = self.max_fixed_p;
            if old_total > 0.0 {
                let scale = rate / old_total;
                for p in &mut self.pathways {
                    p.probability *= scale;
                }
            } else {
                // all pathways at zero: give the new rate to the first
                self.pathways[0].probability = rate;
            }
            self.recompute_probs();
            changed = true;
        }
        changed
    }

    /// Smallest pathway index i with `p <= cum_probs[i] * local_factor`.
    ///
    /// Callers guarantee `p < max_fixed_p * local_factor`, so the search
    /// always lands on a valid pathway.
    pub fn pick_pathway(&self, p: f64, local_factor: f64) -> usize {
        self.cum_probs
            .partition_point(|&cum| cum * local_factor < p)
            .min(self.pathways.len() - 1)
    }

    #[inline]
    pub fn is_unimolecular(&self) -> bool {
        self.reactants.1.is_none()
    }
}

/// The reaction catalogue: class lookup by reactant tuple.
///
/// Bimolecular keys are stored for both orderings; surface-class classes
/// keyed by wildcards are resolved at query time.
#[derive(Clone, Debug, Default)]
pub struct ReactionTable {
    pub classes: Vec<RxnClass>,
    unimol: FxHashMap<SpeciesId, RxnClassId>,
    bimol: FxHashMap<(SpeciesId, SpeciesId), RxnClassId>,
    /// For each species, the partner species it can react with (used to
    /// gather collision candidates). Wildcards are kept as-is.
    partners: FxHashMap<SpeciesId, Vec<SpeciesId>>,
}

impl ReactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unimolecular class for `species`.
    pub fn add_unimolecular(
        &mut self,
        species: SpeciesId,
        pathways: Vec<Pathway>,
    ) -> Result<RxnClassId, SimError> {
        if self.unimol.contains_key(&species) {
            return Err(SimError::config(format!(
                "duplicate unimolecular reaction class for species {species}"
            )));
        }
        let id = self.classes.len();
        self.classes
            .push(RxnClass::new(id, (species, None), RxnType::Standard, pathways)?);
        self.unimol.insert(species, id);
        Ok(id)
    }

    /// Register a bimolecular class for the ordered pair `(a, b)`.
    pub fn add_bimolecular(
        &mut self,
        a: SpeciesId,
        b: SpeciesId,
        rxn_type: RxnType,
        pathways: Vec<Pathway>,
    ) -> Result<RxnClassId, SimError> {
        if self.bimol.contains_key(&(a, b)) {
            return Err(SimError::config(format!(
                "duplicate bimolecular reaction class for species pair ({a}, {b})"
            )));
        }
        let id = self.classes.len();
        self.classes
            .push(RxnClass::new(id, (a, Some(b)), rxn_type, pathways)?);
        self.bimol.insert((a, b), id);
        if a != b {
            self.bimol.insert((b, a), id);
        }
        self.partners.entry(a).or_default().push(b);
        if a != b {
            self.partners.entry(b).or_default().push(a);
        }
        Ok(id)
    }

    /// Attach a variable-rate schedule to an existing class.
    pub fn set_variable_rates(
        &mut self,
        class: RxnClassId,
        schedule: Vec<(f64, f64)>,
    ) -> Result<(), SimError> {
        let c = self.classes[class].clone().with_variable_rates(schedule)?;
        self.classes[class] = c;
        Ok(())
    }

    /// Apply all due variable-rate schedule entries. Returns the species
    /// whose unimolecular class changed; their molecules must resample
    /// their reaction clocks.
    pub fn update_variable_rates(&mut self, time: f64) -> Vec<SpeciesId> {
        let mut changed_unimol = Vec::new();
        for class in &mut self.classes {
            if !class.variable_rates.is_empty() && class.update_variable_rate(time) {
                if class.is_unimolecular() {
                    changed_unimol.push(class.reactants.0);
                }
            }
        }
        changed_unimol
    }

    /// The unimolecular class of a species, if any.
    #[inline]
    pub fn pick_unimol(&self, species: SpeciesId) -> Option<&RxnClass> {
        self.unimol.get(&species).map(|&id| &self.classes[id])
    }

    /// The bimolecular class for a concrete species pair, if any.
    #[inline]
    pub fn pick_bimol(&self, a: SpeciesId, b: SpeciesId) -> Option<&RxnClass> {
        self.bimol.get(&(a, b)).map(|&id| &self.classes[id])
    }

    /// All classes applicable between a molecule of species `a` and a
    /// surface class or surface molecule of species `b`, wildcards
    /// included, in a deterministic order (concrete first).
    pub fn matching_classes(&self, a: SpeciesId, b: SpeciesId, a_is_volume: bool) -> Vec<&RxnClass> {
        let mut out = Vec::new();
        if let Some(class) = self.pick_bimol(a, b) {
            out.push(class);
        }
        let family = if a_is_volume {
            ALL_VOLUME_MOLECULES
        } else {
            ALL_SURFACE_MOLECULES
        };
        for wildcard in [family, ALL_MOLECULES] {
            if let Some(class) = self.pick_bimol(wildcard, b) {
                out.push(class);
            }
        }
        out
    }

    /// The concrete partner species of `species` (wildcards filtered out);
    /// used for volume collision candidate gathering.
    pub fn volume_partners(&self, species: SpeciesId) -> &[SpeciesId] {
        self.partners
            .get(&species)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    #[inline]
    pub fn get(&self, id: RxnClassId) -> &RxnClass {
        &self.classes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pathway(prob: f64) -> Pathway {
        Pathway {
            products: Vec::new(),
            probability: prob,
        }
    }

    #[test]
    fn cum_probs_are_cumulative_and_bounded() {
        let class = RxnClass::new(
            0,
            (3, Some(4)),
            RxnType::Standard,
            vec![pathway(0.1), pathway(0.3), pathway(0.2)],
        )
        .unwrap();
        assert_eq!(class.cum_probs.len(), 3);
        assert!(class
            .cum_probs
            .windows(2)
            .all(|w| w[0] <= w[1]));
        assert!((class.cum_probs[2] - class.max_fixed_p).abs() < 1e-15);
        assert!((class.max_fixed_p - 0.6).abs() < 1e-15);
        assert!((class.min_noreaction_p - 0.1).abs() < 1e-15);
    }

    #[test]
    fn pathway_binary_search() {
        let class = RxnClass::new(
            0,
            (3, Some(4)),
            RxnType::Standard,
            vec![pathway(0.1), pathway(0.3), pathway(0.2)],
        )
        .unwrap();
        assert_eq!(class.pick_pathway(0.05, 1.0), 0);
        assert_eq!(class.pick_pathway(0.1, 1.0), 0);
        assert_eq!(class.pick_pathway(0.11, 1.0), 1);
        assert_eq!(class.pick_pathway(0.4, 1.0), 1);
        assert_eq!(class.pick_pathway(0.41, 1.0), 2);
        // local factor scales the thresholds
        assert_eq!(class.pick_pathway(0.15, 2.0), 0);
    }

    #[test]
    fn negative_probability_rejected() {
        assert!(RxnClass::new(0, (3, None), RxnType::Standard, vec![pathway(-0.5)]).is_err());
        assert!(RxnClass::new(0, (3, None), RxnType::Standard, vec![]).is_err());
    }

    #[test]
    fn bimolecular_lookup_is_symmetric() {
        let mut table = ReactionTable::new();
        let id = table
            .add_bimolecular(3, 4, RxnType::Standard, vec![pathway(0.5)])
            .unwrap();
        assert_eq!(table.pick_bimol(3, 4).unwrap().id, id);
        assert_eq!(table.pick_bimol(4, 3).unwrap().id, id);
        assert!(table.pick_bimol(3, 3).is_none());
        assert_eq!(table.volume_partners(3), &[4]);
        assert_eq!(table.volume_partners(4), &[3]);
    }

    #[test]
    fn variable_rate_replaces_class_total() {
        let mut class = RxnClass::new(
            0,
            (3, None),
            RxnType::Standard,
            vec![pathway(0.2), pathway(0.2)],
        )
        .unwrap()
        .with_variable_rates(vec![(1.0, 0.8), (2.0, 0.1)])
        .unwrap();

        assert!(!class.update_variable_rate(0.5));
        assert!((class.max_fixed_p - 0.4).abs() < 1e-15);

        assert!(class.update_variable_rate(1.0));
        assert!((class.max_fixed_p - 0.8).abs() < 1e-12);
        // proportions preserved
        assert!((class.pathways[0].probability - 0.4).abs() < 1e-12);

        // both remaining entries apply at once when far in the future
        assert!(class.update_variable_rate(10.0));
        assert!((class.max_fixed_p - 0.1).abs() < 1e-12);
    }

    #[test]
    fn nondecreasing_schedule_rejected() {
        let class = RxnClass::new(0, (3, None), RxnType::Standard, vec![pathway(0.2)]).unwrap();
        assert!(class
            .with_variable_rates(vec![(2.0, 0.5), (1.0, 0.3)])
            .is_err());
    }

    #[test]
    fn wildcard_matching_order() {
        let mut table = ReactionTable::new();
        let concrete = table
            .add_bimolecular(5, 9, RxnType::Standard, vec![pathway(0.5)])
            .unwrap();
        let wild = table
            .add_bimolecular(ALL_VOLUME_MOLECULES, 9, RxnType::Reflect, vec![pathway(1.0)])
            .unwrap();
        let found = table.matching_classes(5, 9, true);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, concrete);
        assert_eq!(found[1].id, wild);
        // a different volume species only sees the wildcard
        let found = table.matching_classes(6, 9, true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, wild);
    }
}
