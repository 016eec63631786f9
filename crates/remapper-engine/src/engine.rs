//! The merge engine: owns the ledger and drives the pass pipeline.

use std::collections::BTreeMap;

use remapper_core::{
    FieldId, Handle, MappingSet, MergeSettings, MethodId, Program, Synthetic, TypeId,
};
use tracing::{debug, info, warn};

use crate::error::MergeError;
use crate::groups::MethodGroups;
use crate::ledger::Ledger;
use crate::pipeline::{default_steps, MergeOperation, Predicate, Step};

/// Carries the old build's names onto the new build.
///
/// Construct with both programs, the old mapping and an optional partial
/// mapping for the new build, add passes (or use
/// [`MergeEngine::with_default_pipeline`]), then call [`MergeEngine::merge`].
pub struct MergeEngine<'p> {
    pub(crate) old: &'p Program,
    pub(crate) new: &'p Program,
    pub(crate) old_mappings: MappingSet,
    pub(crate) output: MappingSet,
    pub(crate) ledger: Ledger,
    pub(crate) old_groups: MethodGroups,
    pub(crate) new_groups: MethodGroups,
    old_subtypes: BTreeMap<TypeId, Vec<TypeId>>,
    new_subtypes: BTreeMap<TypeId, Vec<TypeId>>,
    pub(crate) settings: MergeSettings,
    steps: Vec<Step>,
    changes: usize,
    cycle: u32,
    seeded: bool,
}

impl<'p> MergeEngine<'p> {
    pub fn new(
        old: &'p Program,
        old_mappings: &MappingSet,
        new: &'p Program,
        seed: MappingSet,
        settings: MergeSettings,
    ) -> Self {
        let old_subtypes = old.subtypes();
        let new_subtypes = new.subtypes();
        let old_groups = MethodGroups::build(old, &old_subtypes);
        let new_groups = MethodGroups::build(new, &new_subtypes);
        Self {
            old,
            new,
            old_mappings: old_mappings.excluding_packages(&settings.excluded_packages),
            output: seed,
            ledger: Ledger::new(),
            old_groups,
            new_groups,
            old_subtypes,
            new_subtypes,
            settings,
            steps: Vec::new(),
            changes: 0,
            cycle: 0,
            seeded: false,
        }
    }

    pub fn with_default_pipeline(mut self) -> Self {
        self.steps = default_steps();
        self
    }

    pub fn add_operation(&mut self, op: impl MergeOperation + 'static) {
        self.steps.push(Step::Run(Box::new(op)));
    }

    /// Continue at step `target` whenever `predicate` holds on reaching this
    /// point.
    pub fn add_jump(&mut self, target: usize, predicate: Predicate) {
        self.steps.push(Step::Jump { target, predicate });
    }

    pub fn old(&self) -> &'p Program {
        self.old
    }

    pub fn new_program(&self) -> &'p Program {
        self.new
    }

    pub fn old_mappings(&self) -> &MappingSet {
        &self.old_mappings
    }

    /// The new build's mapping: the seed, plus everything projected by the
    /// finalizer once [`MergeEngine::merge`] returns.
    pub fn output(&self) -> &MappingSet {
        &self.output
    }

    pub fn into_output(self) -> MappingSet {
        self.output
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    pub fn old_groups(&self) -> &MethodGroups {
        &self.old_groups
    }

    pub fn new_groups(&self) -> &MethodGroups {
        &self.new_groups
    }

    pub fn old_subtypes(&self, ty: TypeId) -> &[TypeId] {
        self.old_subtypes.get(&ty).map_or(&[], Vec::as_slice)
    }

    pub fn new_subtypes(&self, ty: TypeId) -> &[TypeId] {
        self.new_subtypes.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// Confirmations since the counter was last reset.
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Return the change count and reset it.
    pub fn take_changes(&mut self) -> usize {
        std::mem::take(&mut self.changes)
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Confirm new types already named by the seed mapping against the old
    /// type carrying the same plain name.
    pub fn seed(&mut self) -> Result<(), MergeError> {
        if self.seeded {
            return Ok(());
        }
        self.seeded = true;
        let seeds: Vec<(String, String)> = self
            .output
            .types()
            .map(|(obf, plain)| (obf.to_string(), plain.to_string()))
            .collect();
        for (new_name, plain) in seeds {
            let Some(new_ty) = self.new.get(&new_name) else {
                continue;
            };
            let old = match self
                .old_mappings
                .inverse_type(&plain)
                .and_then(|o| self.old.get(o))
            {
                Some(old_ty) => Handle::Real(old_ty),
                None => Handle::Synthetic(Synthetic {
                    owner: None,
                    name: plain,
                    descriptor: None,
                }),
            };
            self.confirm_type(old, new_ty)?;
        }
        debug!(seeded = self.ledger.types.confirmed_count(), "seed mapping applied");
        self.changes = 0;
        Ok(())
    }

    /// Seed, run every step, then project the ledger into the output mapping.
    pub fn merge(&mut self) -> Result<(), MergeError> {
        self.seed()?;
        let mut steps = std::mem::take(&mut self.steps);
        let result = self.run(&mut steps);
        self.steps = steps;
        result?;
        self.finalize();
        info!(
            types = self.ledger.types.confirmed_count(),
            methods = self.ledger.methods.confirmed_count(),
            fields = self.ledger.fields.confirmed_count(),
            cycles = self.cycle,
            "merge complete"
        );
        Ok(())
    }

    fn run(&mut self, steps: &mut [Step]) -> Result<(), MergeError> {
        let mut i = 0;
        while i < steps.len() {
            match &mut steps[i] {
                Step::Run(op) => {
                    let before = self.changes;
                    op.operate(self)?;
                    debug!(
                        pass = op.name(),
                        cycle = self.cycle,
                        confirmed = self.changes.saturating_sub(before),
                        "pass finished"
                    );
                    i += 1;
                }
                Step::Jump { target, predicate } => {
                    if !predicate(self) {
                        i += 1;
                        continue;
                    }
                    if self.cycle >= self.settings.max_cycles {
                        warn!(cycle = self.cycle, "cycle limit reached, leaving loop");
                        i += 1;
                        continue;
                    }
                    self.cycle += 1;
                    info!(
                        cycle = self.cycle,
                        types = self.ledger.types.confirmed_count(),
                        methods = self.ledger.methods.confirmed_count(),
                        fields = self.ledger.fields.confirmed_count(),
                        "starting cycle"
                    );
                    i = *target;
                }
            }
        }
        Ok(())
    }

    pub fn vote_type(&mut self, old: TypeId, new: TypeId) -> bool {
        self.ledger.types.vote(Handle::Real(old), new)
    }

    /// Vote for a method pair.
    ///
    /// Pairs involving a synthetic bridge skip the static and owner checks
    /// but still respect confirmed and claimed entries. Otherwise static and
    /// instance methods never match, and once the old owner is known the
    /// candidate must be declared on its counterpart.
    pub fn vote_method(&mut self, old: MethodId, new: MethodId) -> bool {
        let o = self.old.method(old);
        let n = self.new.method(new);
        if o.is_synthetic || n.is_synthetic {
            return self.ledger.methods.vote(Handle::Real(old), new);
        }
        if o.is_static != n.is_static {
            return false;
        }
        let hint = self
            .ledger
            .methods
            .get(&Handle::Real(old))
            .and_then(|e| e.owner_hint())
            .or_else(|| self.ledger.types.confirmed_target(&Handle::Real(o.owner)));
        if hint.is_some_and(|owner| owner != n.owner) {
            return false;
        }
        self.ledger.methods.vote(Handle::Real(old), new)
    }

    pub fn vote_field(&mut self, old: FieldId, new: FieldId) -> bool {
        let o = self.old.field(old);
        let n = self.new.field(new);
        if o.is_static != n.is_static {
            return false;
        }
        let hint = self
            .ledger
            .fields
            .get(&Handle::Real(old))
            .and_then(|e| e.owner_hint())
            .or_else(|| self.ledger.types.confirmed_target(&Handle::Real(o.owner)));
        if hint.is_some_and(|owner| owner != n.owner) {
            return false;
        }
        self.ledger.fields.vote(Handle::Real(old), new)
    }

    /// Confirm a type pair and restrict the pending member votes of the old
    /// type to members of `new`.
    pub fn confirm_type(&mut self, old: Handle<TypeId>, new: TypeId) -> Result<bool, MergeError> {
        let real = old.real();
        if !self.ledger.types.try_match(old, new)? {
            return Ok(false);
        }
        self.changes += 1;
        if let Some(old_ty) = real {
            self.cleanup(old_ty, new);
        }
        Ok(true)
    }

    pub fn confirm_method(&mut self, old: Handle<MethodId>, new: MethodId) -> Result<bool, MergeError> {
        let done = self.ledger.methods.try_match(old, new)?;
        if done {
            self.changes += 1;
        }
        Ok(done)
    }

    pub fn confirm_field(&mut self, old: Handle<FieldId>, new: FieldId) -> Result<bool, MergeError> {
        let done = self.ledger.fields.try_match(old, new)?;
        if done {
            self.changes += 1;
        }
        Ok(done)
    }

    fn cleanup(&mut self, old_ty: TypeId, new_ty: TypeId) {
        let old = self.old;
        let new = self.new;
        let entry = old.ty(old_ty);
        for m in entry.methods() {
            if let Some(pending) = self.ledger.methods.pending_mut(&Handle::Real(*m)) {
                pending.retain_votes(|cand| new.method(cand).owner == new_ty);
                pending.set_owner_hint(new_ty);
            }
        }
        for f in entry.fields() {
            if let Some(pending) = self.ledger.fields.pending_mut(&Handle::Real(*f)) {
                pending.retain_votes(|cand| new.field(cand).owner == new_ty);
                pending.set_owner_hint(new_ty);
            }
        }
    }

    pub fn type_target(&self, old: TypeId) -> Option<TypeId> {
        self.ledger.types.confirmed_target(&Handle::Real(old))
    }

    pub fn method_target(&self, old: MethodId) -> Option<MethodId> {
        self.ledger.methods.confirmed_target(&Handle::Real(old))
    }

    pub fn field_target(&self, old: FieldId) -> Option<FieldId> {
        self.ledger.fields.confirmed_target(&Handle::Real(old))
    }

    /// Whether `new` is claimed by a confirmed type match.
    pub fn is_type_matched(&self, new: TypeId) -> bool {
        self.ledger.types.is_claimed(new)
    }

    pub fn is_method_matched(&self, new: MethodId) -> bool {
        self.ledger.methods.is_claimed(new)
    }

    pub fn is_field_matched(&self, new: FieldId) -> bool {
        self.ledger.fields.is_claimed(new)
    }

    /// Confirmed pairs of real types, in old-id order.
    pub fn type_pairs(&self) -> Vec<(TypeId, TypeId)> {
        self.ledger
            .types
            .confirmed()
            .filter_map(|e| Some((e.old().real()?, e.target()?)))
            .collect()
    }

    pub fn method_pairs(&self) -> Vec<(MethodId, MethodId)> {
        self.ledger
            .methods
            .confirmed()
            .filter_map(|e| Some((e.old().real()?, e.target()?)))
            .collect()
    }

    pub fn field_pairs(&self) -> Vec<(FieldId, FieldId)> {
        self.ledger
            .fields
            .confirmed()
            .filter_map(|e| Some((e.old().real()?, e.target()?)))
            .collect()
    }

    /// Old type name as it would appear in the old mapping's plain names.
    pub fn old_mapped_type<'a>(&'a self, obf: &'a str) -> &'a str {
        self.old_mappings.map_type_safe(obf)
    }

    /// Name the old mapping would give to the new type `name`, via its
    /// confirmed counterpart.
    pub fn new_mapped_type(&self, name: &str) -> Option<String> {
        let ty = self.new.get(name)?;
        let old = self.ledger.types.inverse(ty)?;
        match old {
            Handle::Real(o) => Some(self.old_mapped_type(&self.old.ty(*o).name).to_string()),
            Handle::Synthetic(s) => Some(s.name.clone()),
        }
    }
}
