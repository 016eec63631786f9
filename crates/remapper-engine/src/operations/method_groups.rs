//! Propagates confirmed method pairs across their override groups.

use std::collections::BTreeSet;

use remapper_core::{Handle, MethodId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

pub struct MatchMethodGroups;

impl MergeOperation for MatchMethodGroups {
    fn name(&self) -> &str {
        "method_groups"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let (old, new) = (engine.old, engine.new);
        let mut handled: BTreeSet<MethodId> = BTreeSet::new();
        let mut proposals = Vec::new();
        for (om, nm) in engine.method_pairs() {
            let Some(old_group) = engine.old_groups.group(om) else {
                continue;
            };
            if old_group.len() <= 1 || !handled.insert(old_group.archetype()) {
                continue;
            }
            let Some(new_group) = engine.new_groups.group(nm) else {
                continue;
            };
            for sibling in old_group.members() {
                if engine.ledger.methods.is_confirmed(&Handle::Real(*sibling)) {
                    continue;
                }
                let Some(new_owner) = engine.type_target(old.method(*sibling).owner) else {
                    continue;
                };
                if let Some(candidate) = new_group.get_override(new, new_owner) {
                    proposals.push((*sibling, candidate));
                }
            }
        }
        let mut votes = 0;
        for (o, n) in proposals {
            if engine.vote_method(o, n) {
                votes += 1;
            }
        }
        debug!(pass = self.name(), votes, "override groups propagated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::{MappingSet, MergeSettings, MethodEntry, Program, TypeEntry, TypeId};

    fn hierarchy(base: &str, sub: &str, method: &str) -> Program {
        let mut p = Program::new();
        let b = p.add_type(TypeEntry::class(base)).unwrap();
        let s = p.add_type(TypeEntry::class(sub).extends(base)).unwrap();
        p.add_method(b, MethodEntry::new(method, "()V").unwrap()).unwrap();
        p.add_method(s, MethodEntry::new(method, "()V").unwrap()).unwrap();
        p
    }

    #[test]
    fn test_override_on_matched_subtype_is_voted() {
        let old = hierarchy("a", "b", "m");
        let new = hierarchy("x", "y", "n");
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        engine.confirm_type(Handle::Real(TypeId(1)), TypeId(1)).unwrap();
        engine.confirm_method(Handle::Real(MethodId(0)), MethodId(0)).unwrap();

        MatchMethodGroups.operate(&mut engine).unwrap();
        let entry = engine.ledger().methods.get(&Handle::Real(MethodId(1))).unwrap();
        assert_eq!(entry.votes_for(MethodId(1)), 1);
    }
}
