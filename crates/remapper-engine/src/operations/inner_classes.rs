//! Nested type matching below confirmed outer types, and back up from
//! confirmed nested types to their outers.

use std::collections::BTreeMap;

use remapper_core::{Program, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

fn nested_types(program: &Program) -> BTreeMap<TypeId, Vec<TypeId>> {
    let mut out: BTreeMap<TypeId, Vec<TypeId>> = BTreeMap::new();
    for ty in program.type_ids() {
        let Some(outer) = program.ty(ty).outer_name().and_then(|o| program.get(o)) else {
            continue;
        };
        out.entry(outer).or_default().push(ty);
    }
    out
}

#[derive(Default)]
pub struct MatchInnerClasses {
    nested: Option<(BTreeMap<TypeId, Vec<TypeId>>, BTreeMap<TypeId, Vec<TypeId>>)>,
}

impl MergeOperation for MatchInnerClasses {
    fn name(&self) -> &str {
        "inner_classes"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let (old, new) = (engine.old, engine.new);
        let (old_nested, new_nested) = self
            .nested
            .get_or_insert_with(|| (nested_types(old), nested_types(new)));
        let mut proposals = Vec::new();

        for (o, n) in engine.type_pairs() {
            let old_outer = old.ty(o).outer_name().and_then(|name| old.get(name));
            let new_outer = new.ty(n).outer_name().and_then(|name| new.get(name));
            if let (Some(oo), Some(no)) = (old_outer, new_outer) {
                if engine.type_target(oo).is_none() {
                    proposals.push((oo, no));
                }
            }

            let (Some(old_inner), Some(new_inner)) = (old_nested.get(&o), new_nested.get(&n)) else {
                continue;
            };
            pair_nested(engine, old, new, old_inner, new_inner, &mut proposals);
        }

        let mut votes = 0;
        for (o, n) in proposals {
            if engine.vote_type(o, n) {
                votes += 1;
            }
        }
        debug!(pass = self.name(), votes, "nested types compared");
        Ok(())
    }
}

fn pair_nested(
    engine: &MergeEngine<'_>,
    old: &Program,
    new: &Program,
    old_inner: &[TypeId],
    new_inner: &[TypeId],
    proposals: &mut Vec<(TypeId, TypeId)>,
) {
    let (old_anon, old_named): (Vec<TypeId>, Vec<TypeId>) =
        old_inner.iter().copied().partition(|t| old.ty(*t).is_anonymous());
    let (new_anon, new_named): (Vec<TypeId>, Vec<TypeId>) =
        new_inner.iter().copied().partition(|t| new.ty(*t).is_anonymous());

    if let ([o], [n]) = (old_anon.as_slice(), new_anon.as_slice()) {
        proposals.push((*o, *n));
    }
    if let ([o], [n]) = (old_named.as_slice(), new_named.as_slice()) {
        proposals.push((*o, *n));
        return;
    }

    for o in &old_named {
        let old_entry = old.ty(*o);
        if !old_entry.is_enum() || engine.type_target(*o).is_some() {
            continue;
        }
        let mut best: Option<TypeId> = None;
        let mut best_overlap = 0;
        for n in &new_named {
            let new_entry = new.ty(*n);
            if !new_entry.is_enum() {
                continue;
            }
            let overlap = old_entry
                .enum_constants
                .iter()
                .filter(|c| new_entry.enum_constants.contains(c))
                .count();
            if overlap > best_overlap {
                best = Some(*n);
                best_overlap = overlap;
            } else if overlap == best_overlap {
                best = None;
            }
        }
        if let Some(n) = best {
            proposals.push((*o, n));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::{Handle, MappingSet, MergeSettings, TypeEntry};

    fn votes(engine: &MergeEngine<'_>, old: u32, new: u32) -> u32 {
        engine
            .ledger()
            .types
            .get(&Handle::Real(TypeId(old)))
            .map_or(0, |e| e.votes_for(TypeId(new)))
    }

    #[test]
    fn test_single_anonymous_and_enum_overlap() {
        let mut old = Program::new();
        old.add_type(TypeEntry::class("a")).unwrap();
        old.add_type(TypeEntry::class("a$1")).unwrap();
        old.add_type(TypeEntry::enumeration("a$b", ["ONE", "TWO"])).unwrap();
        old.add_type(TypeEntry::class("a$c")).unwrap();

        let mut new = Program::new();
        new.add_type(TypeEntry::class("x")).unwrap();
        new.add_type(TypeEntry::class("x$1")).unwrap();
        new.add_type(TypeEntry::enumeration("x$y", ["ONE"])).unwrap();
        new.add_type(TypeEntry::enumeration("x$z", ["ONE", "TWO", "THREE"])).unwrap();

        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        MatchInnerClasses::default().operate(&mut engine).unwrap();

        assert_eq!(votes(&engine, 1, 1), 1);
        assert_eq!(votes(&engine, 2, 3), 1);
        assert_eq!(votes(&engine, 2, 2), 0);
    }

    #[test]
    fn test_confirmed_inner_votes_outer() {
        let mut old = Program::new();
        old.add_type(TypeEntry::class("a")).unwrap();
        old.add_type(TypeEntry::class("a$1")).unwrap();
        let mut new = Program::new();
        new.add_type(TypeEntry::class("x")).unwrap();
        new.add_type(TypeEntry::class("x$1")).unwrap();

        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine.confirm_type(Handle::Real(TypeId(1)), TypeId(1)).unwrap();
        MatchInnerClasses::default().operate(&mut engine).unwrap();
        assert_eq!(votes(&engine, 0, 0), 1);
    }
}
