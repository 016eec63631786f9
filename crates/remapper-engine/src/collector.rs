//! Vote collector: commits the most decisive pending matches of each cycle.
//!
//! Per kind, pending entries are ranked by the margin between their best and
//! second-best candidate and the top `quota` are confirmed onto their best
//! candidate. Entries are re-read as the batch is processed since earlier
//! confirmations withdraw votes from later ones.

use remapper_core::{Handle, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

pub struct VoteCollector;

impl MergeOperation for VoteCollector {
    fn name(&self) -> &str {
        "vote_collector"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let types = collect_types(engine)?;
        let methods = collect_methods(engine)?;
        let fields = collect_fields(engine)?;
        debug!(types, methods, fields, "votes collected");
        Ok(())
    }
}

fn collect_types(engine: &mut MergeEngine<'_>) -> Result<usize, MergeError> {
    let settings = &engine.settings.collector;
    let ranked = engine.ledger.types.ranked_pending();
    let quota = settings.quota(settings.min_types, ranked.len());
    let mut committed = 0;
    for old in ranked.into_iter().take(quota) {
        let Some(best) = engine.ledger.types.get(&old).and_then(|e| e.highest()) else {
            continue;
        };
        if engine.confirm_type(old, best)? {
            committed += 1;
        }
    }
    Ok(committed)
}

/// Confirm `old_owner -> new_owner` unless the old owner is already decided.
/// Returns `false` when the member must be skipped because its candidate's
/// owner belongs to another type.
fn settle_owner(
    engine: &mut MergeEngine<'_>,
    old_owner: TypeId,
    new_owner: TypeId,
) -> Result<bool, MergeError> {
    if engine.type_target(old_owner).is_some() {
        return Ok(true);
    }
    if engine.is_type_matched(new_owner) {
        return Ok(false);
    }
    engine.confirm_type(Handle::Real(old_owner), new_owner)
}

fn collect_methods(engine: &mut MergeEngine<'_>) -> Result<usize, MergeError> {
    let settings = &engine.settings.collector;
    let ranked = engine.ledger.methods.ranked_pending();
    let quota = settings.quota(settings.min_methods, ranked.len());
    let mut committed = 0;
    for old in ranked.into_iter().take(quota) {
        let Some(best) = engine.ledger.methods.get(&old).and_then(|e| e.highest()) else {
            continue;
        };
        if let Handle::Real(m) = &old {
            let old_owner = engine.old.method(*m).owner;
            let new_owner = engine.new.method(best).owner;
            if !settle_owner(engine, old_owner, new_owner)? {
                continue;
            }
        }
        if engine.confirm_method(old, best)? {
            committed += 1;
        }
    }
    Ok(committed)
}

fn collect_fields(engine: &mut MergeEngine<'_>) -> Result<usize, MergeError> {
    let settings = &engine.settings.collector;
    let ranked = engine.ledger.fields.ranked_pending();
    let quota = settings.quota(settings.min_fields, ranked.len());
    let mut committed = 0;
    for old in ranked.into_iter().take(quota) {
        let Some(best) = engine.ledger.fields.get(&old).and_then(|e| e.highest()) else {
            continue;
        };
        if let Handle::Real(f) = &old {
            let old_owner = engine.old.field(*f).owner;
            let new_owner = engine.new.field(best).owner;
            if !settle_owner(engine, old_owner, new_owner)? {
                continue;
            }
        }
        if engine.confirm_field(old, best)? {
            committed += 1;
        }
    }
    Ok(committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::{FieldEntry, MappingSet, MergeSettings, MethodEntry, Program, TypeEntry};

    fn types(prefix: &str, count: usize) -> Program {
        let mut p = Program::new();
        for i in 0..count {
            p.add_type(TypeEntry::class(format!("{prefix}{i}"))).unwrap();
        }
        p
    }

    #[test]
    fn test_commits_quota_of_most_decisive() {
        let old = types("o", 200);
        let new = types("n", 200);
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        for i in 0..200u32 {
            for _ in 0..=i {
                engine.vote_type(TypeId(i), TypeId(i));
            }
        }
        VoteCollector.operate(&mut engine).unwrap();

        assert_eq!(engine.ledger().types.confirmed_count(), 20);
        assert_eq!(engine.ledger().types.pending_count(), 180);
        for i in 180..200u32 {
            assert_eq!(engine.type_target(TypeId(i)), Some(TypeId(i)));
        }
        assert_eq!(engine.type_target(TypeId(179)), None);
        assert_eq!(engine.changes(), 20);
    }

    #[test]
    fn test_entries_without_votes_are_skipped() {
        let old = types("o", 3);
        let new = types("n", 3);
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine.ledger.types.entry_mut(Handle::Real(TypeId(0)));
        engine.vote_type(TypeId(1), TypeId(2));
        VoteCollector.operate(&mut engine).unwrap();
        assert_eq!(engine.type_target(TypeId(0)), None);
        assert_eq!(engine.type_target(TypeId(1)), Some(TypeId(2)));
    }

    #[test]
    fn test_member_commit_confirms_owner() {
        let mut old = Program::new();
        let a = old.add_type(TypeEntry::class("a")).unwrap();
        let b = old.add_type(TypeEntry::class("b")).unwrap();
        let am = old.add_method(a, MethodEntry::new("m", "()V").unwrap()).unwrap();
        let bf = old.add_field(b, FieldEntry::new("f", "I").unwrap()).unwrap();

        let mut new = Program::new();
        let x = new.add_type(TypeEntry::class("x")).unwrap();
        let y = new.add_type(TypeEntry::class("y")).unwrap();
        let xm = new.add_method(x, MethodEntry::new("p", "()V").unwrap()).unwrap();
        let xf = new.add_field(x, FieldEntry::new("g", "I").unwrap()).unwrap();
        new.add_field(y, FieldEntry::new("h", "I").unwrap()).unwrap();

        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine.vote_method(am, xm);
        engine.vote_field(bf, xf);
        VoteCollector.operate(&mut engine).unwrap();

        assert_eq!(engine.type_target(a), Some(x));
        assert_eq!(engine.method_target(am), Some(xm));
        // x went to a, so b's field candidate on x is dropped
        assert_eq!(engine.type_target(b), None);
        assert_eq!(engine.field_target(bf), None);
    }
}
