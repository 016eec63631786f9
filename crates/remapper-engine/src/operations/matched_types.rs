//! Follow-up votes from each newly confirmed type pair: superclasses,
//! interfaces, lone methods and method-unique string literals.

use std::collections::{BTreeMap, BTreeSet};

use remapper_core::ast::{walk_instructions, Instruction};
use remapper_core::{Handle, MethodId, Program, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

/// Interfaces whose method counts differ by at most this are candidates.
const CLOSE_DELTA: usize = 2;
/// Any other interface within this distance makes the pairing ambiguous.
const AMBIGUOUS_DELTA: usize = 6;

pub struct MergeMatchedTypes;

impl MergeOperation for MergeMatchedTypes {
    fn name(&self) -> &str {
        "matched_types"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let (old, new) = (engine.old, engine.new);
        let mut visited = 0;
        for (o, n) in engine.type_pairs() {
            if !engine.ledger.types.mark_merged(&Handle::Real(o)) {
                continue;
            }
            visited += 1;

            if let (Some(os), Some(ns)) = (old.superclass_of(o), new.superclass_of(n)) {
                engine.vote_type(os, ns);
            }
            pair_interfaces(engine, o, n);

            if let (Some(om), Some(nm)) = (lone_method(old, o), lone_method(new, n)) {
                engine.confirm_method(Handle::Real(om), nm)?;
            }

            let new_unique = method_constants(new, n);
            for (literal, om) in method_constants(old, o) {
                if let Some(nm) = new_unique.get(literal) {
                    engine.vote_method(om, *nm);
                }
            }
        }
        debug!(pass = self.name(), visited, "confirmed types expanded");
        Ok(())
    }
}

fn pair_interfaces(engine: &mut MergeEngine<'_>, o: TypeId, n: TypeId) {
    let (old, new) = (engine.old, engine.new);
    let new_sizes: Vec<(TypeId, usize)> = new
        .interfaces_of(n)
        .into_iter()
        .map(|i| (i, new.ty(i).methods().len()))
        .collect();

    for old_inter in old.interfaces_of(o) {
        if engine.type_target(old_inter).is_some() {
            continue;
        }
        let size = old.ty(old_inter).methods().len();
        let mut found = None;
        for (new_inter, new_size) in &new_sizes {
            if engine.is_type_matched(*new_inter) {
                continue;
            }
            let delta = size.abs_diff(*new_size);
            if delta <= CLOSE_DELTA {
                if found.is_some() {
                    found = None;
                    break;
                }
                found = Some(*new_inter);
            } else if delta < AMBIGUOUS_DELTA {
                found = None;
                break;
            }
        }
        if let Some(new_inter) = found {
            engine.vote_type(old_inter, new_inter);
        }
    }
}

/// The only non-synthetic instance method of `ty`, if there is exactly one.
fn lone_method(program: &Program, ty: TypeId) -> Option<MethodId> {
    let mut real = program
        .instance_methods(ty)
        .filter(|m| !program.method(*m).is_synthetic);
    let first = real.next()?;
    real.next().is_none().then_some(first)
}

/// Literals used by exactly one method of `ty`.
fn method_constants(program: &Program, ty: TypeId) -> BTreeMap<&str, MethodId> {
    let mut unique: BTreeMap<&str, MethodId> = BTreeMap::new();
    let mut shared: BTreeSet<&str> = BTreeSet::new();
    for m in program.ty(ty).methods() {
        walk_instructions(program.method(*m).statements(), &mut |insn| {
            let Instruction::StringConstant(literal) = insn else {
                return;
            };
            let literal = literal.as_str();
            if shared.contains(literal) {
                return;
            }
            match unique.get(literal) {
                None => {
                    unique.insert(literal, *m);
                }
                Some(owner) if owner == m => {}
                Some(_) => {
                    unique.remove(literal);
                    shared.insert(literal);
                }
            }
        });
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::ast::Statement;
    use remapper_core::{MappingSet, MergeSettings, MethodEntry, TypeEntry};

    fn returning(literal: &str) -> Vec<Statement> {
        vec![Statement::Return(Some(Instruction::StringConstant(literal.into())))]
    }

    fn program(prefix: &str, interface_methods: &[usize]) -> Program {
        let mut p = Program::new();
        let base = p.add_type(TypeEntry::class(format!("{prefix}base"))).unwrap();
        let mut ty = TypeEntry::class(format!("{prefix}main")).extends(format!("{prefix}base"));
        for (i, _) in interface_methods.iter().enumerate() {
            ty = ty.implements(format!("{prefix}i{i}"));
        }
        let main = p.add_type(ty).unwrap();
        for (i, count) in interface_methods.iter().enumerate() {
            let inter = p.add_type(TypeEntry::interface(format!("{prefix}i{i}"))).unwrap();
            for j in 0..*count {
                p.add_method(inter, MethodEntry::new(format!("m{j}"), "()V").unwrap())
                    .unwrap();
            }
        }
        p.add_method(base, MethodEntry::new("b", "()V").unwrap()).unwrap();
        let ret = "()Ljava/lang/String;";
        p.add_method(main, MethodEntry::new("f", ret).unwrap().with_body(returning("alpha")))
            .unwrap();
        p.add_method(main, MethodEntry::new("g", ret).unwrap().with_body(returning("beta")))
            .unwrap();
        p.add_method(main, MethodEntry::new("h", ret).unwrap().with_body(returning("beta")))
            .unwrap();
        p
    }

    fn type_votes(engine: &MergeEngine<'_>, old: &str, new: &str) -> u32 {
        let o = engine.old().get(old).unwrap();
        let n = engine.new_program().get(new).unwrap();
        engine
            .ledger()
            .types
            .get(&Handle::Real(o))
            .map_or(0, |e| e.votes_for(n))
    }

    #[test]
    fn test_superclass_interfaces_and_literals() {
        let old = program("o", &[3, 20]);
        let new = program("n", &[4, 30]);
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        let (o, n) = (old.get("omain").unwrap(), new.get("nmain").unwrap());
        engine.confirm_type(Handle::Real(o), n).unwrap();
        MergeMatchedTypes.operate(&mut engine).unwrap();

        assert_eq!(type_votes(&engine, "obase", "nbase"), 1);
        assert_eq!(type_votes(&engine, "oi0", "ni0"), 1);
        assert_eq!(type_votes(&engine, "oi1", "ni1"), 0);

        let f = old.method_named(o, "f", "()Ljava/lang/String;").unwrap();
        let nf = new.method_named(n, "f", "()Ljava/lang/String;").unwrap();
        let g = old.method_named(o, "g", "()Ljava/lang/String;").unwrap();
        let entry = engine.ledger().methods.get(&Handle::Real(f)).unwrap();
        assert_eq!(entry.votes_for(nf), 1);
        assert!(engine.ledger().methods.get(&Handle::Real(g)).is_none());

        // a second run leaves the already expanded pair alone
        MergeMatchedTypes.operate(&mut engine).unwrap();
        assert_eq!(type_votes(&engine, "obase", "nbase"), 1);
    }

    #[test]
    fn test_close_interfaces_are_ambiguous() {
        let old = program("o", &[3]);
        let new = program("n", &[3, 4]);
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        let (o, n) = (old.get("omain").unwrap(), new.get("nmain").unwrap());
        engine.confirm_type(Handle::Real(o), n).unwrap();
        MergeMatchedTypes.operate(&mut engine).unwrap();
        assert_eq!(type_votes(&engine, "oi0", "ni0"), 0);
        assert_eq!(type_votes(&engine, "oi0", "ni1"), 0);
    }

    #[test]
    fn test_lone_methods_are_confirmed() {
        let mut old = Program::new();
        let a = old.add_type(TypeEntry::interface("a")).unwrap();
        let am = old.add_method(a, MethodEntry::new("x", "()V").unwrap()).unwrap();
        old.add_method(a, MethodEntry::new("y", "()V").unwrap().with_synthetic())
            .unwrap();
        let mut new = Program::new();
        let b = new.add_type(TypeEntry::interface("b")).unwrap();
        let bm = new.add_method(b, MethodEntry::new("z", "()V").unwrap()).unwrap();

        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine.confirm_type(Handle::Real(a), b).unwrap();
        MergeMatchedTypes.operate(&mut engine).unwrap();
        assert_eq!(engine.method_target(am), Some(bm));
    }
}
