//! Reference matching: who reads, writes, calls or instantiates what.
//!
//! Both programs are indexed once. Each cycle, the referrers of every
//! confirmed member pair (and of every shared external reference) are
//! compared: when both sides collapse to a single owning type, the owners
//! are voted, and referrers inside already matched owners are paired by
//! elimination.

use std::collections::{BTreeMap, BTreeSet};

use remapper_core::ast::{walk_instructions, walk_statements, Instruction, Statement};
use remapper_core::descriptor::TypeSig;
use remapper_core::{FieldId, MethodId, Program, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::operations::discrete::match_discrete_methods;
use crate::pipeline::MergeOperation;

/// A reference to something outside the program, keyed by its text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ExternalRef {
    Read(String),
    Write(String),
    Invoke(String),
    Init(String),
    ArrayInit(String),
}

type Referrers = BTreeSet<MethodId>;

#[derive(Debug, Default)]
struct RefIndex {
    reads: BTreeMap<FieldId, Referrers>,
    writes: BTreeMap<FieldId, Referrers>,
    invokes: BTreeMap<MethodId, Referrers>,
    inits: BTreeMap<TypeId, Referrers>,
    array_inits: BTreeMap<TypeId, Referrers>,
    external: BTreeMap<ExternalRef, Referrers>,
    /// Methods instantiating exactly one anonymous type.
    anonymous: BTreeMap<MethodId, TypeId>,
}

fn innermost_class(sig: &TypeSig) -> Option<&str> {
    match sig {
        TypeSig::Array(inner) => innermost_class(inner),
        other => other.class_name(),
    }
}

impl RefIndex {
    fn build(program: &Program) -> Self {
        let mut index = RefIndex::default();
        for m in program.method_ids() {
            index.scan(program, m);
        }
        index
    }

    fn scan(&mut self, program: &Program, m: MethodId) {
        let body = program.method(m).statements();
        walk_statements(body, &mut |stmt| match stmt {
            Statement::InstanceFieldAssignment { owner, name, .. }
            | Statement::StaticFieldAssignment { owner, name, .. } => {
                match program.get(owner).and_then(|t| program.find_field(t, name)) {
                    Some(f) => self.writes.entry(f).or_default().insert(m),
                    None => self
                        .external
                        .entry(ExternalRef::Write(format!("{owner}.{name}")))
                        .or_default()
                        .insert(m),
                };
            }
            _ => {}
        });

        let mut anonymous_sites = Vec::new();
        walk_instructions(body, &mut |insn| match insn {
            Instruction::InstanceFieldAccess { owner, name, .. }
            | Instruction::StaticFieldAccess { owner, name, .. } => {
                match program.get(owner).and_then(|t| program.find_field(t, name)) {
                    Some(f) => self.reads.entry(f).or_default().insert(m),
                    None => self
                        .external
                        .entry(ExternalRef::Read(format!("{owner}.{name}")))
                        .or_default()
                        .insert(m),
                };
            }
            Instruction::InstanceMethodInvoke {
                owner,
                name,
                descriptor,
                ..
            }
            | Instruction::StaticMethodInvoke {
                owner,
                name,
                descriptor,
                ..
            } => {
                let is_static = matches!(insn, Instruction::StaticMethodInvoke { .. });
                let target = program.get(owner).and_then(|t| {
                    if is_static {
                        program.find_static_method(t, name, descriptor)
                    } else {
                        program.find_method(t, name, descriptor)
                    }
                });
                match target {
                    Some(callee) => self.invokes.entry(callee).or_default().insert(m),
                    None => self
                        .external
                        .entry(ExternalRef::Invoke(format!("{owner}.{name}{descriptor}")))
                        .or_default()
                        .insert(m),
                };
            }
            Instruction::New { ty, .. } => {
                let Some(class) = ty.class_name() else {
                    return;
                };
                match program.get(class) {
                    Some(t) => {
                        self.inits.entry(t).or_default().insert(m);
                        if program.ty(t).is_anonymous() {
                            anonymous_sites.push(t);
                        }
                    }
                    None => {
                        self.external
                            .entry(ExternalRef::Init(class.to_string()))
                            .or_default()
                            .insert(m);
                    }
                }
            }
            Instruction::NewArray { ty, .. } | Instruction::MultiNewArray { ty, .. } => {
                let Some(class) = innermost_class(ty) else {
                    return;
                };
                match program.get(class) {
                    Some(t) => self.array_inits.entry(t).or_default().insert(m),
                    None => self
                        .external
                        .entry(ExternalRef::ArrayInit(class.to_string()))
                        .or_default()
                        .insert(m),
                };
            }
            _ => {}
        });
        if let [only] = anonymous_sites.as_slice() {
            self.anonymous.insert(m, *only);
        }
    }
}

/// Group referrers by their declaring type.
fn by_owner(program: &Program, referrers: &Referrers) -> BTreeMap<TypeId, Vec<MethodId>> {
    let mut out: BTreeMap<TypeId, Vec<MethodId>> = BTreeMap::new();
    for m in referrers {
        out.entry(program.method(*m).owner).or_default().push(*m);
    }
    out
}

fn match_referrers(engine: &mut MergeEngine<'_>, old_refs: &Referrers, new_refs: &Referrers) -> usize {
    let old_by_type = by_owner(engine.old, old_refs);
    let new_by_type = by_owner(engine.new, new_refs);
    let mut votes = 0;
    if let ([(o, _)], [(n, _)]) = (
        old_by_type.iter().collect::<Vec<_>>().as_slice(),
        new_by_type.iter().collect::<Vec<_>>().as_slice(),
    ) {
        if engine.vote_type(**o, **n) {
            votes += 1;
        }
    }
    for (old_ty, old_methods) in &old_by_type {
        let Some(new_ty) = engine.type_target(*old_ty) else {
            continue;
        };
        if let Some(new_methods) = new_by_type.get(&new_ty) {
            votes += match_discrete_methods(engine, old_methods, new_methods);
        }
    }
    votes
}

#[derive(Default)]
pub struct MatchReferences {
    index: Option<(RefIndex, RefIndex)>,
}

impl MergeOperation for MatchReferences {
    fn name(&self) -> &str {
        "references"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let (old, new) = (engine.old, engine.new);
        let (old_index, new_index) = self
            .index
            .get_or_insert_with(|| (RefIndex::build(old), RefIndex::build(new)));
        let empty = Referrers::new();
        let mut votes = 0;

        for (key, old_refs) in &old_index.external {
            let new_refs = new_index.external.get(key).unwrap_or(&empty);
            votes += match_referrers(engine, old_refs, new_refs);
        }

        for (o, n) in engine.type_pairs() {
            for (old_map, new_map) in [
                (&old_index.inits, &new_index.inits),
                (&old_index.array_inits, &new_index.array_inits),
            ] {
                if let (Some(old_refs), Some(new_refs)) = (old_map.get(&o), new_map.get(&n)) {
                    votes += match_referrers(engine, old_refs, new_refs);
                }
            }

            for f in old.ty(o).fields() {
                let Some(nf) = engine.field_target(*f) else {
                    continue;
                };
                for (old_map, new_map) in [
                    (&old_index.reads, &new_index.reads),
                    (&old_index.writes, &new_index.writes),
                ] {
                    let old_refs = old_map.get(f).unwrap_or(&empty);
                    let new_refs = new_map.get(&nf).unwrap_or(&empty);
                    votes += match_referrers(engine, old_refs, new_refs);
                }
            }

            for m in old.ty(o).methods() {
                let Some(nm) = engine.method_target(*m) else {
                    continue;
                };
                if let (Some(oa), Some(na)) = (old_index.anonymous.get(m), new_index.anonymous.get(&nm)) {
                    if engine.vote_type(*oa, *na) {
                        votes += 1;
                    }
                }
                let old_refs = old_index.invokes.get(m).unwrap_or(&empty);
                let new_refs = new_index.invokes.get(&nm).unwrap_or(&empty);
                votes += match_referrers(engine, old_refs, new_refs);
            }
        }
        debug!(pass = self.name(), votes, "references compared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::{FieldEntry, Handle, MappingSet, MergeSettings, MethodEntry, TypeEntry};

    /// `owner` holds field `f`; `user` has one method reading it and one
    /// creating the anonymous type `owner$1`.
    fn program(owner: &str, user: &str, reader: &str) -> Program {
        let mut p = Program::new();
        let o = p.add_type(TypeEntry::class(owner)).unwrap();
        p.add_type(TypeEntry::class(format!("{owner}$1"))).unwrap();
        let u = p.add_type(TypeEntry::class(user)).unwrap();
        p.add_field(o, FieldEntry::new("f", "I").unwrap().with_static())
            .unwrap();
        p.add_method(
            u,
            MethodEntry::new(reader, "()I")
                .unwrap()
                .with_static()
                .with_body(vec![Statement::Return(Some(Instruction::StaticFieldAccess {
                    owner: owner.into(),
                    name: "f".into(),
                    descriptor: "I".into(),
                }))]),
        )
        .unwrap();
        p.add_method(
            o,
            MethodEntry::new("make", "()V").unwrap().with_body(vec![Statement::Invoke(
                Instruction::New {
                    ty: TypeSig::class(format!("{owner}$1")),
                    ctor_descriptor: "()V".into(),
                    args: vec![],
                },
            )]),
        )
        .unwrap();
        p
    }

    #[test]
    fn test_index_records_sites() {
        let p = program("a", "b", "r");
        let index = RefIndex::build(&p);
        assert_eq!(index.reads.get(&FieldId(0)).unwrap().len(), 1);
        assert_eq!(index.anonymous.get(&MethodId(1)), Some(&TypeId(1)));
        assert!(index.inits.contains_key(&TypeId(1)));
    }

    #[test]
    fn test_field_readers_vote_owner_and_method() {
        let old = program("a", "b", "r");
        let new = program("x", "y", "s");
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        engine.confirm_type(Handle::Real(TypeId(2)), TypeId(2)).unwrap();
        engine.confirm_field(Handle::Real(FieldId(0)), FieldId(0)).unwrap();
        engine.confirm_method(Handle::Real(MethodId(1)), MethodId(1)).unwrap();

        MatchReferences::default().operate(&mut engine).unwrap();

        let reader = engine.ledger().methods.get(&Handle::Real(MethodId(0))).unwrap();
        assert_eq!(reader.highest(), Some(MethodId(0)));
        let anon = engine.ledger().types.get(&Handle::Real(TypeId(1))).unwrap();
        assert_eq!(anon.highest(), Some(TypeId(1)));
    }
}
