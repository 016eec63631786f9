//! Structural merging of newly confirmed member pairs.

use remapper_core::Handle;
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;
use crate::tree_merge::{merge_fields, merge_methods};

/// Runs the tree merger over each confirmed method pair once.
pub struct MergeMatchedMethods;

impl MergeOperation for MergeMatchedMethods {
    fn name(&self) -> &str {
        "matched_methods"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let mut merged = 0;
        let mut diverged = 0;
        for (o, n) in engine.method_pairs() {
            if !engine.ledger.methods.mark_merged(&Handle::Real(o)) {
                continue;
            }
            merged += 1;
            if !merge_methods(engine, o, n) {
                diverged += 1;
            }
        }
        debug!(pass = self.name(), merged, diverged, "method bodies merged");
        Ok(())
    }
}

/// Votes the declared types of each confirmed field pair once.
pub struct MergeMatchedFields;

impl MergeOperation for MergeMatchedFields {
    fn name(&self) -> &str {
        "matched_fields"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let mut merged = 0;
        for (o, n) in engine.field_pairs() {
            if !engine.ledger.fields.mark_merged(&Handle::Real(o)) {
                continue;
            }
            merge_fields(engine, o, n);
            merged += 1;
        }
        debug!(pass = self.name(), merged, "field types merged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::ast::{Instruction, Statement};
    use remapper_core::{
        FieldEntry, FieldId, MappingSet, MergeSettings, MethodEntry, MethodId, Program, TypeEntry,
        TypeId,
    };

    fn program(owner: &str, other: &str, field: &str) -> Program {
        let mut p = Program::new();
        let a = p.add_type(TypeEntry::class(owner)).unwrap();
        let b = p.add_type(TypeEntry::class(other)).unwrap();
        p.add_field(b, FieldEntry::new(field, "I").unwrap().with_static())
            .unwrap();
        p.add_field(a, FieldEntry::new("link", format!("L{other};")).unwrap())
            .unwrap();
        let body = vec![Statement::Return(Some(Instruction::StaticFieldAccess {
            owner: other.into(),
            name: field.into(),
            descriptor: "I".into(),
        }))];
        p.add_method(a, MethodEntry::new("get", "()I").unwrap().with_body(body))
            .unwrap();
        p
    }

    fn engine<'p>(old: &'p Program, new: &'p Program) -> MergeEngine<'p> {
        let mut engine =
            MergeEngine::new(old, &MappingSet::new(), new, MappingSet::new(), MergeSettings::default());
        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        engine
    }

    #[test]
    fn test_confirmed_method_body_is_merged_once() {
        let old = program("a", "b", "f");
        let new = program("x", "y", "g");
        let mut engine = engine(&old, &new);
        engine.confirm_method(Handle::Real(MethodId(0)), MethodId(0)).unwrap();

        MergeMatchedMethods.operate(&mut engine).unwrap();
        MergeMatchedMethods.operate(&mut engine).unwrap();

        let ty = engine.ledger().types.get(&Handle::Real(TypeId(1))).unwrap();
        assert_eq!(ty.votes_for(TypeId(1)), 1);
        let field = engine.ledger().fields.get(&Handle::Real(FieldId(0))).unwrap();
        assert_eq!(field.votes_for(FieldId(0)), 1);
        assert!(engine.ledger().methods.get(&Handle::Real(MethodId(0))).unwrap().is_merged());
    }

    #[test]
    fn test_confirmed_field_votes_declared_type() {
        let old = program("a", "b", "f");
        let new = program("x", "y", "g");
        let mut engine = engine(&old, &new);
        engine.confirm_field(Handle::Real(FieldId(1)), FieldId(1)).unwrap();

        MergeMatchedFields.operate(&mut engine).unwrap();
        let ty = engine.ledger().types.get(&Handle::Real(TypeId(1))).unwrap();
        assert_eq!(ty.votes_for(TypeId(1)), 1);
    }
}
