//! Pairs types through string literals that occur in exactly one type.

use std::collections::{BTreeMap, BTreeSet};

use remapper_core::ast::{walk_instructions, Instruction};
use remapper_core::{Handle, Program, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

pub struct MatchStringConstants;

impl MergeOperation for MatchStringConstants {
    fn name(&self) -> &str {
        "string_constants"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let old_unique = unique_constants(engine.old);
        let new_unique = unique_constants(engine.new);

        let mut pairs: BTreeMap<TypeId, TypeId> = BTreeMap::new();
        let mut conflicted = BTreeSet::new();
        for (literal, old_ty) in &old_unique {
            if conflicted.contains(old_ty) {
                continue;
            }
            let Some(new_ty) = new_unique.get(literal) else {
                continue;
            };
            match pairs.get(old_ty) {
                None => {
                    pairs.insert(*old_ty, *new_ty);
                }
                Some(prev) if prev == new_ty => {}
                Some(_) => {
                    pairs.remove(old_ty);
                    conflicted.insert(*old_ty);
                }
            }
        }

        // a new type claimed by two old types pairs with neither
        let mut claims: BTreeMap<TypeId, usize> = BTreeMap::new();
        for new_ty in pairs.values() {
            *claims.entry(*new_ty).or_insert(0) += 1;
        }
        pairs.retain(|_, new_ty| claims.get(new_ty) == Some(&1));

        let mut confirmed = 0;
        for (old_ty, new_ty) in pairs {
            if engine.confirm_type(Handle::Real(old_ty), new_ty)? {
                confirmed += 1;
            }
        }
        debug!(pass = self.name(), confirmed, "unique string constants paired");
        Ok(())
    }
}

/// Literal to owning type, for literals used by exactly one type.
pub(crate) fn unique_constants(program: &Program) -> BTreeMap<&str, TypeId> {
    let mut unique: BTreeMap<&str, TypeId> = BTreeMap::new();
    let mut shared: BTreeSet<&str> = BTreeSet::new();
    for ty in program.type_ids() {
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
                        unique.insert(literal, ty);
                    }
                    Some(owner) if *owner == ty => {}
                    Some(_) => {
                        unique.remove(literal);
                        shared.insert(literal);
                    }
                }
            });
        }
    }
    unique
}
