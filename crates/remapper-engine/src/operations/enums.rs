//! Votes old enums onto new enums whose constants are a superset.

use remapper_core::{Program, TypeEntry, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

pub struct MatchEnums;

fn candidate_enums(program: &Program) -> Vec<TypeId> {
    program
        .type_ids()
        .filter(|t| {
            let entry = program.ty(*t);
            entry.is_enum() && !entry.is_anonymous() && !entry.enum_constants.is_empty()
        })
        .collect()
}

fn constants_subset(old: &TypeEntry, new: &TypeEntry) -> bool {
    old.enum_constants.len() <= new.enum_constants.len()
        && old.enum_constants.iter().all(|c| new.enum_constants.contains(c))
}

impl MergeOperation for MatchEnums {
    fn name(&self) -> &str {
        "enums"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let (old, new) = (engine.old, engine.new);
        let old_enums = candidate_enums(old);
        let mut votes = 0;
        for n in candidate_enums(new) {
            let new_entry = new.ty(n);
            for o in &old_enums {
                let old_entry = old.ty(*o);
                if old_entry.is_inner() != new_entry.is_inner() {
                    continue;
                }
                if constants_subset(old_entry, new_entry) && engine.vote_type(*o, n) {
                    votes += 1;
                }
            }
        }
        debug!(pass = self.name(), votes, "enum constants compared");
        Ok(())
    }
}
