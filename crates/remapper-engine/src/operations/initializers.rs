//! Links static initializers of confirmed type pairs.

use std::collections::BTreeSet;

use remapper_core::{Handle, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

#[derive(Default)]
pub struct MergeInitializers {
    handled: BTreeSet<TypeId>,
}

impl MergeOperation for MergeInitializers {
    fn name(&self) -> &str {
        "initializers"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let (old, new) = (engine.old, engine.new);
        let mut confirmed = 0;
        for (o, n) in engine.type_pairs() {
            if !self.handled.insert(n) {
                continue;
            }
            let (Some(old_clinit), Some(new_clinit)) = (old.static_initializer(o), new.static_initializer(n))
            else {
                continue;
            };
            if engine.confirm_method(Handle::Real(old_clinit), new_clinit)? {
                confirmed += 1;
            }
        }
        debug!(pass = self.name(), confirmed, "static initializers linked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::{MappingSet, MergeSettings, MethodEntry, Program, TypeEntry};

    fn with_clinit(name: &str) -> Program {
        let mut p = Program::new();
        let t = p.add_type(TypeEntry::class(name)).unwrap();
        p.add_method(t, MethodEntry::new("<clinit>", "()V").unwrap().with_static())
            .unwrap();
        p
    }

    #[test]
    fn test_links_once_per_new_type() {
        let old = with_clinit("a");
        let new = with_clinit("x");
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        let mut pass = MergeInitializers::default();
        pass.operate(&mut engine).unwrap();
        assert_eq!(engine.ledger().methods.confirmed_count(), 0);

        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        pass.operate(&mut engine).unwrap();
        assert!(engine.method_target(remapper_core::MethodId(0)).is_some());
        assert!(pass.handled.contains(&TypeId(0)));
        let changes = engine.take_changes();
        pass.operate(&mut engine).unwrap();
        assert_eq!(changes, 2);
        assert_eq!(engine.changes(), 0);
    }
}
