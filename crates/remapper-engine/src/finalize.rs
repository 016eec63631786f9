//! Projects the confirmed ledger into the output mapping.

use remapper_core::Handle;
use tracing::debug;

use crate::engine::MergeEngine;

impl MergeEngine<'_> {
    /// Copy old plain names onto confirmed new counterparts, then number
    /// unnamed anonymous types after their outer type. Entries already in the
    /// output are kept.
    pub(crate) fn finalize(&mut self) {
        let (old, new) = (self.old, self.new);

        for entry in self.ledger.types.confirmed() {
            let Some(target) = entry.target() else {
                continue;
            };
            let plain = match entry.old() {
                Handle::Real(o) => self.old_mappings.map_type(&old.ty(*o).name),
                Handle::Synthetic(s) => Some(s.name.as_str()),
            };
            if let Some(plain) = plain {
                self.output.add_type(&new.ty(target).name, plain);
            }
        }

        if self.settings.name_anonymous_classes {
            self.name_anonymous_types();
        }

        for entry in self.ledger.fields.confirmed() {
            let Some(target) = entry.target() else {
                continue;
            };
            let field = new.field(target);
            let owner = new.field_owner_name(target);
            let plain = match entry.old() {
                Handle::Real(o) => self
                    .old_mappings
                    .map_field(old.field_owner_name(*o), &old.field(*o).name),
                Handle::Synthetic(s) if self.output.map_type(owner).is_some() => Some(s.name.as_str()),
                Handle::Synthetic(_) => None,
            };
            if let Some(plain) = plain {
                self.output.add_field(owner, &field.name, plain);
            }
        }

        for entry in self.ledger.methods.confirmed() {
            let Some(target) = entry.target() else {
                continue;
            };
            let method = new.method(target);
            let owner = new.owner_name(target);
            let plain = match entry.old() {
                Handle::Real(o) => {
                    let m = old.method(*o);
                    self.old_mappings.map_method(old.owner_name(*o), &m.name, &m.descriptor)
                }
                Handle::Synthetic(s) if self.output.map_type(owner).is_some() => Some(s.name.as_str()),
                Handle::Synthetic(_) => None,
            };
            if let Some(plain) = plain {
                self.output.add_method(owner, &method.name, &method.descriptor, plain);
            }
        }

        debug!(
            types = self.output.type_count(),
            fields = self.output.field_count(),
            methods = self.output.method_count(),
            "output mapping projected"
        );
    }

    fn name_anonymous_types(&mut self) {
        let new = self.new;
        let mut anonymous: Vec<&str> = new
            .type_ids()
            .map(|t| new.ty(t))
            .filter(|t| t.is_anonymous())
            .map(|t| t.name.as_str())
            .collect();
        anonymous.sort_unstable();

        for name in anonymous {
            if self.output.map_type(name).is_some() {
                continue;
            }
            let (Some(outer), Some(mut index)) = (
                name.rsplit_once('$').map(|(outer, _)| outer),
                remapper_core::model::anonymous_index(name),
            ) else {
                continue;
            };
            let Some(outer_plain) = self.output.map_type(outer).map(str::to_string) else {
                continue;
            };
            let mut plain = format!("{outer_plain}${index}");
            while self.output.inverse_type(&plain).is_some() {
                index += 1;
                plain = format!("{outer_plain}${index}");
            }
            self.output.add_type(name, &plain);
        }
    }
}

#[cfg(test)]
mod tests {
    use remapper_core::{
        FieldEntry, FieldId, Handle, MappingSet, MergeSettings, MethodEntry, MethodId, Program,
        Synthetic, TypeEntry, TypeId,
    };

    use crate::engine::MergeEngine;

    fn old_program() -> Program {
        let mut p = Program::new();
        let a = p.add_type(TypeEntry::class("a")).unwrap();
        p.add_field(a, FieldEntry::new("b", "I").unwrap()).unwrap();
        p.add_method(a, MethodEntry::new("c", "()V").unwrap()).unwrap();
        p
    }

    fn new_program() -> Program {
        let mut p = Program::new();
        let x = p.add_type(TypeEntry::class("x")).unwrap();
        p.add_type(TypeEntry::class("x$1")).unwrap();
        p.add_type(TypeEntry::class("x$2")).unwrap();
        p.add_field(x, FieldEntry::new("y", "I").unwrap()).unwrap();
        p.add_method(x, MethodEntry::new("z", "()V").unwrap()).unwrap();
        p.add_field(x, FieldEntry::new("w", "[Lx;").unwrap().with_static())
            .unwrap();
        p
    }

    fn old_mapping() -> MappingSet {
        let mut m = MappingSet::new();
        m.add_type("a", "net/Foo");
        m.add_field("a", "b", "count");
        m.add_method("a", "c", "()V", "reset");
        m
    }

    #[test]
    fn test_projects_confirmed_names() {
        let (old, new) = (old_program(), new_program());
        let mut seed = MappingSet::new();
        seed.add_type("q", "net/Foo$2");
        let mut engine = MergeEngine::new(&old, &old_mapping(), &new, seed, MergeSettings::default());
        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        engine.confirm_field(Handle::Real(FieldId(0)), FieldId(0)).unwrap();
        engine.confirm_method(Handle::Real(MethodId(0)), MethodId(0)).unwrap();
        engine
            .confirm_field(
                Handle::Synthetic(Synthetic {
                    owner: Some("net/Foo".into()),
                    name: "$VALUES".into(),
                    descriptor: None,
                }),
                FieldId(1),
            )
            .unwrap();
        engine.finalize();

        let out = engine.output();
        assert_eq!(out.map_type("x"), Some("net/Foo"));
        assert_eq!(out.map_field("x", "y"), Some("count"));
        assert_eq!(out.map_field("x", "w"), Some("$VALUES"));
        assert_eq!(out.map_method("x", "z", "()V"), Some("reset"));
        assert_eq!(out.map_type("x$1"), Some("net/Foo$1"));
        // net/Foo$2 already belongs to the seed entry
        assert_eq!(out.map_type("x$2"), Some("net/Foo$3"));
    }

    #[test]
    fn test_anonymous_naming_can_be_disabled() {
        let (old, new) = (old_program(), new_program());
        let settings = MergeSettings {
            name_anonymous_classes: false,
            ..MergeSettings::default()
        };
        let mut engine = MergeEngine::new(&old, &old_mapping(), &new, MappingSet::new(), settings);
        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        engine.finalize();
        assert_eq!(engine.output().map_type("x"), Some("net/Foo"));
        assert_eq!(engine.output().map_type("x$1"), None);
    }

    #[test]
    fn test_synthetic_member_needs_named_owner() {
        let (old, new) = (old_program(), new_program());
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        engine
            .confirm_method(
                Handle::Synthetic(Synthetic {
                    owner: None,
                    name: "values".into(),
                    descriptor: Some("()V".into()),
                }),
                MethodId(0),
            )
            .unwrap();
        engine.finalize();
        assert_eq!(engine.output().method_count(), 0);
    }
}
