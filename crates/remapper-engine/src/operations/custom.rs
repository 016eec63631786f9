//! Hand-written mergers for registration methods whose bodies are too
//! irregular for the tree merger.
//!
//! Handlers are looked up by the old method's signature expressed in old
//! plain names. A handled pair is flagged as merged so the generic body
//! merge skips it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use remapper_core::ast::{Instruction, Statement};
use remapper_core::{FieldId, Handle, MethodId, Program};
use tracing::{debug, trace};

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;
use crate::tree_merge::merge_instruction;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodKey {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodKey {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// Key of an old method in the old mapping's plain names. Unmapped
    /// parts keep their obfuscated text.
    fn of_old(engine: &MergeEngine<'_>, method: MethodId) -> Self {
        let entry = engine.old.method(method);
        let owner = engine.old.owner_name(method);
        let mappings = &engine.old_mappings;
        Self {
            owner: mappings.map_type_safe(owner).to_string(),
            name: mappings
                .map_method(owner, &entry.name, &entry.descriptor)
                .unwrap_or(&entry.name)
                .to_string(),
            descriptor: mappings.map_descriptor(&entry.descriptor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomHandler {
    /// Static fields assigned from a static factory taking one string.
    RegistryInitializer,
    /// Static fields assigned from `new T("key", ...)`, possibly wrapped in
    /// builder calls.
    KeyedConstructorTable,
    /// Consumed without voting.
    Skip,
}

const REGISTRY_INITIALIZERS: &[&str] = &[
    "net/minecraft/init/SoundEvents",
    "net/minecraft/init/Blocks",
    "net/minecraft/init/Items",
    "net/minecraft/init/Biomes",
    "net/minecraft/init/MobEffects",
    "net/minecraft/init/PotionTypes",
    "net/minecraft/init/Enchantments",
    "net/minecraft/world/storage/loot/LootTableList",
];

/// The built-in handler table.
pub fn registry() -> &'static BTreeMap<MethodKey, CustomHandler> {
    static REGISTRY: OnceLock<BTreeMap<MethodKey, CustomHandler>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut table = BTreeMap::new();
        for owner in REGISTRY_INITIALIZERS {
            table.insert(
                MethodKey::new(owner, "<clinit>", "()V"),
                CustomHandler::RegistryInitializer,
            );
        }
        table.insert(
            MethodKey::new("net/minecraft/stats/StatList", "<clinit>", "()V"),
            CustomHandler::KeyedConstructorTable,
        );
        let data_fixes = "net/minecraft/util/datafix/DataFixesManager";
        table.insert(
            MethodKey::new(data_fixes, "func_188276_a", "(Lnet/minecraft/util/datafix/DataFixer;)V"),
            CustomHandler::Skip,
        );
        table.insert(
            MethodKey::new(data_fixes, "func_188279_a", "()Lnet/minecraft/util/datafix/DataFixer;"),
            CustomHandler::Skip,
        );
        table
    })
}

impl CustomHandler {
    fn apply(self, engine: &mut MergeEngine<'_>, old: MethodId, new: MethodId) -> usize {
        let (old_program, new_program) = (engine.old, engine.new);
        let (Some(old_body), Some(new_body)) = (
            old_program.method(old).body.as_deref(),
            new_program.method(new).body.as_deref(),
        ) else {
            return 0;
        };
        match self {
            CustomHandler::RegistryInitializer => {
                merge_registrations(engine, old_body, new_body)
            }
            CustomHandler::KeyedConstructorTable => merge_keyed_table(engine, old_body, new_body),
            CustomHandler::Skip => 0,
        }
    }
}

#[derive(Default)]
pub struct CustomMethodMergers {
    offered: BTreeSet<MethodId>,
}

impl MergeOperation for CustomMethodMergers {
    fn name(&self) -> &str {
        "custom_mergers"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let mut handled = 0;
        let mut votes = 0;
        for (o, n) in engine.method_pairs() {
            if !self.offered.insert(o) {
                continue;
            }
            let key = MethodKey::of_old(engine, o);
            let Some(handler) = registry().get(&key) else {
                continue;
            };
            if !engine.ledger.methods.mark_merged(&Handle::Real(o)) {
                continue;
            }
            trace!(owner = %key.owner, name = %key.name, ?handler, "custom merger");
            votes += handler.apply(engine, o, n);
            handled += 1;
        }
        debug!(pass = self.name(), handled, votes, "custom mergers applied");
        Ok(())
    }
}

fn strip_cast(value: &Instruction) -> &Instruction {
    match value {
        Instruction::Cast { value, .. } => value,
        other => other,
    }
}

/// Follow builder chains down to the innermost callee.
fn strip_builders(mut value: &Instruction) -> &Instruction {
    while let Instruction::InstanceMethodInvoke { callee, .. } = value {
        value = callee;
    }
    value
}

fn static_field(program: &Program, owner: &str, name: &str) -> Option<FieldId> {
    let field = program.field_named(program.get(owner)?, name)?;
    program.field(field).is_static.then_some(field)
}

/// Top-level static field assignments whose target is part of `program`.
fn static_assignments<'a>(
    program: &'a Program,
    body: &'a [Statement],
) -> impl Iterator<Item = (FieldId, &'a Instruction)> + 'a {
    body.iter().filter_map(move |stmt| match stmt {
        Statement::StaticFieldAssignment { owner, name, value, .. } => {
            Some((static_field(program, owner, name)?, value))
        }
        _ => None,
    })
}

struct Registration<'a> {
    field: FieldId,
    factory: Option<MethodId>,
    key: Option<&'a str>,
}

fn registrations<'a>(program: &'a Program, body: &'a [Statement]) -> Vec<Registration<'a>> {
    static_assignments(program, body)
        .filter_map(|(field, value)| {
            let Instruction::StaticMethodInvoke { owner, name, descriptor, args } = strip_cast(value)
            else {
                return None;
            };
            let factory = program
                .get(owner)
                .and_then(|ty| program.method_named(ty, name, descriptor))
                .filter(|m| program.method(*m).is_static);
            let key = match args.as_slice() {
                [Instruction::StringConstant(key)] => Some(key.as_str()),
                _ => None,
            };
            Some(Registration { field, factory, key })
        })
        .collect()
}

fn merge_registrations(engine: &mut MergeEngine<'_>, old: &[Statement], new: &[Statement]) -> usize {
    let (old_program, new_program) = (engine.old, engine.new);
    let old_regs = registrations(old_program, old);
    let old_factory = old_regs.iter().rev().find_map(|r| r.factory);
    let old_keyed: BTreeMap<&str, FieldId> = old_regs
        .iter()
        .filter_map(|r| Some((r.key?, r.field)))
        .collect();

    let mut votes = 0;
    for reg in registrations(new_program, new) {
        if let (Some(o), Some(n)) = (old_factory, reg.factory) {
            if engine.vote_method(o, n) {
                votes += 1;
            }
        }
        let Some(old_field) = reg.key.and_then(|k| old_keyed.get(k)) else {
            continue;
        };
        if engine.vote_field(*old_field, reg.field) {
            votes += 1;
        }
    }
    votes
}

/// `key -> (field, constructor call)` for fields built from a keyed `new`.
fn keyed_constructors<'a>(
    program: &'a Program,
    body: &'a [Statement],
) -> BTreeMap<&'a str, (FieldId, &'a Instruction)> {
    let mut table = BTreeMap::new();
    for (field, value) in static_assignments(program, body) {
        let ctor = strip_builders(strip_cast(value));
        let Instruction::New { args, .. } = ctor else {
            continue;
        };
        if let Some(Instruction::StringConstant(key)) = args.first() {
            table.insert(key.as_str(), (field, ctor));
        }
    }
    table
}

fn merge_keyed_table(engine: &mut MergeEngine<'_>, old: &[Statement], new: &[Statement]) -> usize {
    let (old_program, new_program) = (engine.old, engine.new);
    let old_table = keyed_constructors(old_program, old);
    let mut votes = 0;
    for (key, (new_field, new_ctor)) in keyed_constructors(new_program, new) {
        let Some((old_field, old_ctor)) = old_table.get(key) else {
            continue;
        };
        if engine.vote_field(*old_field, new_field) {
            votes += 1;
        }
        merge_instruction(engine, old_ctor, new_ctor);
    }
    votes
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::descriptor::TypeSig;
    use remapper_core::{FieldEntry, MappingSet, MergeSettings, MethodEntry, TypeEntry, TypeId};

    fn factory_call(owner: &str, key: &str) -> Instruction {
        Instruction::Cast {
            ty: TypeSig::class(owner),
            value: Box::new(Instruction::StaticMethodInvoke {
                owner: owner.into(),
                name: "get".into(),
                descriptor: format!("(Ljava/lang/String;)L{owner};"),
                args: vec![Instruction::StringConstant(key.into())],
            }),
        }
    }

    fn assign(owner: &str, field: &str, value: Instruction) -> Statement {
        Statement::StaticFieldAssignment {
            owner: owner.into(),
            name: field.into(),
            descriptor: "Ljava/lang/Object;".into(),
            value,
        }
    }

    /// `holder` with two static fields filled in its initializer, plus a
    /// factory type `factory`.
    fn registry_program(holder: &str, factory: &str, fields: [&str; 2], body: Vec<Statement>) -> Program {
        let mut p = Program::new();
        let h = p.add_type(TypeEntry::class(holder)).unwrap();
        let f = p.add_type(TypeEntry::class(factory)).unwrap();
        for name in fields {
            p.add_field(h, FieldEntry::new(name, "Ljava/lang/Object;").unwrap().with_static())
                .unwrap();
        }
        p.add_method(
            f,
            MethodEntry::new("get", format!("(Ljava/lang/String;)L{factory};"))
                .unwrap()
                .with_static(),
        )
        .unwrap();
        p.add_method(h, MethodEntry::new("<clinit>", "()V").unwrap().with_static().with_body(body))
            .unwrap();
        p
    }

    fn holder_mapping(plain: &str) -> MappingSet {
        let mut m = MappingSet::new();
        m.add_type("a", plain);
        m
    }

    #[test]
    fn test_registry_lookup_by_old_plain_names() {
        let old = registry_program("a", "s", ["b", "c"], Vec::new());
        let new = registry_program("x", "t", ["y", "z"], Vec::new());
        let engine = MergeEngine::new(
            &old,
            &holder_mapping("net/minecraft/init/SoundEvents"),
            &new,
            MappingSet::new(),
            MergeSettings::default(),
        );
        let clinit = old.static_initializer(TypeId(0)).unwrap();
        let key = MethodKey::of_old(&engine, clinit);
        assert_eq!(key, MethodKey::new("net/minecraft/init/SoundEvents", "<clinit>", "()V"));
        assert_eq!(registry().get(&key), Some(&CustomHandler::RegistryInitializer));
        assert!(registry()
            .get(&MethodKey::new("net/minecraft/init/Unknown", "<clinit>", "()V"))
            .is_none());
    }

    #[test]
    fn test_registry_initializer_pairs_fields_by_key() {
        let old = registry_program(
            "a",
            "s",
            ["b", "c"],
            vec![
                assign("a", "b", factory_call("s", "ambient.cave")),
                assign("a", "c", factory_call("s", "block.stone")),
            ],
        );
        let new = registry_program(
            "x",
            "t",
            ["y", "z"],
            vec![
                assign("x", "y", factory_call("t", "block.stone")),
                assign("x", "z", factory_call("t", "ambient.cave")),
            ],
        );
        let mut engine = MergeEngine::new(
            &old,
            &holder_mapping("net/minecraft/init/SoundEvents"),
            &new,
            MappingSet::new(),
            MergeSettings::default(),
        );
        engine.confirm_type(Handle::Real(TypeId(0)), TypeId(0)).unwrap();
        let (oc, nc) = (old.static_initializer(TypeId(0)).unwrap(), new.static_initializer(TypeId(0)).unwrap());
        engine.confirm_method(Handle::Real(oc), nc).unwrap();

        let mut op = CustomMethodMergers::default();
        op.operate(&mut engine).unwrap();
        op.operate(&mut engine).unwrap();

        let fields = &engine.ledger().fields;
        assert_eq!(fields.get(&Handle::Real(FieldId(0))).unwrap().votes_for(FieldId(1)), 1);
        assert_eq!(fields.get(&Handle::Real(FieldId(1))).unwrap().votes_for(FieldId(0)), 1);
        let factory = engine.ledger().methods.get(&Handle::Real(MethodId(0))).unwrap();
        assert_eq!(factory.votes_for(MethodId(0)), 2);
        assert!(engine.ledger().methods.get(&Handle::Real(oc)).unwrap().is_merged());
    }

    fn keyed(owner: &str, key: &str) -> Instruction {
        Instruction::InstanceMethodInvoke {
            owner: owner.into(),
            name: "register".into(),
            descriptor: format!("()L{owner};"),
            callee: Box::new(Instruction::New {
                ty: TypeSig::class(owner),
                ctor_descriptor: "(Ljava/lang/String;)V".into(),
                args: vec![Instruction::StringConstant(key.into())],
            }),
            args: Vec::new(),
        }
    }

    #[test]
    fn test_keyed_table_merges_constructors() {
        let old = registry_program(
            "a",
            "s",
            ["b", "c"],
            vec![assign("a", "b", keyed("s", "jump")), assign("a", "c", keyed("s", "swim"))],
        );
        let new = registry_program(
            "x",
            "t",
            ["y", "z"],
            vec![assign("x", "y", keyed("t", "swim")), assign("x", "z", keyed("t", "jump"))],
        );
        let mut engine = MergeEngine::new(
            &old,
            &holder_mapping("net/minecraft/stats/StatList"),
            &new,
            MappingSet::new(),
            MergeSettings::default(),
        );
        let (oc, nc) = (old.static_initializer(TypeId(0)).unwrap(), new.static_initializer(TypeId(0)).unwrap());
        engine.confirm_method(Handle::Real(oc), nc).unwrap();
        CustomMethodMergers::default().operate(&mut engine).unwrap();

        let fields = &engine.ledger().fields;
        assert_eq!(fields.get(&Handle::Real(FieldId(0))).unwrap().votes_for(FieldId(1)), 1);
        assert_eq!(fields.get(&Handle::Real(FieldId(1))).unwrap().votes_for(FieldId(0)), 1);
        let ty = engine.ledger().types.get(&Handle::Real(TypeId(1))).unwrap();
        assert_eq!(ty.votes_for(TypeId(1)), 2);
    }

    #[test]
    fn test_unregistered_pair_is_left_for_tree_merge() {
        let old = registry_program("a", "s", ["b", "c"], Vec::new());
        let new = registry_program("x", "t", ["y", "z"], Vec::new());
        let mut engine =
            MergeEngine::new(&old, &MappingSet::new(), &new, MappingSet::new(), MergeSettings::default());
        let (oc, nc) = (old.static_initializer(TypeId(0)).unwrap(), new.static_initializer(TypeId(0)).unwrap());
        engine.confirm_method(Handle::Real(oc), nc).unwrap();
        CustomMethodMergers::default().operate(&mut engine).unwrap();
        assert!(!engine.ledger().methods.get(&Handle::Real(oc)).unwrap().is_merged());
    }
}
