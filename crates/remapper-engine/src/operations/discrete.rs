//! Matching by elimination inside confirmed type pairs.
//!
//! Unmatched members are keyed by their descriptor, with every class
//! reference rewritten to a name both sides agree on: the old plain name of
//! a confirmed type, the literal name of a type outside the program, and `*`
//! for a program type that is still unmatched. A key held by exactly one
//! member on each side yields a vote; a key held twice on either side is
//! dropped.

use std::collections::{BTreeMap, BTreeSet};

use remapper_core::descriptor::{element_class, return_descriptor, split_params};
use remapper_core::{FieldId, Handle, MethodId, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Old,
    New,
}

fn class_key(engine: &MergeEngine<'_>, side: Side, class: &str) -> Option<String> {
    match side {
        Side::Old => match engine.old.get(class) {
            None => Some(class.to_string()),
            Some(ty) => engine
                .type_target(ty)
                .map(|_| engine.old_mapped_type(class).to_string()),
        },
        Side::New => match engine.new.get(class) {
            None => Some(class.to_string()),
            Some(_) => engine.new_mapped_type(class),
        },
    }
}

pub(crate) fn field_key(engine: &MergeEngine<'_>, side: Side, desc: &str) -> String {
    match element_class(desc) {
        (dims, Some(class)) => match class_key(engine, side, class) {
            Some(key) => format!("{}L{key};", "[".repeat(dims)),
            None => "*".to_string(),
        },
        (_, None) => desc.to_string(),
    }
}

pub(crate) fn method_key(engine: &MergeEngine<'_>, side: Side, name: &str, desc: &str) -> String {
    let mut key = String::new();
    // special names survive obfuscation
    if name.starts_with('<') {
        key.push_str(name);
    }
    key.push('(');
    for param in split_params(desc) {
        key.push_str(&field_key(engine, side, &param));
    }
    key.push(')');
    key.push_str(&field_key(engine, side, return_descriptor(desc)));
    key
}

/// Items whose key no other item shares.
fn unique_by_key<T>(items: impl IntoIterator<Item = (String, T)>) -> BTreeMap<String, T> {
    let mut unique = BTreeMap::new();
    let mut ambiguous = BTreeSet::new();
    for (key, item) in items {
        if ambiguous.contains(&key) {
            continue;
        }
        if unique.remove(&key).is_some() {
            ambiguous.insert(key);
        } else {
            unique.insert(key, item);
        }
    }
    unique
}

fn discrete_pairs<T>(
    old: impl IntoIterator<Item = (String, T)>,
    new: impl IntoIterator<Item = (String, T)>,
) -> Vec<(T, T)> {
    let mut old = unique_by_key(old);
    unique_by_key(new)
        .into_iter()
        .filter_map(|(key, n)| old.remove(&key).map(|o| (o, n)))
        .collect()
}

/// Vote every unmatched method pair that is unique under its descriptor key.
pub(crate) fn match_discrete_methods(
    engine: &mut MergeEngine<'_>,
    old_methods: &[MethodId],
    new_methods: &[MethodId],
) -> usize {
    let (old, new) = (engine.old, engine.new);
    let old_keyed: Vec<(String, MethodId)> = old_methods
        .iter()
        .filter(|m| !engine.ledger.methods.is_confirmed(&Handle::Real(**m)))
        .map(|m| {
            let entry = old.method(*m);
            (method_key(engine, Side::Old, &entry.name, &entry.descriptor), *m)
        })
        .collect();
    let new_keyed: Vec<(String, MethodId)> = new_methods
        .iter()
        .filter(|m| !engine.is_method_matched(**m))
        .map(|m| {
            let entry = new.method(*m);
            (method_key(engine, Side::New, &entry.name, &entry.descriptor), *m)
        })
        .collect();
    let mut votes = 0;
    for (o, n) in discrete_pairs(old_keyed, new_keyed) {
        if engine.vote_method(o, n) {
            votes += 1;
        }
    }
    votes
}

fn match_discrete_fields(
    engine: &mut MergeEngine<'_>,
    old_fields: &[FieldId],
    new_fields: &[FieldId],
) -> usize {
    let (old, new) = (engine.old, engine.new);
    let old_keyed: Vec<(String, FieldId)> = old_fields
        .iter()
        .filter(|f| !engine.ledger.fields.is_confirmed(&Handle::Real(**f)))
        .map(|f| (field_key(engine, Side::Old, &old.field(*f).descriptor), *f))
        .collect();
    let new_keyed: Vec<(String, FieldId)> = new_fields
        .iter()
        .filter(|f| !engine.is_field_matched(**f))
        .map(|f| (field_key(engine, Side::New, &new.field(*f).descriptor), *f))
        .collect();
    let mut votes = 0;
    for (o, n) in discrete_pairs(old_keyed, new_keyed) {
        if engine.vote_field(o, n) {
            votes += 1;
        }
    }
    votes
}

fn split_fields(engine: &MergeEngine<'_>, ty: TypeId, side: Side) -> (Vec<FieldId>, Vec<FieldId>) {
    let program = match side {
        Side::Old => engine.old,
        Side::New => engine.new,
    };
    program
        .ty(ty)
        .fields()
        .iter()
        .copied()
        .partition(|f| !program.field(*f).is_static)
}

pub struct MatchDiscreteFields;

impl MergeOperation for MatchDiscreteFields {
    fn name(&self) -> &str {
        "discrete_fields"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let mut votes = 0;
        for (o, n) in engine.type_pairs() {
            let (old_instance, old_static) = split_fields(engine, o, Side::Old);
            let (new_instance, new_static) = split_fields(engine, n, Side::New);
            votes += match_discrete_fields(engine, &old_instance, &new_instance);
            votes += match_discrete_fields(engine, &old_static, &new_static);
        }
        debug!(pass = self.name(), votes, "discrete fields voted");
        Ok(())
    }
}

pub struct MatchDiscreteMethods;

impl MergeOperation for MatchDiscreteMethods {
    fn name(&self) -> &str {
        "discrete_methods"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let (old, new) = (engine.old, engine.new);
        let mut votes = 0;
        for (o, n) in engine.type_pairs() {
            let old_instance: Vec<MethodId> = old.instance_methods(o).collect();
            let new_instance: Vec<MethodId> = new.instance_methods(n).collect();
            votes += match_discrete_methods(engine, &old_instance, &new_instance);
            let old_static: Vec<MethodId> = old.static_methods(o).collect();
            let new_static: Vec<MethodId> = new.static_methods(n).collect();
            votes += match_discrete_methods(engine, &old_static, &new_static);
        }
        debug!(pass = self.name(), votes, "discrete methods voted");
        Ok(())
    }
}
