//! One-shot pass over new-side compiler artifacts that carry readable names.
//!
//! A synthetic bridge keeps the source-level name of the method it forwards
//! to, so the forwarding target is confirmed against a synthetic old handle
//! carrying that name. Enum `$VALUES` arrays are handled the same way.

use remapper_core::ast::{Instruction, Statement};
use remapper_core::{FieldId, Handle, MethodId, Program, Synthetic, TypeId};
use tracing::debug;

use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::pipeline::MergeOperation;

pub struct MergeSyntheticOverloads;

const VALUES_FIELD: &str = "$VALUES";

impl MergeOperation for MergeSyntheticOverloads {
    fn name(&self) -> &str {
        "synthetic_overloads"
    }

    fn operate(&mut self, engine: &mut MergeEngine<'_>) -> Result<(), MergeError> {
        let new = engine.new;
        let mut confirmed = 0;
        for ty in new.type_ids() {
            let owner = &new.ty(ty).name;
            if let Some(values) = enum_values_field(new, ty) {
                let handle = Handle::Synthetic(Synthetic {
                    owner: Some(owner.clone()),
                    name: VALUES_FIELD.to_string(),
                    descriptor: Some(new.field(values).descriptor.clone()),
                });
                if engine.confirm_field(handle, values)? {
                    confirmed += 1;
                }
            }
            let bridges: Vec<MethodId> = new.instance_methods(ty).collect();
            for bridge in bridges {
                let Some(target) = bridge_target(new, ty, bridge) else {
                    continue;
                };
                let handle = Handle::Synthetic(Synthetic {
                    owner: Some(owner.clone()),
                    name: new.method(bridge).name.clone(),
                    descriptor: Some(new.method(target).descriptor.clone()),
                });
                if engine.confirm_method(handle, target)? {
                    confirmed += 1;
                }
            }
        }
        debug!(pass = self.name(), confirmed, "synthetic artifacts linked");
        Ok(())
    }
}

/// The own array field a named enum's static initializer fills with a new
/// array.
fn enum_values_field(program: &Program, ty: TypeId) -> Option<FieldId> {
    let entry = program.ty(ty);
    if !entry.is_enum() || entry.is_anonymous() {
        return None;
    }
    let clinit = program.method(program.static_initializer(ty)?);
    clinit.statements().iter().find_map(|stmt| {
        let Statement::StaticFieldAssignment {
            owner,
            name,
            value: Instruction::NewArray { .. },
            ..
        } = stmt
        else {
            return None;
        };
        if *owner != entry.name {
            return None;
        }
        let field = program.field_named(ty, name)?;
        let field_entry = program.field(field);
        (field_entry.is_static && field_entry.descriptor.starts_with('[')).then_some(field)
    })
}

/// The same-owner instance method a synthetic bridge forwards to. Bridges
/// with obfuscated (two characters or fewer) names are ignored.
fn bridge_target(program: &Program, ty: TypeId, bridge: MethodId) -> Option<MethodId> {
    let entry = program.method(bridge);
    if !entry.is_synthetic || entry.body.is_none() || entry.name.len() <= 2 {
        return None;
    }
    let invoke = match (entry.signature.ret.is_void(), entry.statements()) {
        (true, [Statement::Invoke(invoke), _]) => invoke,
        (false, [Statement::Return(Some(invoke))]) => invoke,
        _ => return None,
    };
    let Instruction::InstanceMethodInvoke {
        owner,
        name,
        descriptor,
        ..
    } = invoke
    else {
        return None;
    };
    if *owner != program.ty(ty).name {
        return None;
    }
    program
        .method_named(ty, name, descriptor)
        .filter(|m| !program.method(*m).is_static)
}
