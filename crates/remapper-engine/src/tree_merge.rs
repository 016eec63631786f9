//! Structural tree merger.
//!
//! Walks two method bodies believed to correspond in lock-step and votes for
//! every pair of type, method and field references that both programs can
//! resolve. References to entities outside the programs must agree
//! textually. Every handler returns `false` at the first structural
//! divergence; votes already cast are kept.
//!
//! Dispatch goes through per-kind handler tables built once on first use.

use std::sync::OnceLock;

use remapper_core::ast::{
    Condition, ConditionKind, Instruction, InstructionKind, Local, Statement, StatementKind,
};
use remapper_core::descriptor::{element_class, return_descriptor, split_params, TypeSig};
use remapper_core::{FieldId, MethodId, Program, TypeId};

use crate::engine::MergeEngine;

type StatementHandler = fn(&mut MergeEngine<'_>, &Statement, &Statement) -> bool;
type InstructionHandler = fn(&mut MergeEngine<'_>, &Instruction, &Instruction) -> bool;
type ConditionHandler = fn(&mut MergeEngine<'_>, &Condition, &Condition) -> bool;

struct Handlers {
    statements: [StatementHandler; StatementKind::COUNT],
    instructions: [InstructionHandler; InstructionKind::COUNT],
    conditions: [ConditionHandler; ConditionKind::COUNT],
}

fn handlers() -> &'static Handlers {
    static HANDLERS: OnceLock<Handlers> = OnceLock::new();
    HANDLERS.get_or_init(|| Handlers {
        statements: std::array::from_fn(|i| statement_handler(StatementKind::ALL[i])),
        instructions: std::array::from_fn(|i| instruction_handler(InstructionKind::ALL[i])),
        conditions: std::array::from_fn(|i| condition_handler(ConditionKind::ALL[i])),
    })
}

fn statement_handler(kind: StatementKind) -> StatementHandler {
    match kind {
        StatementKind::ArrayAssignment => merge_array_assignment,
        StatementKind::InstanceFieldAssignment => merge_instance_field_assignment,
        StatementKind::StaticFieldAssignment => merge_static_field_assignment,
        StatementKind::LocalAssignment => merge_local_assignment,
        StatementKind::Break => accept_statement,
        StatementKind::DoWhile => merge_do_while,
        StatementKind::For => merge_for,
        StatementKind::ForEach => merge_for_each,
        StatementKind::If => merge_if,
        StatementKind::Switch => merge_switch,
        StatementKind::TryCatch => merge_try_catch,
        StatementKind::While => merge_while,
        StatementKind::Comment | StatementKind::Increment => reject_statement,
        StatementKind::Return => merge_return,
        StatementKind::Throw => merge_throw,
        StatementKind::Invoke => merge_invoke_statement,
    }
}

fn instruction_handler(kind: InstructionKind) -> InstructionHandler {
    match kind {
        InstructionKind::ArrayAccess => merge_array_access,
        InstructionKind::Cast => merge_cast,
        InstructionKind::DoubleConstant
        | InstructionKind::FloatConstant
        | InstructionKind::IntConstant
        | InstructionKind::LongConstant
        | InstructionKind::NullConstant
        | InstructionKind::StringConstant => accept_instruction,
        InstructionKind::TypeConstant => merge_type_constant,
        InstructionKind::DynamicInvoke => merge_dynamic_invoke,
        InstructionKind::InstanceMethodInvoke => merge_instance_invoke,
        InstructionKind::StaticMethodInvoke => merge_static_invoke,
        InstructionKind::New => merge_new,
        InstructionKind::InstanceOf => merge_instance_of,
        InstructionKind::MultiNewArray => merge_multi_new_array,
        InstructionKind::NewArray => merge_new_array,
        InstructionKind::NumberCompare => merge_number_compare,
        InstructionKind::Ternary => merge_ternary,
        InstructionKind::Negative => merge_negative,
        InstructionKind::Operator => merge_operator,
        InstructionKind::InstanceFieldAccess => merge_instance_field_access,
        InstructionKind::LocalAccess => merge_local_access,
        InstructionKind::StaticFieldAccess => merge_static_field_access,
    }
}

fn condition_handler(kind: ConditionKind) -> ConditionHandler {
    match kind {
        ConditionKind::Boolean => merge_boolean_condition,
        ConditionKind::And | ConditionKind::Or => merge_compound_condition,
        ConditionKind::Inverse => merge_inverse_condition,
        ConditionKind::Compare => merge_compare_condition,
    }
}

/// Merge two methods: return type, parameter types when the counts agree,
/// then the body statements pairwise. Stops at the first divergence.
pub fn merge_methods(engine: &mut MergeEngine<'_>, old: MethodId, new: MethodId) -> bool {
    let (old_program, new_program) = (engine.old, engine.new);
    let o = old_program.method(old);
    let n = new_program.method(new);
    if !merge_type_sig(engine, &o.signature.ret, &n.signature.ret) {
        return false;
    }
    if o.signature.params.len() == n.signature.params.len() {
        for (a, b) in o.signature.params.iter().zip(&n.signature.params) {
            if !merge_type_sig(engine, a, b) {
                return false;
            }
        }
    }
    for (a, b) in o.statements().iter().zip(n.statements()) {
        if !merge_statement(engine, a, b) {
            return false;
        }
    }
    true
}

/// Vote for the declared types of two fields.
pub fn merge_fields(engine: &mut MergeEngine<'_>, old: FieldId, new: FieldId) -> bool {
    let (old_program, new_program) = (engine.old, engine.new);
    let o = &old_program.field(old).ty;
    let n = &new_program.field(new).ty;
    merge_type_sig(engine, o, n)
}

pub fn merge_statement(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let kind = a.kind();
    if kind != b.kind() {
        return false;
    }
    (handlers().statements[kind.index()])(engine, a, b)
}

pub fn merge_instruction(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let kind = a.kind();
    if kind != b.kind() {
        return false;
    }
    (handlers().instructions[kind.index()])(engine, a, b)
}

pub fn merge_condition(engine: &mut MergeEngine<'_>, a: &Condition, b: &Condition) -> bool {
    let kind = a.kind();
    if kind != b.kind() {
        return false;
    }
    (handlers().conditions[kind.index()])(engine, a, b)
}

/// Every old statement must have a counterpart; extra new statements are
/// ignored.
fn merge_block(engine: &mut MergeEngine<'_>, a: &[Statement], b: &[Statement]) -> bool {
    if b.len() < a.len() {
        // merge what lines up before reporting the divergence
        for (x, y) in a.iter().zip(b) {
            if !merge_statement(engine, x, y) {
                return false;
            }
        }
        return false;
    }
    a.iter().zip(b).all(|(x, y)| merge_statement(engine, x, y))
}

fn merge_all(engine: &mut MergeEngine<'_>, a: &[Instruction], b: &[Instruction]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| merge_instruction(engine, x, y))
}

fn merge_opt_instruction(
    engine: &mut MergeEngine<'_>,
    a: Option<&Instruction>,
    b: Option<&Instruction>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => merge_instruction(engine, a, b),
        _ => false,
    }
}

fn resolve_pair(engine: &MergeEngine<'_>, old: &str, new: &str) -> Option<(TypeId, TypeId)> {
    Some((engine.old.get(old)?, engine.new.get(new)?))
}

/// Vote two internal type names, or compare them when either side is
/// outside its program.
pub fn merge_type_names(engine: &mut MergeEngine<'_>, old: &str, new: &str) -> bool {
    match resolve_pair(engine, old, new) {
        Some((o, n)) => engine.vote_type(o, n),
        None => old == new,
    }
}

/// Vote the class types inside two field descriptors.
pub fn merge_descriptors(engine: &mut MergeEngine<'_>, old: &str, new: &str) -> bool {
    let (old_dims, old_class) = element_class(old);
    let (new_dims, new_class) = element_class(new);
    let pair = match (old_class, new_class) {
        (Some(o), Some(n)) if old_dims == new_dims => resolve_pair(engine, o, n),
        _ => None,
    };
    match pair {
        Some((o, n)) => engine.vote_type(o, n),
        None => old == new,
    }
}

/// Vote parameter and return types of two method descriptors.
fn merge_method_descriptors(engine: &mut MergeEngine<'_>, old: &str, new: &str) -> bool {
    let old_params = split_params(old);
    let new_params = split_params(new);
    if old_params.len() != new_params.len() {
        return false;
    }
    for (a, b) in old_params.iter().zip(&new_params) {
        if !merge_descriptors(engine, a, b) {
            return false;
        }
    }
    merge_descriptors(engine, return_descriptor(old), return_descriptor(new))
}

pub fn merge_type_sig(engine: &mut MergeEngine<'_>, a: &TypeSig, b: &TypeSig) -> bool {
    match (a, b) {
        (TypeSig::Primitive(x), TypeSig::Primitive(y)) => x == y,
        (TypeSig::Var(_), TypeSig::Var(_)) => true,
        (TypeSig::Array(x), TypeSig::Array(y)) => merge_type_sig(engine, x, y),
        (
            TypeSig::Class { name: an, args: aa },
            TypeSig::Class { name: bn, args: ba },
        ) => {
            if aa.len() != ba.len() {
                return false;
            }
            if !merge_type_names(engine, an, bn) {
                return false;
            }
            for (x, y) in aa.iter().zip(ba) {
                if x.wildcard != y.wildcard {
                    return false;
                }
                if !merge_opt_type(engine, x.sig.as_ref(), y.sig.as_ref()) {
                    return false;
                }
            }
            true
        }
        _ => false,
    }
}

fn merge_opt_type(engine: &mut MergeEngine<'_>, a: Option<&TypeSig>, b: Option<&TypeSig>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => merge_type_sig(engine, a, b),
        _ => false,
    }
}

fn merge_locals(engine: &mut MergeEngine<'_>, a: &Local, b: &Local) -> bool {
    merge_opt_type(engine, a.ty.as_ref(), b.ty.as_ref())
}

fn find_field(program: &Program, owner: TypeId, name: &str) -> Option<FieldId> {
    program.find_field(owner, name)
}

/// Vote owner then field of a field reference.
fn merge_field_ref(
    engine: &mut MergeEngine<'_>,
    (old_owner, old_name): (&str, &str),
    (new_owner, new_name): (&str, &str),
) -> bool {
    let Some((o, n)) = resolve_pair(engine, old_owner, new_owner) else {
        return old_owner == new_owner && old_name == new_name;
    };
    if !engine.vote_type(o, n) {
        return false;
    }
    match (find_field(engine.old, o, old_name), find_field(engine.new, n, new_name)) {
        (Some(of), Some(nf)) => engine.vote_field(of, nf),
        _ => old_name == new_name,
    }
}

/// Vote owner then resolved target of a method reference.
fn merge_method_ref(
    engine: &mut MergeEngine<'_>,
    (old_owner, old_name, old_desc): (&str, &str, &str),
    (new_owner, new_name, new_desc): (&str, &str, &str),
    is_static: bool,
) -> bool {
    let Some((o, n)) = resolve_pair(engine, old_owner, new_owner) else {
        return old_owner == new_owner && old_name == new_name;
    };
    if !engine.vote_type(o, n) {
        return false;
    }
    let (old_method, new_method) = if is_static {
        (
            engine.old.find_static_method(o, old_name, old_desc),
            engine.new.find_static_method(n, new_name, new_desc),
        )
    } else {
        (
            engine.old.find_method(o, old_name, old_desc),
            engine.new.find_method(n, new_name, new_desc),
        )
    };
    match (old_method, new_method) {
        (Some(om), Some(nm)) => engine.vote_method(om, nm),
        _ => old_name == new_name,
    }
}

fn merge_array_assignment(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::ArrayAssignment { array: aa, index: ai, value: av },
        Statement::ArrayAssignment { array: ba, index: bi, value: bv },
    ) = (a, b)
    else {
        return false;
    };
    merge_instruction(engine, aa, ba)
        && merge_instruction(engine, ai, bi)
        && merge_instruction(engine, av, bv)
}

fn merge_instance_field_assignment(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::InstanceFieldAssignment { owner: ao, name: an, target: at, value: av, .. },
        Statement::InstanceFieldAssignment { owner: bo, name: bn, target: bt, value: bv, .. },
    ) = (a, b)
    else {
        return false;
    };
    merge_field_ref(engine, (ao, an), (bo, bn))
        && merge_instruction(engine, at, bt)
        && merge_instruction(engine, av, bv)
}

fn merge_static_field_assignment(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::StaticFieldAssignment { owner: ao, name: an, value: av, .. },
        Statement::StaticFieldAssignment { owner: bo, name: bn, value: bv, .. },
    ) = (a, b)
    else {
        return false;
    };
    merge_field_ref(engine, (ao, an), (bo, bn)) && merge_instruction(engine, av, bv)
}

fn merge_local_assignment(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::LocalAssignment { local: al, value: av },
        Statement::LocalAssignment { local: bl, value: bv },
    ) = (a, b)
    else {
        return false;
    };
    merge_locals(engine, al, bl) && merge_instruction(engine, av, bv)
}

fn merge_do_while(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::DoWhile { condition: ac, body: ab },
        Statement::DoWhile { condition: bc, body: bb },
    ) = (a, b)
    else {
        return false;
    };
    merge_condition(engine, ac, bc) && merge_block(engine, ab, bb)
}

fn merge_while(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::While { condition: ac, body: ab },
        Statement::While { condition: bc, body: bb },
    ) = (a, b)
    else {
        return false;
    };
    merge_condition(engine, ac, bc) && merge_block(engine, ab, bb)
}

fn merge_for(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::For { init: ai, condition: ac, incr: ax, body: ab },
        Statement::For { init: bi, condition: bc, incr: bx, body: bb },
    ) = (a, b)
    else {
        return false;
    };
    let init = match (ai, bi) {
        (None, None) => true,
        (Some(x), Some(y)) => merge_statement(engine, x, y),
        _ => false,
    };
    if !init {
        return false;
    }
    let cond = match (ac, bc) {
        (None, None) => true,
        (Some(x), Some(y)) => merge_condition(engine, x, y),
        _ => false,
    };
    if !cond {
        return false;
    }
    let incr = match (ax, bx) {
        (None, None) => true,
        (Some(x), Some(y)) => merge_statement(engine, x, y),
        _ => false,
    };
    incr && merge_block(engine, ab, bb)
}

fn merge_for_each(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::ForEach { local: al, collection: ac, body: ab },
        Statement::ForEach { local: bl, collection: bc, body: bb },
    ) = (a, b)
    else {
        return false;
    };
    merge_instruction(engine, ac, bc) && merge_locals(engine, al, bl) && merge_block(engine, ab, bb)
}

fn merge_if(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::If { condition: ac, body: ab, elifs: ae, else_body: ao },
        Statement::If { condition: bc, body: bb, elifs: be, else_body: bo },
    ) = (a, b)
    else {
        return false;
    };
    if !merge_condition(engine, ac, bc) || !merge_block(engine, ab, bb) {
        return false;
    }
    if ae.len() != be.len() {
        return false;
    }
    for (x, y) in ae.iter().zip(be) {
        if !merge_condition(engine, &x.condition, &y.condition) {
            return false;
        }
        if !merge_block(engine, &x.body, &y.body) {
            return false;
        }
    }
    match (ao, bo) {
        (None, None) => true,
        (Some(x), Some(y)) => merge_block(engine, x, y),
        _ => false,
    }
}

fn merge_switch(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::Switch { value: av, cases: ac },
        Statement::Switch { value: bv, cases: bc },
    ) = (a, b)
    else {
        return false;
    };
    if !merge_instruction(engine, av, bv) || ac.len() != bc.len() {
        return false;
    }
    for (x, y) in ac.iter().zip(bc) {
        if x.indices.len() != y.indices.len() || !y.indices.iter().all(|i| x.indices.contains(i)) {
            return false;
        }
        if x.is_default != y.is_default {
            return false;
        }
        if !merge_block(engine, &x.body, &y.body) {
            return false;
        }
    }
    true
}

fn merge_try_catch(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (
        Statement::TryCatch { body: ab, catches: ac },
        Statement::TryCatch { body: bb, catches: bc },
    ) = (a, b)
    else {
        return false;
    };
    if !merge_block(engine, ab, bb) || ac.len() != bc.len() {
        return false;
    }
    for (x, y) in ac.iter().zip(bc) {
        if x.exceptions.len() != y.exceptions.len() {
            return false;
        }
        for (ex, ey) in x.exceptions.iter().zip(&y.exceptions) {
            if !merge_type_names(engine, ex, ey) {
                return false;
            }
        }
        if !merge_locals(engine, &x.local, &y.local) || !merge_block(engine, &x.body, &y.body) {
            return false;
        }
    }
    true
}

fn accept_statement(_: &mut MergeEngine<'_>, _: &Statement, _: &Statement) -> bool {
    true
}

fn reject_statement(_: &mut MergeEngine<'_>, _: &Statement, _: &Statement) -> bool {
    false
}

fn accept_instruction(_: &mut MergeEngine<'_>, _: &Instruction, _: &Instruction) -> bool {
    true
}

fn merge_return(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (Statement::Return(av), Statement::Return(bv)) = (a, b) else {
        return false;
    };
    merge_opt_instruction(engine, av.as_ref(), bv.as_ref())
}

fn merge_throw(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (Statement::Throw(av), Statement::Throw(bv)) = (a, b) else {
        return false;
    };
    merge_instruction(engine, av, bv)
}

fn merge_invoke_statement(engine: &mut MergeEngine<'_>, a: &Statement, b: &Statement) -> bool {
    let (Statement::Invoke(av), Statement::Invoke(bv)) = (a, b) else {
        return false;
    };
    merge_instruction(engine, av, bv)
}

fn merge_array_access(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::ArrayAccess { array: aa, index: ai },
        Instruction::ArrayAccess { array: ba, index: bi },
    ) = (a, b)
    else {
        return false;
    };
    merge_instruction(engine, aa, ba) && merge_instruction(engine, ai, bi)
}

fn merge_cast(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::Cast { ty: at, value: av },
        Instruction::Cast { ty: bt, value: bv },
    ) = (a, b)
    else {
        return false;
    };
    merge_type_sig(engine, at, bt) && merge_instruction(engine, av, bv)
}

fn merge_type_constant(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (Instruction::TypeConstant(at), Instruction::TypeConstant(bt)) = (a, b) else {
        return false;
    };
    merge_type_sig(engine, at, bt)
}

fn merge_dynamic_invoke(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::DynamicInvoke { ty: at, lambda_owner: ao, .. },
        Instruction::DynamicInvoke { ty: bt, lambda_owner: bo, .. },
    ) = (a, b)
    else {
        return false;
    };
    merge_type_sig(engine, at, bt) && merge_type_names(engine, ao, bo)
}

fn merge_instance_invoke(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::InstanceMethodInvoke { owner: ao, name: an, descriptor: ad, callee: ac, args: aa },
        Instruction::InstanceMethodInvoke { owner: bo, name: bn, descriptor: bd, callee: bc, args: ba },
    ) = (a, b)
    else {
        return false;
    };
    merge_method_ref(engine, (ao, an, ad), (bo, bn, bd), false)
        && aa.len() == ba.len()
        && merge_method_descriptors(engine, ad, bd)
        && merge_all(engine, aa, ba)
        && merge_instruction(engine, ac, bc)
}

fn merge_static_invoke(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::StaticMethodInvoke { owner: ao, name: an, descriptor: ad, args: aa },
        Instruction::StaticMethodInvoke { owner: bo, name: bn, descriptor: bd, args: ba },
    ) = (a, b)
    else {
        return false;
    };
    merge_method_ref(engine, (ao, an, ad), (bo, bn, bd), true)
        && aa.len() == ba.len()
        && merge_method_descriptors(engine, ad, bd)
        && merge_all(engine, aa, ba)
}

fn merge_new(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::New { ty: at, ctor_descriptor: ad, args: aa },
        Instruction::New { ty: bt, ctor_descriptor: bd, args: ba },
    ) = (a, b)
    else {
        return false;
    };
    merge_type_sig(engine, at, bt)
        && aa.len() == ba.len()
        && merge_method_descriptors(engine, ad, bd)
        && merge_all(engine, aa, ba)
}

fn merge_instance_of(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::InstanceOf { ty: at, value: av },
        Instruction::InstanceOf { ty: bt, value: bv },
    ) = (a, b)
    else {
        return false;
    };
    merge_type_sig(engine, at, bt) && merge_instruction(engine, av, bv)
}

fn merge_multi_new_array(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::MultiNewArray { ty: at, sizes: az },
        Instruction::MultiNewArray { ty: bt, sizes: bz },
    ) = (a, b)
    else {
        return false;
    };
    merge_type_sig(engine, at, bt) && merge_all(engine, az, bz)
}

fn merge_new_array(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::NewArray { ty: at, size: az, initializer: ai },
        Instruction::NewArray { ty: bt, size: bz, initializer: bi },
    ) = (a, b)
    else {
        return false;
    };
    if !merge_type_sig(engine, at, bt) || !merge_instruction(engine, az, bz) {
        return false;
    }
    match (ai, bi) {
        (None, None) => true,
        (Some(x), Some(y)) => merge_all(engine, x, y),
        _ => false,
    }
}

fn merge_number_compare(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::NumberCompare { left: al, right: ar },
        Instruction::NumberCompare { left: bl, right: br },
    ) = (a, b)
    else {
        return false;
    };
    merge_instruction(engine, al, bl) && merge_instruction(engine, ar, br)
}

fn merge_ternary(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::Ternary { condition: ac, then_value: at, else_value: ae },
        Instruction::Ternary { condition: bc, then_value: bt, else_value: be },
    ) = (a, b)
    else {
        return false;
    };
    merge_condition(engine, ac, bc)
        && merge_instruction(engine, at, bt)
        && merge_instruction(engine, ae, be)
}

fn merge_negative(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (Instruction::Negative(av), Instruction::Negative(bv)) = (a, b) else {
        return false;
    };
    merge_instruction(engine, av, bv)
}

fn merge_operator(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::Operator { op: ao, left: al, right: ar },
        Instruction::Operator { op: bo, left: bl, right: br },
    ) = (a, b)
    else {
        return false;
    };
    ao == bo && merge_instruction(engine, al, bl) && merge_instruction(engine, ar, br)
}

fn merge_instance_field_access(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::InstanceFieldAccess { owner: ao, name: an, target: at, .. },
        Instruction::InstanceFieldAccess { owner: bo, name: bn, target: bt, .. },
    ) = (a, b)
    else {
        return false;
    };
    merge_field_ref(engine, (ao, an), (bo, bn)) && merge_instruction(engine, at, bt)
}

fn merge_local_access(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (Instruction::LocalAccess(al), Instruction::LocalAccess(bl)) = (a, b) else {
        return false;
    };
    merge_locals(engine, al, bl)
}

fn merge_static_field_access(engine: &mut MergeEngine<'_>, a: &Instruction, b: &Instruction) -> bool {
    let (
        Instruction::StaticFieldAccess { owner: ao, name: an, .. },
        Instruction::StaticFieldAccess { owner: bo, name: bn, .. },
    ) = (a, b)
    else {
        return false;
    };
    merge_field_ref(engine, (ao, an), (bo, bn))
}

fn merge_boolean_condition(engine: &mut MergeEngine<'_>, a: &Condition, b: &Condition) -> bool {
    let (Condition::Boolean(av), Condition::Boolean(bv)) = (a, b) else {
        return false;
    };
    merge_instruction(engine, av, bv)
}

fn merge_compound_condition(engine: &mut MergeEngine<'_>, a: &Condition, b: &Condition) -> bool {
    let (ops_a, ops_b) = match (a, b) {
        (Condition::And(x), Condition::And(y)) | (Condition::Or(x), Condition::Or(y)) => (x, y),
        _ => return false,
    };
    ops_a.len() == ops_b.len()
        && ops_a.iter().zip(ops_b).all(|(x, y)| merge_condition(engine, x, y))
}

fn merge_inverse_condition(engine: &mut MergeEngine<'_>, a: &Condition, b: &Condition) -> bool {
    let (Condition::Inverse(av), Condition::Inverse(bv)) = (a, b) else {
        return false;
    };
    merge_condition(engine, av, bv)
}

fn merge_compare_condition(engine: &mut MergeEngine<'_>, a: &Condition, b: &Condition) -> bool {
    let (
        Condition::Compare { op: ao, left: al, right: ar },
        Condition::Compare { op: bo, left: bl, right: br },
    ) = (a, b)
    else {
        return false;
    };
    ao == bo && merge_instruction(engine, al, bl) && merge_instruction(engine, ar, br)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::ast::{BinaryOp, Case, CatchBlock, CompareOp, Elif};
    use remapper_core::{FieldEntry, Handle, MappingSet, MergeSettings, MethodEntry, TypeEntry};

    /// Build a program with the given type names, each with one static field
    /// `f` of type int and an instance method `m()V`.
    fn program(names: &[&str]) -> Program {
        let mut p = Program::new();
        for name in names {
            let t = p.add_type(TypeEntry::class(*name)).unwrap();
            p.add_field(t, FieldEntry::new("f", "I").unwrap().with_static())
                .unwrap();
            p.add_method(t, MethodEntry::new("m", "()V").unwrap()).unwrap();
        }
        p
    }

    fn engine<'p>(old: &'p Program, new: &'p Program) -> MergeEngine<'p> {
        MergeEngine::new(old, &MappingSet::new(), new, MappingSet::new(), MergeSettings::default())
    }

    fn static_read(owner: &str) -> Instruction {
        Instruction::StaticFieldAccess {
            owner: owner.into(),
            name: "f".into(),
            descriptor: "I".into(),
        }
    }

    fn body_for(ty: &str) -> Vec<Statement> {
        let local = Local::new(1, Some(TypeSig::class(ty)));
        vec![
            Statement::LocalAssignment {
                local: local.clone(),
                value: Instruction::New {
                    ty: TypeSig::class(ty),
                    ctor_descriptor: "()V".into(),
                    args: vec![],
                },
            },
            Statement::If {
                condition: Condition::Compare {
                    op: CompareOp::Gt,
                    left: static_read(ty),
                    right: Instruction::IntConstant(0),
                },
                body: vec![Statement::Invoke(Instruction::InstanceMethodInvoke {
                    owner: ty.into(),
                    name: "m".into(),
                    descriptor: "()V".into(),
                    callee: Box::new(Instruction::LocalAccess(local.clone())),
                    args: vec![],
                })],
                elifs: vec![Elif {
                    condition: Condition::Boolean(Instruction::IntConstant(1)),
                    body: vec![Statement::Break],
                }],
                else_body: None,
            },
            Statement::Switch {
                value: Instruction::Operator {
                    op: BinaryOp::Add,
                    left: Box::new(static_read("java/lang/Integer")),
                    right: Box::new(Instruction::IntConstant(2)),
                },
                cases: vec![Case {
                    indices: vec![1, 2],
                    is_default: false,
                    body: vec![Statement::Break],
                }],
            },
            Statement::TryCatch {
                body: vec![Statement::Throw(Instruction::NullConstant)],
                catches: vec![CatchBlock {
                    exceptions: vec!["java/lang/Exception".into()],
                    local: Local::new(2, None),
                    body: vec![],
                }],
            },
            Statement::Return(Some(Instruction::Cast {
                ty: TypeSig::class(ty),
                value: Box::new(Instruction::LocalAccess(local)),
            })),
        ]
    }

    #[test]
    fn test_renamed_type_votes_once_per_site() {
        let old = program(&["foo"]);
        let new = program(&["bar"]);
        let mut e = engine(&old, &new);
        let a = body_for("foo");
        let b = body_for("bar");
        assert!(a.iter().zip(&b).all(|(x, y)| merge_statement(&mut e, x, y)));

        // local, new, field owner, invoke owner, callee local, cast, cast local
        let entry = e.ledger().types.get(&Handle::Real(TypeId(0))).unwrap();
        assert_eq!(entry.votes_for(TypeId(0)), 7);
        let field = e.ledger().fields.get(&Handle::Real(FieldId(0))).unwrap();
        assert_eq!(field.votes_for(FieldId(0)), 1);
        let method = e.ledger().methods.get(&Handle::Real(MethodId(0))).unwrap();
        assert_eq!(method.votes_for(MethodId(0)), 1);
    }

    #[test]
    fn test_identical_bodies_merge() {
        let old = program(&["foo"]);
        let new = program(&["foo"]);
        let mut e = engine(&old, &new);
        let body = body_for("foo");
        assert!(body.iter().zip(&body).all(|(x, y)| merge_statement(&mut e, x, y)));
    }

    #[test]
    fn test_divergence_stops() {
        let old = program(&["foo"]);
        let new = program(&["bar"]);
        let mut e = engine(&old, &new);
        assert!(!merge_statement(
            &mut e,
            &Statement::Comment(vec!["x".into()]),
            &Statement::Comment(vec!["x".into()])
        ));
        assert!(!merge_statement(&mut e, &Statement::Break, &Statement::Return(None)));
        assert!(!merge_instruction(
            &mut e,
            &static_read("java/lang/Integer"),
            &static_read("java/lang/Long")
        ));
        // shorter new body inside a loop
        let a = Statement::While {
            condition: Condition::Boolean(Instruction::IntConstant(1)),
            body: vec![Statement::Break, Statement::Break],
        };
        let b = Statement::While {
            condition: Condition::Boolean(Instruction::IntConstant(1)),
            body: vec![Statement::Break],
        };
        assert!(!merge_statement(&mut e, &a, &b));
        assert!(merge_statement(&mut e, &b, &a));
        // constants of one kind are always compatible
        assert!(merge_instruction(
            &mut e,
            &Instruction::StringConstant("a".into()),
            &Instruction::StringConstant("b".into())
        ));
    }

    #[test]
    fn test_confirmed_mismatch_rejects() {
        let old = program(&["foo"]);
        let new = program(&["bar", "baz"]);
        let mut e = engine(&old, &new);
        e.confirm_type(Handle::Real(TypeId(0)), TypeId(1)).unwrap();
        assert!(!merge_instruction(&mut e, &static_read("foo"), &static_read("bar")));
        assert!(merge_instruction(&mut e, &static_read("foo"), &static_read("baz")));
    }

    #[test]
    fn test_method_signatures_vote() {
        let mut old = program(&["foo"]);
        let mut new = program(&["bar"]);
        let om = old
            .add_method(TypeId(0), MethodEntry::new("g", "(Lfoo;)[Lfoo;").unwrap())
            .unwrap();
        let nm = new
            .add_method(TypeId(0), MethodEntry::new("h", "(Lbar;)[Lbar;").unwrap())
            .unwrap();
        let mut e = engine(&old, &new);
        assert!(merge_methods(&mut e, om, nm));
        let entry = e.ledger().types.get(&Handle::Real(TypeId(0))).unwrap();
        assert_eq!(entry.votes_for(TypeId(0)), 2);
    }
}
