//! Method-body trees as produced by the decompiler.
//!
//! Bodies are statement lists; statements hold instruction trees and
//! conditions. Every node family has a matching `*Kind` tag so that consumers
//! can dispatch through tables instead of matching on payloads.

use serde::{Deserialize, Serialize};

use crate::descriptor::TypeSig;

/// A local variable slot, with its declared type when the decompiler knew it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Local {
    pub index: u16,
    pub ty: Option<TypeSig>,
}

impl Local {
    pub fn new(index: u16, ty: Option<TypeSig>) -> Self {
        Self { index, ty }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elif {
    pub condition: Condition,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub indices: Vec<i32>,
    pub is_default: bool,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchBlock {
    /// Internal names of the caught exception types.
    pub exceptions: Vec<String>,
    pub local: Local,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    ArrayAssignment {
        array: Instruction,
        index: Instruction,
        value: Instruction,
    },
    InstanceFieldAssignment {
        owner: String,
        name: String,
        descriptor: String,
        target: Instruction,
        value: Instruction,
    },
    StaticFieldAssignment {
        owner: String,
        name: String,
        descriptor: String,
        value: Instruction,
    },
    LocalAssignment {
        local: Local,
        value: Instruction,
    },
    Break,
    DoWhile {
        condition: Condition,
        body: Vec<Statement>,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Condition>,
        incr: Option<Box<Statement>>,
        body: Vec<Statement>,
    },
    ForEach {
        local: Local,
        collection: Instruction,
        body: Vec<Statement>,
    },
    If {
        condition: Condition,
        body: Vec<Statement>,
        elifs: Vec<Elif>,
        else_body: Option<Vec<Statement>>,
    },
    Switch {
        value: Instruction,
        cases: Vec<Case>,
    },
    TryCatch {
        body: Vec<Statement>,
        catches: Vec<CatchBlock>,
    },
    While {
        condition: Condition,
        body: Vec<Statement>,
    },
    Comment(Vec<String>),
    Increment {
        local: Local,
        amount: i32,
    },
    Return(Option<Instruction>),
    Throw(Instruction),
    Invoke(Instruction),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    ArrayAccess {
        array: Box<Instruction>,
        index: Box<Instruction>,
    },
    Cast {
        ty: TypeSig,
        value: Box<Instruction>,
    },
    DoubleConstant(f64),
    FloatConstant(f32),
    IntConstant(i32),
    LongConstant(i64),
    NullConstant,
    StringConstant(String),
    TypeConstant(TypeSig),
    /// `invokedynamic` lambda creation.
    DynamicInvoke {
        ty: TypeSig,
        lambda_owner: String,
        lambda_name: String,
        lambda_descriptor: String,
    },
    InstanceMethodInvoke {
        owner: String,
        name: String,
        descriptor: String,
        callee: Box<Instruction>,
        args: Vec<Instruction>,
    },
    StaticMethodInvoke {
        owner: String,
        name: String,
        descriptor: String,
        args: Vec<Instruction>,
    },
    New {
        ty: TypeSig,
        ctor_descriptor: String,
        args: Vec<Instruction>,
    },
    InstanceOf {
        ty: TypeSig,
        value: Box<Instruction>,
    },
    MultiNewArray {
        ty: TypeSig,
        sizes: Vec<Instruction>,
    },
    NewArray {
        /// Element type.
        ty: TypeSig,
        size: Box<Instruction>,
        initializer: Option<Vec<Instruction>>,
    },
    NumberCompare {
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    Ternary {
        condition: Box<Condition>,
        then_value: Box<Instruction>,
        else_value: Box<Instruction>,
    },
    Negative(Box<Instruction>),
    Operator {
        op: BinaryOp,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    InstanceFieldAccess {
        owner: String,
        name: String,
        descriptor: String,
        target: Box<Instruction>,
    },
    LocalAccess(Local),
    StaticFieldAccess {
        owner: String,
        name: String,
        descriptor: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Boolean(Instruction),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Inverse(Box<Condition>),
    Compare {
        op: CompareOp,
        left: Instruction,
        right: Instruction,
    },
}

macro_rules! node_kinds {
    ($kind:ident { $($variant:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $kind {
            $($variant),+
        }

        impl $kind {
            pub const ALL: &'static [$kind] = &[$($kind::$variant),+];
            pub const COUNT: usize = Self::ALL.len();

            pub fn index(self) -> usize {
                self as usize
            }
        }
    };
}

node_kinds!(StatementKind {
    ArrayAssignment,
    InstanceFieldAssignment,
    StaticFieldAssignment,
    LocalAssignment,
    Break,
    DoWhile,
    For,
    ForEach,
    If,
    Switch,
    TryCatch,
    While,
    Comment,
    Increment,
    Return,
    Throw,
    Invoke,
});

node_kinds!(InstructionKind {
    ArrayAccess,
    Cast,
    DoubleConstant,
    FloatConstant,
    IntConstant,
    LongConstant,
    NullConstant,
    StringConstant,
    TypeConstant,
    DynamicInvoke,
    InstanceMethodInvoke,
    StaticMethodInvoke,
    New,
    InstanceOf,
    MultiNewArray,
    NewArray,
    NumberCompare,
    Ternary,
    Negative,
    Operator,
    InstanceFieldAccess,
    LocalAccess,
    StaticFieldAccess,
});

node_kinds!(ConditionKind {
    Boolean,
    And,
    Or,
    Inverse,
    Compare,
});

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::ArrayAssignment { .. } => StatementKind::ArrayAssignment,
            Statement::InstanceFieldAssignment { .. } => StatementKind::InstanceFieldAssignment,
            Statement::StaticFieldAssignment { .. } => StatementKind::StaticFieldAssignment,
            Statement::LocalAssignment { .. } => StatementKind::LocalAssignment,
            Statement::Break => StatementKind::Break,
            Statement::DoWhile { .. } => StatementKind::DoWhile,
            Statement::For { .. } => StatementKind::For,
            Statement::ForEach { .. } => StatementKind::ForEach,
            Statement::If { .. } => StatementKind::If,
            Statement::Switch { .. } => StatementKind::Switch,
            Statement::TryCatch { .. } => StatementKind::TryCatch,
            Statement::While { .. } => StatementKind::While,
            Statement::Comment(_) => StatementKind::Comment,
            Statement::Increment { .. } => StatementKind::Increment,
            Statement::Return(_) => StatementKind::Return,
            Statement::Throw(_) => StatementKind::Throw,
            Statement::Invoke(_) => StatementKind::Invoke,
        }
    }
}

impl Instruction {
    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::ArrayAccess { .. } => InstructionKind::ArrayAccess,
            Instruction::Cast { .. } => InstructionKind::Cast,
            Instruction::DoubleConstant(_) => InstructionKind::DoubleConstant,
            Instruction::FloatConstant(_) => InstructionKind::FloatConstant,
            Instruction::IntConstant(_) => InstructionKind::IntConstant,
            Instruction::LongConstant(_) => InstructionKind::LongConstant,
            Instruction::NullConstant => InstructionKind::NullConstant,
            Instruction::StringConstant(_) => InstructionKind::StringConstant,
            Instruction::TypeConstant(_) => InstructionKind::TypeConstant,
            Instruction::DynamicInvoke { .. } => InstructionKind::DynamicInvoke,
            Instruction::InstanceMethodInvoke { .. } => InstructionKind::InstanceMethodInvoke,
            Instruction::StaticMethodInvoke { .. } => InstructionKind::StaticMethodInvoke,
            Instruction::New { .. } => InstructionKind::New,
            Instruction::InstanceOf { .. } => InstructionKind::InstanceOf,
            Instruction::MultiNewArray { .. } => InstructionKind::MultiNewArray,
            Instruction::NewArray { .. } => InstructionKind::NewArray,
            Instruction::NumberCompare { .. } => InstructionKind::NumberCompare,
            Instruction::Ternary { .. } => InstructionKind::Ternary,
            Instruction::Negative(_) => InstructionKind::Negative,
            Instruction::Operator { .. } => InstructionKind::Operator,
            Instruction::InstanceFieldAccess { .. } => InstructionKind::InstanceFieldAccess,
            Instruction::LocalAccess(_) => InstructionKind::LocalAccess,
            Instruction::StaticFieldAccess { .. } => InstructionKind::StaticFieldAccess,
        }
    }

    /// Direct instruction children, in evaluation order.
    pub fn children(&self) -> Vec<&Instruction> {
        match self {
            Instruction::ArrayAccess { array, index } => vec![array, index],
            Instruction::Cast { value, .. }
            | Instruction::InstanceOf { value, .. }
            | Instruction::Negative(value) => vec![value],
            Instruction::InstanceMethodInvoke { callee, args, .. } => {
                std::iter::once(callee.as_ref()).chain(args.iter()).collect()
            }
            Instruction::StaticMethodInvoke { args, .. } | Instruction::New { args, .. } => {
                args.iter().collect()
            }
            Instruction::MultiNewArray { sizes, .. } => sizes.iter().collect(),
            Instruction::NewArray {
                size, initializer, ..
            } => std::iter::once(size.as_ref())
                .chain(initializer.iter().flatten())
                .collect(),
            Instruction::NumberCompare { left, right } | Instruction::Operator { left, right, .. } => {
                vec![left, right]
            }
            Instruction::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let mut out = condition.instructions();
                out.push(then_value);
                out.push(else_value);
                out
            }
            Instruction::InstanceFieldAccess { target, .. } => vec![target],
            _ => Vec::new(),
        }
    }
}

impl Condition {
    pub fn kind(&self) -> ConditionKind {
        match self {
            Condition::Boolean(_) => ConditionKind::Boolean,
            Condition::And(_) => ConditionKind::And,
            Condition::Or(_) => ConditionKind::Or,
            Condition::Inverse(_) => ConditionKind::Inverse,
            Condition::Compare { .. } => ConditionKind::Compare,
        }
    }

    /// Top-level instructions referenced by this condition tree.
    pub fn instructions(&self) -> Vec<&Instruction> {
        match self {
            Condition::Boolean(value) => vec![value],
            Condition::And(ops) | Condition::Or(ops) => {
                ops.iter().flat_map(Condition::instructions).collect()
            }
            Condition::Inverse(inner) => inner.instructions(),
            Condition::Compare { left, right, .. } => vec![left, right],
        }
    }
}

/// Call `f` on every statement of `body`, including nested blocks, in
/// pre-order.
pub fn walk_statements<'a>(body: &'a [Statement], f: &mut impl FnMut(&'a Statement)) {
    for stmt in body {
        f(stmt);
        for block in nested_blocks(stmt) {
            walk_statements(block, f);
        }
    }
}

/// Call `f` on every instruction reachable from `body`, in pre-order.
pub fn walk_instructions<'a>(body: &'a [Statement], f: &mut impl FnMut(&'a Instruction)) {
    walk_statements(body, &mut |stmt| {
        for insn in statement_instructions(stmt) {
            walk_instruction(insn, f);
        }
    });
}

fn walk_instruction<'a>(insn: &'a Instruction, f: &mut impl FnMut(&'a Instruction)) {
    f(insn);
    for child in insn.children() {
        walk_instruction(child, f);
    }
}

/// Instructions held directly by a statement (not by its nested blocks).
pub fn statement_instructions(stmt: &Statement) -> Vec<&Instruction> {
    match stmt {
        Statement::ArrayAssignment {
            array,
            index,
            value,
        } => vec![array, index, value],
        Statement::InstanceFieldAssignment { target, value, .. } => vec![target, value],
        Statement::StaticFieldAssignment { value, .. }
        | Statement::LocalAssignment { value, .. }
        | Statement::Throw(value)
        | Statement::Invoke(value) => vec![value],
        Statement::Return(value) => value.iter().collect(),
        Statement::DoWhile { condition, .. } | Statement::While { condition, .. } => {
            condition.instructions()
        }
        Statement::For {
            init,
            condition,
            incr,
            ..
        } => {
            let mut out = Vec::new();
            if let Some(init) = init {
                out.extend(statement_instructions(init));
            }
            if let Some(condition) = condition {
                out.extend(condition.instructions());
            }
            if let Some(incr) = incr {
                out.extend(statement_instructions(incr));
            }
            out
        }
        Statement::ForEach { collection, .. } => vec![collection],
        Statement::If {
            condition, elifs, ..
        } => {
            let mut out = condition.instructions();
            for elif in elifs {
                out.extend(elif.condition.instructions());
            }
            out
        }
        Statement::Switch { value, .. } => vec![value],
        Statement::Break
        | Statement::TryCatch { .. }
        | Statement::Comment(_)
        | Statement::Increment { .. } => Vec::new(),
    }
}

/// Statement blocks nested directly inside `stmt`.
pub fn nested_blocks(stmt: &Statement) -> Vec<&[Statement]> {
    match stmt {
        Statement::DoWhile { body, .. }
        | Statement::For { body, .. }
        | Statement::ForEach { body, .. }
        | Statement::While { body, .. } => vec![body],
        Statement::If {
            body,
            elifs,
            else_body,
            ..
        } => {
            let mut out: Vec<&[Statement]> = vec![body];
            out.extend(elifs.iter().map(|e| e.body.as_slice()));
            out.extend(else_body.iter().map(Vec::as_slice));
            out
        }
        Statement::Switch { cases, .. } => cases.iter().map(|c| c.body.as_slice()).collect(),
        Statement::TryCatch { body, catches } => {
            let mut out: Vec<&[Statement]> = vec![body];
            out.extend(catches.iter().map(|c| c.body.as_slice()));
            out
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Instruction {
        Instruction::StringConstant(s.into())
    }

    #[test]
    fn test_kind_tables_are_dense() {
        for (i, kind) in StatementKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        for (i, kind) in InstructionKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        assert_eq!(ConditionKind::COUNT, 5);
    }

    #[test]
    fn test_walk_instructions_reaches_nested_blocks() {
        let body = vec![
            Statement::Invoke(Instruction::StaticMethodInvoke {
                owner: "a".into(),
                name: "b".into(),
                descriptor: "(Ljava/lang/String;)V".into(),
                args: vec![string("outer")],
            }),
            Statement::If {
                condition: Condition::Boolean(Instruction::IntConstant(1)),
                body: vec![Statement::Return(Some(string("inner")))],
                elifs: vec![],
                else_body: Some(vec![Statement::Throw(string("else"))]),
            },
        ];
        let mut seen = Vec::new();
        walk_instructions(&body, &mut |insn| {
            if let Instruction::StringConstant(s) = insn {
                seen.push(s.clone());
            }
        });
        assert_eq!(seen, vec!["outer", "inner", "else"]);
    }
}
