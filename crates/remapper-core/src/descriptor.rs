//! JVM descriptors and generic signatures.
//!
//! Erased descriptors (`(ILa/b;[J)V`) identify members; generic signatures
//! carry type arguments and type variables, which the override builder needs
//! to see through `List<T>`-style parameter substitution.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Bound kind of a generic type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wildcard {
    None,
    Extends,
    Super,
    /// Unbounded `?`.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeArg {
    pub wildcard: Wildcard,
    /// `None` only for the unbounded wildcard.
    pub sig: Option<TypeSig>,
}

impl TypeArg {
    pub fn exact(sig: TypeSig) -> Self {
        Self {
            wildcard: Wildcard::None,
            sig: Some(sig),
        }
    }
}

/// A (possibly generic) type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSig {
    /// One of `BCDFIJSZV`.
    Primitive(char),
    Class { name: String, args: Vec<TypeArg> },
    Array(Box<TypeSig>),
    /// A type variable such as `T`.
    Var(String),
}

impl TypeSig {
    pub fn class(name: impl Into<String>) -> Self {
        TypeSig::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeArg>) -> Self {
        TypeSig::Class {
            name: name.into(),
            args,
        }
    }

    pub fn array(element: TypeSig) -> Self {
        TypeSig::Array(Box::new(element))
    }

    pub fn var(name: impl Into<String>) -> Self {
        TypeSig::Var(name.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Primitive('V'))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeSig::Array(_))
    }

    /// Internal name of a class reference, `None` for anything else.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeSig::Class { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Parse a single erased field descriptor.
    pub fn parse_descriptor(desc: &str) -> Result<TypeSig, ModelError> {
        let mut pos = 0;
        let sig = parse_at(desc, &mut pos)?;
        if pos != desc.len() {
            return Err(ModelError::MalformedDescriptor(desc.to_string()));
        }
        Ok(sig)
    }

    /// Erased descriptor text. Type variables erase to `Object`.
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            TypeSig::Primitive(c) => out.push(*c),
            TypeSig::Class { name, .. } => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            TypeSig::Array(inner) => {
                out.push('[');
                inner.write_descriptor(out);
            }
            TypeSig::Var(_) => out.push_str("Ljava/lang/Object;"),
        }
    }
}

fn parse_at(desc: &str, pos: &mut usize) -> Result<TypeSig, ModelError> {
    let bytes = desc.as_bytes();
    let malformed = || ModelError::MalformedDescriptor(desc.to_string());
    let c = *bytes.get(*pos).ok_or_else(malformed)? as char;
    *pos += 1;
    match c {
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 'V' => Ok(TypeSig::Primitive(c)),
        '[' => Ok(TypeSig::array(parse_at(desc, pos)?)),
        'L' => {
            let end = desc[*pos..].find(';').ok_or_else(malformed)? + *pos;
            let name = &desc[*pos..end];
            if name.is_empty() {
                return Err(malformed());
            }
            *pos = end + 1;
            Ok(TypeSig::class(name))
        }
        _ => Err(malformed()),
    }
}

/// Parameter and return types of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
}

impl MethodSignature {
    /// Parse an erased method descriptor such as `(ILa/b;)V`.
    pub fn parse_descriptor(desc: &str) -> Result<Self, ModelError> {
        let malformed = || ModelError::MalformedDescriptor(desc.to_string());
        if !desc.starts_with('(') {
            return Err(malformed());
        }
        let close = desc.find(')').ok_or_else(malformed)?;
        let mut params = Vec::new();
        let mut pos = 1;
        let inner = &desc[..close];
        while pos < close {
            params.push(parse_at(inner, &mut pos).map_err(|_| malformed())?);
        }
        let ret = TypeSig::parse_descriptor(&desc[close + 1..]).map_err(|_| malformed())?;
        Ok(Self { params, ret })
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for p in &self.params {
            out.push_str(&p.descriptor());
        }
        out.push(')');
        out.push_str(&self.ret.descriptor());
        out
    }
}

/// Generic information declared on a class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSignature {
    pub type_params: Vec<String>,
    pub superclass: Option<TypeSig>,
    pub interfaces: Vec<TypeSig>,
}

impl ClassSignature {
    /// The generic reference this class makes to `supertype`, if any.
    pub fn supertype_ref(&self, supertype: &str) -> Option<&TypeSig> {
        self.superclass
            .iter()
            .chain(self.interfaces.iter())
            .find(|s| s.class_name() == Some(supertype))
    }
}

/// Split the parameter section of a method descriptor into per-parameter
/// descriptors.
pub fn split_params(desc: &str) -> Vec<String> {
    MethodSignature::parse_descriptor(desc)
        .map(|sig| sig.params.iter().map(TypeSig::descriptor).collect())
        .unwrap_or_default()
}

/// Return-type section of a method descriptor.
pub fn return_descriptor(desc: &str) -> &str {
    desc.rfind(')').map(|i| &desc[i + 1..]).unwrap_or(desc)
}

/// Array depth and element class name of a descriptor (`[[La/b;` gives
/// `(2, Some("a/b"))`, `I` gives `(0, None)`).
pub fn element_class(desc: &str) -> (usize, Option<&str>) {
    let dims = desc.bytes().take_while(|b| *b == b'[').count();
    let rest = &desc[dims..];
    if rest.len() > 2 && rest.starts_with('L') && rest.ends_with(';') {
        (dims, Some(&rest[1..rest.len() - 1]))
    } else {
        (dims, None)
    }
}
