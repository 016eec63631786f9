//! In-memory program model.
//!
//! One [`Program`] holds every decompiled type of a single build in an arena.
//! Types, methods and fields are addressed by copyable ids so that match
//! state elsewhere can key on them without borrowing the program.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ast::Statement;
use crate::descriptor::{ClassSignature, MethodSignature, TypeSig};
use crate::error::ModelError;

pub const CONSTRUCTOR: &str = "<init>";
pub const STATIC_INITIALIZER: &str = "<clinit>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: String,
    pub kind: TypeKind,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<ClassSignature>,
    /// Declared constant names, in declaration order. Empty for non-enums.
    pub enum_constants: Vec<String>,
    methods: Vec<MethodId>,
    fields: Vec<FieldId>,
}

impl TypeEntry {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            superclass: None,
            interfaces: Vec::new(),
            signature: None,
            enum_constants: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Class)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Interface)
    }

    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        constants: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut entry = Self::new(name, TypeKind::Enum);
        entry.enum_constants = constants.into_iter().map(Into::into).collect();
        entry
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_signature(mut self, signature: ClassSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn is_enum(&self) -> bool {
        self.kind == TypeKind::Enum
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Annotation)
    }

    /// Nested types carry a `$` in their internal name.
    pub fn is_inner(&self) -> bool {
        self.name.contains('$')
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous_index().is_some()
    }

    /// The numeric suffix of an anonymous class (`a$3` gives 3).
    pub fn anonymous_index(&self) -> Option<u32> {
        anonymous_index(&self.name)
    }

    pub fn outer_name(&self) -> Option<&str> {
        self.name.rfind('$').map(|i| &self.name[..i])
    }

    pub fn methods(&self) -> &[MethodId] {
        &self.methods
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }
}

/// Numeric suffix after the last `$`, if the suffix is all digits.
pub fn anonymous_index(name: &str) -> Option<u32> {
    let idx = name.rfind('$')?;
    let suffix = &name[idx + 1..];
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodEntry {
    /// Assigned by [`Program::add_method`].
    pub owner: TypeId,
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    pub is_synthetic: bool,
    pub signature: MethodSignature,
    pub body: Option<Vec<Statement>>,
}

impl MethodEntry {
    /// A concrete instance method with an erased signature derived from
    /// `descriptor`.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Result<Self, ModelError> {
        let descriptor = descriptor.into();
        let signature = MethodSignature::parse_descriptor(&descriptor)?;
        Ok(Self {
            owner: TypeId(0),
            name: name.into(),
            descriptor,
            is_static: false,
            is_synthetic: false,
            signature,
            body: None,
        })
    }

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn with_synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }

    pub fn with_signature(mut self, signature: MethodSignature) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_body(mut self, body: Vec<Statement>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER
    }

    /// Statements of the body, empty when the method is abstract or native.
    pub fn statements(&self) -> &[Statement] {
        self.body.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldEntry {
    /// Assigned by [`Program::add_field`].
    pub owner: TypeId,
    pub name: String,
    pub descriptor: String,
    pub ty: TypeSig,
    pub is_static: bool,
}

impl FieldEntry {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Result<Self, ModelError> {
        let descriptor = descriptor.into();
        let ty = TypeSig::parse_descriptor(&descriptor)?;
        Ok(Self {
            owner: TypeId(0),
            name: name.into(),
            descriptor,
            ty,
            is_static: false,
        })
    }

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Replace the erased type with a generic one.
    pub fn with_type(mut self, ty: TypeSig) -> Self {
        self.ty = ty;
        self
    }
}

/// Every type of one program build.
///
/// Deserialized programs are checked with [`Program::validate`] before
/// they are handed out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "ProgramParts")]
pub struct Program {
    types: Vec<TypeEntry>,
    methods: Vec<MethodEntry>,
    fields: Vec<FieldEntry>,
    by_name: BTreeMap<String, TypeId>,
}

#[derive(Deserialize)]
struct ProgramParts {
    types: Vec<TypeEntry>,
    methods: Vec<MethodEntry>,
    fields: Vec<FieldEntry>,
    by_name: BTreeMap<String, TypeId>,
}

impl TryFrom<ProgramParts> for Program {
    type Error = ModelError;

    fn try_from(parts: ProgramParts) -> Result<Self, ModelError> {
        let program = Self {
            types: parts.types,
            methods: parts.methods,
            fields: parts.fields,
            by_name: parts.by_name,
        };
        program.validate()?;
        Ok(program)
    }
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, entry: TypeEntry) -> Result<TypeId, ModelError> {
        if self.by_name.contains_key(&entry.name) {
            return Err(ModelError::DuplicateType(entry.name));
        }
        let id = TypeId(self.types.len() as u32);
        self.by_name.insert(entry.name.clone(), id);
        self.types.push(entry);
        Ok(id)
    }

    pub fn add_method(&mut self, owner: TypeId, mut entry: MethodEntry) -> Result<MethodId, ModelError> {
        let id = MethodId(self.methods.len() as u32);
        let ty = self
            .types
            .get_mut(owner.0 as usize)
            .ok_or(ModelError::UnknownType(owner.0))?;
        ty.methods.push(id);
        entry.owner = owner;
        self.methods.push(entry);
        Ok(id)
    }

    pub fn add_field(&mut self, owner: TypeId, mut entry: FieldEntry) -> Result<FieldId, ModelError> {
        let id = FieldId(self.fields.len() as u32);
        let ty = self
            .types
            .get_mut(owner.0 as usize)
            .ok_or(ModelError::UnknownType(owner.0))?;
        ty.fields.push(id);
        entry.owner = owner;
        self.fields.push(entry);
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Check that every id resolves and that the arena links agree.
    ///
    /// Each member must be listed by exactly one type, and that type must be
    /// its owner. The name index must cover every type once.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.by_name.len() != self.types.len() {
            let missing = self
                .types
                .iter()
                .find(|t| !self.by_name.contains_key(&t.name))
                .map_or_else(String::new, |t| t.name.clone());
            return Err(ModelError::NameIndex(missing));
        }
        for (name, id) in &self.by_name {
            let ty = self
                .types
                .get(id.0 as usize)
                .ok_or(ModelError::UnknownType(id.0))?;
            if &ty.name != name {
                return Err(ModelError::NameIndex(name.clone()));
            }
        }

        let mut methods_seen = vec![false; self.methods.len()];
        let mut fields_seen = vec![false; self.fields.len()];
        for (index, ty) in self.types.iter().enumerate() {
            let owner = TypeId(index as u32);
            for id in &ty.methods {
                let entry = self
                    .methods
                    .get(id.0 as usize)
                    .ok_or(ModelError::UnknownMethod(id.0))?;
                let seen = &mut methods_seen[id.0 as usize];
                if entry.owner != owner || *seen {
                    return Err(ModelError::MisplacedMember(format!("{}.{}", ty.name, entry.name)));
                }
                *seen = true;
            }
            for id in &ty.fields {
                let entry = self
                    .fields
                    .get(id.0 as usize)
                    .ok_or(ModelError::UnknownField(id.0))?;
                let seen = &mut fields_seen[id.0 as usize];
                if entry.owner != owner || *seen {
                    return Err(ModelError::MisplacedMember(format!("{}.{}", ty.name, entry.name)));
                }
                *seen = true;
            }
        }
        if let Some(i) = methods_seen.iter().position(|s| !s) {
            return Err(ModelError::MisplacedMember(self.methods[i].name.clone()));
        }
        if let Some(i) = fields_seen.iter().position(|s| !s) {
            return Err(ModelError::MisplacedMember(self.fields[i].name.clone()));
        }
        Ok(())
    }

    pub fn ty(&self, id: TypeId) -> &TypeEntry {
        &self.types[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodEntry {
        &self.methods[id.0 as usize]
    }

    pub fn field(&self, id: FieldId) -> &FieldEntry {
        &self.fields[id.0 as usize]
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId)
    }

    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> {
        (0..self.methods.len() as u32).map(MethodId)
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> {
        (0..self.fields.len() as u32).map(FieldId)
    }

    pub fn owner_name(&self, method: MethodId) -> &str {
        &self.ty(self.method(method).owner).name
    }

    pub fn field_owner_name(&self, field: FieldId) -> &str {
        &self.ty(self.field(field).owner).name
    }

    pub fn instance_methods(&self, ty: TypeId) -> impl Iterator<Item = MethodId> + '_ {
        self.ty(ty)
            .methods
            .iter()
            .copied()
            .filter(|m| !self.method(*m).is_static)
    }

    pub fn static_methods(&self, ty: TypeId) -> impl Iterator<Item = MethodId> + '_ {
        self.ty(ty)
            .methods
            .iter()
            .copied()
            .filter(|m| self.method(*m).is_static)
    }

    pub fn superclass_of(&self, ty: TypeId) -> Option<TypeId> {
        self.ty(ty).superclass.as_deref().and_then(|s| self.get(s))
    }

    /// Interfaces of `ty` that are part of this program.
    pub fn interfaces_of(&self, ty: TypeId) -> Vec<TypeId> {
        self.ty(ty)
            .interfaces
            .iter()
            .filter_map(|i| self.get(i))
            .collect()
    }

    /// A method declared directly on `ty`, static or not.
    pub fn method_named(&self, ty: TypeId, name: &str, descriptor: &str) -> Option<MethodId> {
        self.ty(ty).methods.iter().copied().find(|m| {
            let entry = self.method(*m);
            entry.name == name && entry.descriptor == descriptor
        })
    }

    pub fn static_initializer(&self, ty: TypeId) -> Option<MethodId> {
        self.static_methods(ty)
            .find(|m| self.method(*m).is_static_initializer())
    }

    pub fn field_named(&self, ty: TypeId, name: &str) -> Option<FieldId> {
        self.ty(ty)
            .fields
            .iter()
            .copied()
            .find(|f| self.field(*f).name == name)
    }

    /// Resolve an instance invoke target: `ty` first, then its superclass
    /// chain.
    pub fn find_method(&self, ty: TypeId, name: &str, descriptor: &str) -> Option<MethodId> {
        let mut visited = BTreeSet::new();
        let mut current = Some(ty);
        while let Some(t) = current {
            if !visited.insert(t) {
                break;
            }
            let found = self.instance_methods(t).find(|m| {
                let entry = self.method(*m);
                entry.name == name && entry.descriptor == descriptor
            });
            if found.is_some() {
                return found;
            }
            current = self.superclass_of(t);
        }
        None
    }

    /// Resolve a static invoke target, searching superclasses and interfaces.
    pub fn find_static_method(&self, ty: TypeId, name: &str, descriptor: &str) -> Option<MethodId> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![ty];
        while let Some(t) = stack.pop() {
            if !visited.insert(t) {
                continue;
            }
            let found = self.static_methods(t).find(|m| {
                let entry = self.method(*m);
                entry.name == name && entry.descriptor == descriptor
            });
            if found.is_some() {
                return found;
            }
            let mut next = self.interfaces_of(t);
            next.extend(self.superclass_of(t));
            // superclass is popped first
            stack.extend(next);
        }
        None
    }

    /// Resolve a field reference through the superclass chain.
    pub fn find_field(&self, ty: TypeId, name: &str) -> Option<FieldId> {
        let mut visited = BTreeSet::new();
        let mut current = Some(ty);
        while let Some(t) = current {
            if !visited.insert(t) {
                break;
            }
            if let Some(f) = self.field_named(t, name) {
                return Some(f);
            }
            current = self.superclass_of(t);
        }
        None
    }

    /// Direct subtypes of every type, from `extends` and `implements` edges
    /// that stay inside this program.
    pub fn subtypes(&self) -> BTreeMap<TypeId, Vec<TypeId>> {
        let mut out: BTreeMap<TypeId, Vec<TypeId>> = BTreeMap::new();
        for t in self.type_ids() {
            if let Some(spr) = self.superclass_of(t) {
                out.entry(spr).or_default().push(t);
            }
            for intr in self.interfaces_of(t) {
                out.entry(intr).or_default().push(t);
            }
        }
        out
    }
}

/// A stand-in for an old-side entity that has no node in the old program.
/// The name it carries is already a plain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Synthetic {
    pub owner: Option<String>,
    pub name: String,
    pub descriptor: Option<String>,
}

/// Either a node of a program or a [`Synthetic`] placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Handle<Id> {
    Real(Id),
    Synthetic(Synthetic),
}

impl<Id: Copy> Handle<Id> {
    pub fn real(&self) -> Option<Id> {
        match self {
            Handle::Real(id) => Some(*id),
            Handle::Synthetic(_) => None,
        }
    }

    pub fn synthetic(&self) -> Option<&Synthetic> {
        match self {
            Handle::Real(_) => None,
            Handle::Synthetic(s) => Some(s),
        }
    }
}

impl<Id> From<Id> for Handle<Id> {
    fn from(id: Id) -> Self {
        Handle::Real(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Program, TypeId, TypeId) {
        let mut p = Program::new();
        let base = p.add_type(TypeEntry::class("a")).unwrap();
        let sub = p
            .add_type(TypeEntry::class("b").extends("a").implements("c"))
            .unwrap();
        let intr = p.add_type(TypeEntry::interface("c")).unwrap();
        p.add_method(base, MethodEntry::new("m", "()V").unwrap()).unwrap();
        p.add_method(intr, MethodEntry::new("s", "()I").unwrap().with_static())
            .unwrap();
        p.add_field(base, FieldEntry::new("f", "I").unwrap()).unwrap();
        (p, base, sub)
    }

    #[test]
    fn test_anonymous_names() {
        let anon = TypeEntry::class("a$12");
        assert!(anon.is_anonymous());
        assert_eq!(anon.anonymous_index(), Some(12));
        assert_eq!(anon.outer_name(), Some("a"));
        let named = TypeEntry::class("a$Inner");
        assert!(named.is_inner());
        assert!(!named.is_anonymous());
        assert!(!TypeEntry::class("a$").is_anonymous());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let (mut p, _, _) = sample();
        assert_eq!(
            p.add_type(TypeEntry::class("a")).unwrap_err(),
            ModelError::DuplicateType("a".into())
        );
        assert!(p.add_method(TypeId(99), MethodEntry::new("x", "()V").unwrap()).is_err());
    }

    #[test]
    fn test_member_lookup_walks_hierarchy() {
        let (p, base, sub) = sample();
        let m = p.find_method(sub, "m", "()V").unwrap();
        assert_eq!(p.method(m).owner, base);
        assert!(p.find_method(sub, "s", "()I").is_none());
        let s = p.find_static_method(sub, "s", "()I").unwrap();
        assert_eq!(p.owner_name(s), "c");
        assert_eq!(p.find_field(sub, "f").map(|f| p.field(f).owner), Some(base));
    }

    #[test]
    fn test_subtypes() {
        let (p, base, sub) = sample();
        let subs = p.subtypes();
        assert_eq!(subs[&base], vec![sub]);
        assert_eq!(subs[&p.get("c").unwrap()], vec![sub]);
    }

    #[test]
    fn test_deserialize_rejects_dangling_ids() {
        let (p, _, _) = sample();
        assert!(p.validate().is_ok());
        let value = serde_json::to_value(&p).unwrap();
        let back: Program = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(back.type_count(), p.type_count());

        let mut dangling = value.clone();
        dangling["types"][0]["methods"] = serde_json::json!([99]);
        let err = serde_json::from_value::<Program>(dangling).unwrap_err();
        assert!(err.to_string().contains("no method with id 99"));

        let mut stolen = value.clone();
        stolen["fields"][0]["owner"] = serde_json::json!(2);
        assert!(serde_json::from_value::<Program>(stolen).is_err());

        let mut renamed = value;
        renamed["types"][1]["name"] = serde_json::json!("z");
        assert!(serde_json::from_value::<Program>(renamed).is_err());
    }
}
