//! Override groups: methods that occupy the same virtual dispatch slot.
//!
//! Built once per program before any pass runs. Types are visited
//! supertypes-first; every ungrouped instance method starts a group, which
//! then absorbs overrides found by walking down the subtype graph. A method
//! overrides when its name and descriptor match, or when its generic
//! parameters match after substituting the subtype's type arguments for the
//! supertype's type variables.

use std::collections::{BTreeMap, BTreeSet};

use remapper_core::descriptor::{MethodSignature, TypeSig};
use remapper_core::{MethodId, Program, TypeId};

#[derive(Debug, Clone)]
pub struct MethodGroup {
    archetype: MethodId,
    members: BTreeSet<MethodId>,
}

impl MethodGroup {
    fn new(archetype: MethodId) -> Self {
        Self {
            archetype,
            members: BTreeSet::from([archetype]),
        }
    }

    pub fn archetype(&self) -> MethodId {
        self.archetype
    }

    pub fn members(&self) -> &BTreeSet<MethodId> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member declared on `ty`.
    pub fn get_override(&self, program: &Program, ty: TypeId) -> Option<MethodId> {
        self.members
            .iter()
            .copied()
            .find(|m| program.method(*m).owner == ty)
    }
}

/// Method-to-group assignment for one program.
#[derive(Debug, Clone, Default)]
pub struct MethodGroups {
    groups: Vec<MethodGroup>,
    group_of: BTreeMap<MethodId, usize>,
}

impl MethodGroups {
    pub fn build(program: &Program, subtypes: &BTreeMap<TypeId, Vec<TypeId>>) -> Self {
        let mut builder = GroupBuilder {
            program,
            subtypes,
            handled: BTreeSet::new(),
            groups: MethodGroups::default(),
        };
        for ty in program.type_ids() {
            builder.process(ty);
        }
        builder.groups
    }

    /// Group of `method`. Static methods and constructors have none.
    pub fn group(&self, method: MethodId) -> Option<&MethodGroup> {
        self.group_of.get(&method).map(|i| &self.groups[*i])
    }

    /// Size of the group `method` belongs to, counting ungrouped methods as
    /// singletons.
    pub fn group_size(&self, method: MethodId) -> usize {
        self.group(method).map_or(1, MethodGroup::len)
    }

    pub fn groups(&self) -> impl Iterator<Item = &MethodGroup> {
        self.groups.iter().filter(|g| !g.is_empty())
    }

    fn start(&mut self, method: MethodId) -> usize {
        let index = self.groups.len();
        self.groups.push(MethodGroup::new(method));
        self.group_of.insert(method, index);
        index
    }

    fn add(&mut self, group: usize, method: MethodId) {
        match self.group_of.get(&method).copied() {
            Some(current) if current == group => {}
            Some(current) => self.merge(group, current),
            None => {
                self.groups[group].members.insert(method);
                self.group_of.insert(method, group);
            }
        }
    }

    /// Move every member of `from` into `into`.
    fn merge(&mut self, into: usize, from: usize) {
        let moved = std::mem::take(&mut self.groups[from].members);
        for m in &moved {
            self.group_of.insert(*m, into);
        }
        self.groups[into].members.extend(moved);
    }
}

struct GroupBuilder<'a> {
    program: &'a Program,
    subtypes: &'a BTreeMap<TypeId, Vec<TypeId>>,
    handled: BTreeSet<TypeId>,
    groups: MethodGroups,
}

impl GroupBuilder<'_> {
    fn process(&mut self, ty: TypeId) {
        if !self.handled.insert(ty) {
            return;
        }
        let program = self.program;
        if let Some(spr) = program.superclass_of(ty) {
            self.process(spr);
        }
        for intr in program.interfaces_of(ty) {
            self.process(intr);
        }

        let methods: Vec<MethodId> = program.instance_methods(ty).collect();
        for m in methods {
            if self.groups.group_of.contains_key(&m) {
                continue;
            }
            let group = self.groups.start(m);
            let entry = program.method(m);
            if entry.is_constructor() || entry.is_static_initializer() {
                continue;
            }
            let mut visited = BTreeSet::from([ty]);
            for sub in self.subtypes_of(ty) {
                let sig = self.subtype_signature(sub, ty, &entry.signature);
                self.discover(sub, &entry.name, &entry.descriptor, &sig, group, &mut visited);
            }
        }
    }

    fn subtypes_of(&self, ty: TypeId) -> Vec<TypeId> {
        self.subtypes.get(&ty).cloned().unwrap_or_default()
    }

    fn discover(
        &mut self,
        next: TypeId,
        name: &str,
        desc: &str,
        sig: &MethodSignature,
        group: usize,
        visited: &mut BTreeSet<TypeId>,
    ) {
        if !visited.insert(next) {
            return;
        }
        let program = self.program;
        let found = program.instance_methods(next).find(|m| {
            let candidate = program.method(*m);
            candidate.name == name
                && (candidate.descriptor == desc || candidate.signature.params == sig.params)
        });

        match found {
            Some(m) => {
                self.groups.add(group, m);
                let entry = program.method(m);
                for sub in self.subtypes_of(next) {
                    let sub_sig = self.subtype_signature(sub, next, &entry.signature);
                    self.discover(sub, &entry.name, &entry.descriptor, &sub_sig, group, visited);
                }
            }
            None => {
                for sub in self.subtypes_of(next) {
                    let sub_sig = self.subtype_signature(sub, next, sig);
                    self.discover(sub, name, desc, &sub_sig, group, visited);
                }
            }
        }
    }

    /// Rewrite `sig`, declared on `owner`, in terms of the type arguments
    /// `sub` passes to `owner`.
    fn subtype_signature(&self, sub: TypeId, owner: TypeId, sig: &MethodSignature) -> MethodSignature {
        let owner_entry = self.program.ty(owner);
        let args = self
            .program
            .ty(sub)
            .signature
            .as_ref()
            .and_then(|s| s.supertype_ref(&owner_entry.name))
            .and_then(|r| match r {
                TypeSig::Class { args, .. } => Some(args),
                _ => None,
            });
        let (Some(args), Some(owner_sig)) = (args, owner_entry.signature.as_ref()) else {
            return sig.clone();
        };
        let params = sig
            .params
            .iter()
            .map(|p| match p {
                TypeSig::Var(var) => owner_sig
                    .type_params
                    .iter()
                    .position(|tp| tp == var)
                    .and_then(|j| args.get(j))
                    .and_then(|arg| arg.sig.clone())
                    .unwrap_or_else(|| p.clone()),
                _ => p.clone(),
            })
            .collect();
        MethodSignature {
            params,
            ret: sig.ret.clone(),
        }
    }
}
