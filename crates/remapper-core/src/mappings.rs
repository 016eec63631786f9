//! In-memory name mapping store.
//!
//! Keys are always obfuscated names (type, owner + field, owner + method name
//! + descriptor); values are plain names. Type mappings are kept bijective so
//! that plain names can be looked up in reverse.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Obfuscated-to-plain names for one program build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredMappings", into = "StoredMappings")]
pub struct MappingSet {
    types: BTreeMap<String, String>,
    inverse_types: BTreeMap<String, String>,
    fields: BTreeMap<String, BTreeMap<String, String>>,
    /// owner -> (name, descriptor) -> plain name
    methods: BTreeMap<String, BTreeMap<(String, String), String>>,
}

/// Serialized form: JSON object keys must be strings, so method keys are
/// flattened to `name(desc)ret`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredMappings {
    #[serde(default)]
    types: BTreeMap<String, String>,
    #[serde(default)]
    fields: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    methods: BTreeMap<String, BTreeMap<String, String>>,
}

impl From<StoredMappings> for MappingSet {
    fn from(stored: StoredMappings) -> Self {
        let mut set = MappingSet::new();
        for (obf, plain) in stored.types {
            set.add_type(&obf, &plain);
        }
        for (owner, fields) in stored.fields {
            for (name, plain) in fields {
                set.add_field(&owner, &name, &plain);
            }
        }
        for (owner, methods) in stored.methods {
            for (key, plain) in methods {
                if let Some(split) = key.find('(') {
                    set.add_method(&owner, &key[..split], &key[split..], &plain);
                }
            }
        }
        set
    }
}

impl From<MappingSet> for StoredMappings {
    fn from(set: MappingSet) -> Self {
        StoredMappings {
            types: set.types,
            fields: set.fields,
            methods: set
                .methods
                .into_iter()
                .map(|(owner, methods)| {
                    let flat = methods
                        .into_iter()
                        .map(|((name, desc), plain)| (format!("{name}{desc}"), plain))
                        .collect();
                    (owner, flat)
                })
                .collect(),
        }
    }
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.fields.is_empty() && self.methods.is_empty()
    }

    pub fn map_type(&self, obf: &str) -> Option<&str> {
        self.types.get(obf).map(String::as_str)
    }

    /// The plain name of `obf`, or `obf` itself when unmapped.
    pub fn map_type_safe<'a>(&'a self, obf: &'a str) -> &'a str {
        self.map_type(obf).unwrap_or(obf)
    }

    pub fn inverse_type(&self, plain: &str) -> Option<&str> {
        self.inverse_types.get(plain).map(String::as_str)
    }

    /// Record a type mapping. Returns `false` and leaves the set untouched
    /// when either name is already taken.
    pub fn add_type(&mut self, obf: &str, plain: &str) -> bool {
        if let Some(existing) = self.types.get(obf) {
            if existing != plain {
                debug!(obf, existing = %existing, plain, "type already mapped");
            }
            return false;
        }
        if let Some(other) = self.inverse_types.get(plain) {
            debug!(obf, plain, other = %other, "plain type name already claimed");
            return false;
        }
        self.types.insert(obf.to_string(), plain.to_string());
        self.inverse_types.insert(plain.to_string(), obf.to_string());
        true
    }

    pub fn map_field(&self, owner: &str, name: &str) -> Option<&str> {
        self.fields.get(owner)?.get(name).map(String::as_str)
    }

    pub fn add_field(&mut self, owner: &str, name: &str, plain: &str) -> bool {
        let fields = self.fields.entry(owner.to_string()).or_default();
        if fields.contains_key(name) {
            return false;
        }
        fields.insert(name.to_string(), plain.to_string());
        true
    }

    pub fn map_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.methods
            .get(owner)?
            .get(&(name.to_string(), descriptor.to_string()))
            .map(String::as_str)
    }

    pub fn add_method(&mut self, owner: &str, name: &str, descriptor: &str, plain: &str) -> bool {
        let methods = self.methods.entry(owner.to_string()).or_default();
        let key = (name.to_string(), descriptor.to_string());
        if methods.contains_key(&key) {
            return false;
        }
        methods.insert(key, plain.to_string());
        true
    }

    /// Map every class reference inside a field descriptor.
    pub fn map_field_descriptor(&self, desc: &str) -> String {
        let dims = desc.bytes().take_while(|b| *b == b'[').count();
        let rest = &desc[dims..];
        let mut out = "[".repeat(dims);
        if rest.len() > 2 && rest.starts_with('L') && rest.ends_with(';') {
            out.push('L');
            out.push_str(self.map_type_safe(&rest[1..rest.len() - 1]));
            out.push(';');
        } else {
            out.push_str(rest);
        }
        out
    }

    /// Map every class reference inside a method descriptor.
    pub fn map_descriptor(&self, desc: &str) -> String {
        let Some(close) = desc.find(')') else {
            return self.map_field_descriptor(desc);
        };
        let params = desc[..close].strip_prefix('(').unwrap_or(&desc[..close]);
        let mut out = String::from("(");
        let mut start = 0;
        let mut i = 0;
        while let Some(c) = params[i..].chars().next() {
            let end = match c {
                '[' => {
                    i += 1;
                    continue;
                }
                'L' => params[i..].find(';').map_or(params.len(), |e| i + e + 1),
                _ => i + c.len_utf8(),
            };
            out.push_str(&self.map_field_descriptor(&params[start..end]));
            start = end;
            i = end;
        }
        out.push_str(&params[start..]);
        out.push(')');
        out.push_str(&self.map_field_descriptor(&desc[close + 1..]));
        out
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.values().map(BTreeMap::len).sum()
    }

    pub fn method_count(&self) -> usize {
        self.methods.values().map(BTreeMap::len).sum()
    }

    /// `(obf, plain)` for every mapped type, ordered by obfuscated name.
    pub fn types(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.iter().map(|(o, p)| (o.as_str(), p.as_str()))
    }

    /// `(owner, name, plain)` for every mapped field.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.fields.iter().flat_map(|(owner, fields)| {
            fields
                .iter()
                .map(move |(name, plain)| (owner.as_str(), name.as_str(), plain.as_str()))
        })
    }

    /// `(owner, name, descriptor, plain)` for every mapped method.
    pub fn methods(&self) -> impl Iterator<Item = (&str, &str, &str, &str)> {
        self.methods.iter().flat_map(|(owner, methods)| {
            methods.iter().map(move |((name, desc), plain)| {
                (owner.as_str(), name.as_str(), desc.as_str(), plain.as_str())
            })
        })
    }

    /// A copy without any type whose plain name starts with one of
    /// `prefixes`, along with that type's members.
    pub fn excluding_packages(&self, prefixes: &[String]) -> MappingSet {
        if prefixes.is_empty() {
            return self.clone();
        }
        let excluded = |obf: &str| {
            self.map_type(obf)
                .is_some_and(|plain| prefixes.iter().any(|p| plain.starts_with(p.as_str())))
        };
        let mut out = MappingSet::new();
        for (obf, plain) in self.types() {
            if !excluded(obf) {
                out.add_type(obf, plain);
            }
        }
        for (owner, name, plain) in self.fields() {
            if !excluded(owner) {
                out.add_field(owner, name, plain);
            }
        }
        for (owner, name, desc, plain) in self.methods() {
            if !excluded(owner) {
                out.add_method(owner, name, desc, plain);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MappingSet {
        let mut m = MappingSet::new();
        m.add_type("a", "net/example/Foo");
        m.add_type("b", "net/example/Bar");
        m.add_type("c", "org/other/Baz");
        m.add_field("a", "f", "count");
        m.add_method("a", "m", "(Lb;I)La;", "convert");
        m.add_method("c", "n", "()V", "run");
        m
    }

    #[test]
    fn test_type_mapping_is_bijective() {
        let mut m = sample();
        assert_eq!(m.map_type("a"), Some("net/example/Foo"));
        assert_eq!(m.inverse_type("net/example/Bar"), Some("b"));
        assert!(!m.add_type("a", "net/example/Other"));
        assert!(!m.add_type("d", "net/example/Foo"));
        assert_eq!(m.map_type_safe("zz"), "zz");
        assert_eq!(m.type_count(), 3);
    }

    #[test]
    fn test_member_first_writer_wins() {
        let mut m = sample();
        assert!(!m.add_field("a", "f", "other"));
        assert_eq!(m.map_field("a", "f"), Some("count"));
        assert!(!m.add_method("a", "m", "(Lb;I)La;", "other"));
        assert_eq!(m.map_method("a", "m", "(Lb;I)La;"), Some("convert"));
        assert_eq!(m.map_method("a", "m", "()V"), None);
    }

    #[test]
    fn test_map_descriptor() {
        let m = sample();
        assert_eq!(
            m.map_descriptor("(Lb;[[LaI;IJ)[La;"),
            "(Lnet/example/Bar;[[LaI;IJ)[Lnet/example/Foo;"
        );
        assert_eq!(m.map_descriptor("()V"), "()V");
        assert_eq!(m.map_field_descriptor("[Lc;"), "[Lorg/other/Baz;");
    }

    #[test]
    fn test_map_descriptor_non_ascii() {
        let mut m = sample();
        m.add_type("é", "net/example/E");
        assert_eq!(m.map_descriptor("(Lé;Iü[Lé;)Lé;"), "(Lnet/example/E;Iü[Lnet/example/E;)Lnet/example/E;");
        assert_eq!(m.map_descriptor("(Lé)V"), "(Lé)V");
        assert_eq!(m.map_descriptor("(ü[)V"), "(ü[)V");
        assert_eq!(m.map_descriptor("é)V"), "(é)V");
    }

    #[test]
    fn test_excluding_packages() {
        let m = sample().excluding_packages(&["org/other/".to_string()]);
        assert_eq!(m.map_type("c"), None);
        assert_eq!(m.map_method("c", "n", "()V"), None);
        assert_eq!(m.map_field("a", "f"), Some("count"));
        assert_eq!(m.method_count(), 1);
    }

    #[test]
    fn test_json_round_trip_keeps_inverse() {
        let m = sample();
        let json = serde_json::to_string(&m).unwrap();
        let back: MappingSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.inverse_type("org/other/Baz"), Some("c"));
    }
}
