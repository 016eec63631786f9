//! # remapper-engine
//!
//! Carries a name mapping from one obfuscated build of a program onto the
//! next build, where every obfuscated name may have changed.
//!
//! ## Approach
//!
//! Both builds are loaded as decompiled ASTs. A pipeline of heuristic passes
//! casts votes for `old -> new` pairs of types, methods and fields into a
//! shared ledger:
//!
//! 1. **Anchors**: string literals used by a single type, enum constant sets,
//!    and compiler-generated bridges that keep their readable names.
//! 2. **Structure**: unique references from matched code, discrete member
//!    signatures, override groups and nested types.
//! 3. **Tree merging**: confirmed method pairs have their bodies walked in
//!    lockstep, voting every type, field and method the two sides reference.
//!
//! A vote collector confirms the most decisive pending matches each cycle,
//! and the loop repeats until a cycle confirms nothing. The confirmed ledger
//! is finally projected onto the new build as a mapping.
//!
//! ## Example
//!
//! ```rust
//! use remapper_core::{MappingSet, MergeSettings, Program, TypeEntry};
//! use remapper_engine::MergeEngine;
//!
//! let mut old = Program::new();
//! old.add_type(TypeEntry::class("a")).unwrap();
//! let mut new = Program::new();
//! new.add_type(TypeEntry::class("b")).unwrap();
//!
//! let mut names = MappingSet::new();
//! names.add_type("a", "com/example/Widget");
//!
//! let mut engine =
//!     MergeEngine::new(&old, &names, &new, MappingSet::new(), MergeSettings::default())
//!         .with_default_pipeline();
//! engine.merge().unwrap();
//! println!("{} types named", engine.output().type_count());
//! ```

pub mod collector;
pub mod engine;
pub mod error;
mod finalize;
pub mod groups;
pub mod ledger;
pub mod operations;
pub mod pipeline;
pub mod tree_merge;

pub use collector::VoteCollector;
pub use engine::MergeEngine;
pub use error::{MatchKind, MergeError};
pub use groups::{MethodGroup, MethodGroups};
pub use ledger::{Ledger, MatchEntry, Partition};
pub use pipeline::{changes_since_reset, default_steps, MergeOperation, Predicate, Step, LOOP_START};
