//! The heuristic passes of the default pipeline.

pub mod custom;
pub mod discrete;
pub mod enums;
pub mod initializers;
pub mod inner_classes;
pub mod matched_members;
pub mod matched_types;
pub mod method_groups;
pub mod references;
pub mod string_constants;
pub mod synthetic_overloads;

pub use custom::{CustomHandler, CustomMethodMergers, MethodKey};
pub use discrete::{MatchDiscreteFields, MatchDiscreteMethods};
pub use enums::MatchEnums;
pub use initializers::MergeInitializers;
pub use inner_classes::MatchInnerClasses;
pub use matched_members::{MergeMatchedFields, MergeMatchedMethods};
pub use matched_types::MergeMatchedTypes;
pub use method_groups::MatchMethodGroups;
pub use references::MatchReferences;
pub use string_constants::MatchStringConstants;
pub use synthetic_overloads::MergeSyntheticOverloads;
