pub mod ast;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod mappings;
pub mod model;

pub use config::{CollectorSettings, MergeSettings};
pub use error::ModelError;
pub use mappings::MappingSet;
pub use model::{FieldEntry, FieldId, Handle, MethodEntry, MethodId, Program, Synthetic, TypeEntry, TypeId, TypeKind};
