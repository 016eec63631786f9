use thiserror::Error;

/// Errors raised while building or querying a program model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("malformed descriptor `{0}`")]
    MalformedDescriptor(String),
    #[error("type `{0}` is declared twice")]
    DuplicateType(String),
    #[error("no type with id {0} in this program")]
    UnknownType(u32),
    #[error("no method with id {0} in this program")]
    UnknownMethod(u32),
    #[error("no field with id {0} in this program")]
    UnknownField(u32),
    #[error("member `{0}` is not listed exactly once by its owning type")]
    MisplacedMember(String),
    #[error("name index disagrees with type `{0}`")]
    NameIndex(String),
}
