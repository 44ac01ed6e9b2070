//! Error types for schema loading and lookups.

use std::path::PathBuf;

/// Errors raised while loading a schema or looking something up in it.
///
/// Everything raised by [`TypeRegistry::load`](crate::TypeRegistry::load)
/// is fatal: a registry is either complete and consistent or not built
/// at all. The `Undefined*` variants are also raised later, while a
/// request is being built, when a caller names something the schema
/// doesn't have.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A schema file couldn't be read.
    #[error("failed to read schema file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A YAML schema document didn't parse.
    #[error("invalid YAML schema in {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A JSON schema document didn't parse.
    #[error("invalid JSON schema: {0}")]
    Json(#[from] serde_json::Error),

    /// The schema parsed but violates a structural rule.
    #[error("malformed schema: {0}")]
    Malformed(String),

    /// A declared type string isn't valid `Outer<Inner,...>` syntax.
    #[error("invalid type reference `{reference}`: {reason}")]
    InvalidTypeRef { reference: String, reason: String },

    /// Two type definitions share a wire name.
    #[error("type `{0}` is defined more than once")]
    DuplicateType(String),

    /// Two service definitions share a name.
    #[error("service `{0}` is defined more than once")]
    DuplicateService(String),

    /// A type (transitively) inherits from itself.
    #[error("inheritance cycle through `{0}`")]
    InheritanceCycle(String),

    /// No type is registered under this name.
    #[error("undefined type `{0}`")]
    UndefinedType(String),

    /// No service is registered under this name.
    #[error("undefined service `{0}`")]
    UndefinedService(String),

    /// The service has no function with this name.
    #[error("service `{service}` has no function `{function}`")]
    UndefinedFunction { service: String, function: String },

    /// The function has no parameter with this name.
    #[error("function `{function}` has no parameter `{parameter}`")]
    UndefinedParameter { function: String, parameter: String },
}
