//! Schema supply: the records a registry is built from, and where they
//! come from.
//!
//! A type record looks like this in YAML:
//!
//! ```yaml
//! name: com.example.Employee
//! inheritsFrom: com.example.Person
//! attributes:
//!   - name: employer
//!     type: com.example.Company
//!   - name: skills
//!     type: List<String>
//! ```
//!
//! and a service record like this:
//!
//! ```yaml
//! name: SyndicationService
//! functions:
//!   - name: fetchLatest
//!     description: Latest entries of a feed
//!     return_type: List<com.example.Entry>
//!     parameters:
//!       - name: feedUrl
//!         type: String
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::SchemaError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One declared attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub name: String,
    /// Type string, e.g. `Map<String,List<Foo>>`.
    #[serde(rename = "type")]
    pub ty: String,
}

/// One declared structured type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeRecord>,
    #[serde(default, rename = "inheritsFrom", alias = "inherits_from")]
    pub inherits_from: Option<String>,
}

impl TypeRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            inherits_from: None,
        }
    }

    /// Adds an attribute, returning the record for chaining.
    pub fn attribute(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.attributes.push(AttributeRecord {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    /// Sets the parent type, returning the record for chaining.
    pub fn inherits(mut self, parent: impl Into<String>) -> Self {
        self.inherits_from = Some(parent.into());
        self
    }
}

/// One declared function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// One declared service function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "returnType")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterRecord>,
}

impl FunctionRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            return_type: None,
            parameters: Vec::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.parameters.push(ParameterRecord {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.return_type = Some(ty.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One declared service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<FunctionRecord>,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn function(mut self, function: FunctionRecord) -> Self {
        self.functions.push(function);
        self
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Supplies parsed schema records to [`TypeRegistry::load`](crate::TypeRegistry::load).
pub trait SchemaSource {
    /// All structured type declarations.
    fn type_records(&self) -> Result<Vec<TypeRecord>, SchemaError>;

    /// All service declarations.
    fn service_records(&self) -> Result<Vec<ServiceRecord>, SchemaError>;
}

/// Schema records held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub types: Vec<TypeRecord>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, record: TypeRecord) -> Self {
        self.types.push(record);
        self
    }

    pub fn with_service(mut self, record: ServiceRecord) -> Self {
        self.services.push(record);
        self
    }

    /// Parses a document with top-level `types` and `services` lists.
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(text).map_err(|source| SchemaError::Yaml {
            origin: "<inline>".to_string(),
            source,
        })
    }

    /// Same shape as [`from_yaml_str`](Self::from_yaml_str), in JSON.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl SchemaSource for SchemaDocument {
    fn type_records(&self) -> Result<Vec<TypeRecord>, SchemaError> {
        Ok(self.types.clone())
    }

    fn service_records(&self) -> Result<Vec<ServiceRecord>, SchemaError> {
        Ok(self.services.clone())
    }
}

/// Reads one record per YAML file from `<root>/types/**/*.yaml` and
/// `<root>/services/**/*.yaml`.
///
/// Files are read in path order so loads are reproducible; the registry
/// itself doesn't depend on the order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_all<T: serde::de::DeserializeOwned>(&self, subdir: &str) -> Result<Vec<T>, SchemaError> {
        let mut files = Vec::new();
        collect_yaml_files(&self.root.join(subdir), &mut files)?;
        files.sort();

        files
            .iter()
            .map(|path| {
                let text = fs::read_to_string(path).map_err(|source| SchemaError::Io {
                    path: path.clone(),
                    source,
                })?;
                serde_yaml::from_str(&text).map_err(|source| SchemaError::Yaml {
                    origin: path.display().to_string(),
                    source,
                })
            })
            .collect()
    }
}

impl SchemaSource for DirectorySource {
    fn type_records(&self) -> Result<Vec<TypeRecord>, SchemaError> {
        self.read_all("types")
    }

    fn service_records(&self) -> Result<Vec<ServiceRecord>, SchemaError> {
        self.read_all("services")
    }
}

/// Recursively gathers `*.yaml` files. A missing directory contributes none.
fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SchemaError> {
    if !dir.is_dir() {
        return Ok(());
    }
    let io_err = |source| SchemaError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "yaml") {
            out.push(path);
        }
    }
    Ok(())
}
