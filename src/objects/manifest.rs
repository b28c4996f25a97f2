//! Multi-document YAML manifests.
//!
//! Used by the binary as a static event source. Every document has to carry a
//! `kind` that maps onto [`KubeObject`]; documents that are empty (for example a
//! trailing `---`) are skipped.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::KubeObject;
use crate::{Error, Result};

/// Parse every document in `input`.
pub fn load_documents(input: &str) -> Result<Vec<KubeObject>> {
    let mut objects = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let object: KubeObject = serde_yaml::from_value(value)
            .map_err(|e| Error::serialization(format!("document {}: {}", index, e)))?;
        debug!(kind = object.kind(), object = %object.key(), "Loaded manifest object");
        objects.push(object);
    }

    Ok(objects)
}

/// Read and parse a manifest file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<KubeObject>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    load_documents(&contents)
        .map_err(|e| Error::serialization(format!("{}: {}", path.display(), e)))
}
