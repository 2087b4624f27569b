// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manifest parsing.
//!
//! A manifest is JSON (an array or a single object) or YAML with one or
//! more `---`-separated documents. Every document declares one resource and
//! must carry a string `kind` naming a registered [`ResourceKind`].
//!
//! # Example
//!
//! ```
//! use odahu_api_rs::manifest::parse_stream;
//!
//! let changes = parse_stream(
//!     "kind: Connection\nid: git-repo\nspec:\n  type: git\n",
//!     "inline",
//! ).unwrap();
//! assert_eq!(changes.len(), 1);
//! assert_eq!(changes.items()[0].resource_id, "git-repo");
//! ```

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{OdahuError, Result};
use crate::resources::{ResourceKind, ResourceRecord};

/// One declared resource and its id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeItem {
    pub resource_id: String,
    pub resource: ResourceRecord,
}

impl ChangeItem {
    pub fn new(resource: ResourceRecord) -> Self {
        Self {
            resource_id: resource.id.clone(),
            resource,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind
    }
}

/// Ordered list of declared resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<ChangeItem>,
}

impl ChangeSet {
    pub fn new(changes: Vec<ChangeItem>) -> Self {
        Self { changes }
    }

    pub fn items(&self) -> &[ChangeItem] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Append another set, keeping source order.
    pub fn extend(&mut self, other: ChangeSet) {
        self.changes.extend(other.changes);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeItem> {
        self.changes.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeItem;
    type IntoIter = std::vec::IntoIter<ChangeItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeItem;
    type IntoIter = std::slice::Iter<'a, ChangeItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl FromIterator<ChangeItem> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = ChangeItem>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Parse manifest text.
///
/// JSON is tried first, then multi-document YAML. `source` names the input
/// in error messages. Parsing is all-or-nothing: any invalid document fails
/// the whole call.
///
/// # Errors
///
/// [`OdahuError::Manifest`] when the text is neither JSON nor YAML, when a
/// document is not a mapping, or when its `kind` is missing, not a string,
/// or not registered.
#[allow(clippy::result_large_err)]
pub fn parse_stream(text: &str, source: &str) -> Result<ChangeSet> {
    let documents = match serde_json::from_str::<Value>(text) {
        Ok(value) => vec![value],
        Err(_) => load_yaml_documents(text).map_err(|e| {
            debug!(target: "odahu_api::apply", "YAML parsing of {} failed: {}", source, e);
            OdahuError::Manifest(format!("'{source}' is not valid JSON or YAML"))
        })?,
    };

    let mut items = Vec::new();
    for document in documents {
        flatten_into(document, &mut items);
    }

    items
        .into_iter()
        .map(|item| build_resource(item).map(ChangeItem::new))
        .collect()
}

/// Parse manifest text from a reader.
#[allow(clippy::result_large_err)]
pub fn parse_reader<R: Read>(mut reader: R, source: &str) -> Result<ChangeSet> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_stream(&text, source)
}

/// Parse a manifest file.
///
/// # Errors
///
/// [`OdahuError::FileNotFound`] if `path` does not exist, otherwise as
/// [`parse_stream`].
#[allow(clippy::result_large_err)]
pub fn parse_resources_file(path: impl AsRef<Path>) -> Result<ChangeSet> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(OdahuError::FileNotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    parse_stream(&text, &path.display().to_string())
}

/// Parse every regular file of a directory, in file name order.
#[allow(clippy::result_large_err)]
pub fn parse_resources_dir(dir: impl AsRef<Path>) -> Result<ChangeSet> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(OdahuError::FileNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut changes = ChangeSet::default();
    for file in files {
        changes.extend(parse_resources_file(&file)?);
    }
    Ok(changes)
}

/// Parse a manifest file that must declare exactly one resource.
#[allow(clippy::result_large_err)]
pub fn parse_resources_file_with_one_item(path: impl AsRef<Path>) -> Result<ChangeItem> {
    let path = path.as_ref();
    let changes = parse_resources_file(path)?;
    if changes.len() != 1 {
        return Err(OdahuError::Manifest(format!(
            "'{}' should contain 1 item, but {} found",
            path.display(),
            changes.len()
        )));
    }
    changes
        .into_iter()
        .next()
        .ok_or_else(|| OdahuError::Manifest(format!("'{}' is empty", path.display())))
}

fn load_yaml_documents(text: &str) -> std::result::Result<Vec<Value>, serde_yaml::Error> {
    serde_yaml::Deserializer::from_str(text)
        .map(Value::deserialize)
        .collect()
}

/// Collect resource candidates: arrays are flattened, nulls dropped.
fn flatten_into(value: Value, items: &mut Vec<Value>) {
    match value {
        Value::Null => {}
        Value::Array(values) => {
            for value in values {
                flatten_into(value, items);
            }
        }
        other => items.push(other),
    }
}

#[allow(clippy::result_large_err)]
fn build_resource(declaration: Value) -> Result<ResourceRecord> {
    let object = match &declaration {
        Value::Object(object) => object,
        other => {
            return Err(OdahuError::Manifest(format!(
                "Invalid resource in manifest: {other}"
            )))
        }
    };

    let kind = match object.get("kind") {
        None | Some(Value::Null) => {
            return Err(OdahuError::Manifest(format!(
                "Kind of object {declaration} must be not null"
            )))
        }
        Some(Value::String(kind)) => kind,
        Some(_) => {
            return Err(OdahuError::Manifest(format!(
                "Kind of object {declaration} should be string"
            )))
        }
    };

    if ResourceKind::from_name(kind).is_none() {
        return Err(OdahuError::Manifest(format!(
            "Unknown kind of object: '{kind}'"
        )));
    }

    serde_json::from_value(declaration.clone())
        .map_err(|e| OdahuError::Manifest(format!("Invalid {kind} resource: {e}")))
}
