// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resource kinds and kind-tagged resource records.
//!
//! Every object managed through the API is a [`ResourceRecord`]: an `id`, an
//! opaque `spec` and `status`, and a [`ResourceKind`] discriminant that
//! selects the REST collection it lives in.

mod client;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OdahuError, Result};

pub use client::{BlockingResourceClient, ResourceClient};

/// Registered resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Connection,
    ModelTraining,
    ModelPackaging,
    ModelDeployment,
    ModelRoute,
    ToolchainIntegration,
    PackagingIntegration,
    TrainingIntegration,
}

impl ResourceKind {
    /// Every registered kind.
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Connection,
        ResourceKind::ModelTraining,
        ResourceKind::ModelPackaging,
        ResourceKind::ModelDeployment,
        ResourceKind::ModelRoute,
        ResourceKind::ToolchainIntegration,
        ResourceKind::PackagingIntegration,
        ResourceKind::TrainingIntegration,
    ];

    /// Manifest name of the kind, as written in `kind:`.
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Connection => "Connection",
            ResourceKind::ModelTraining => "ModelTraining",
            ResourceKind::ModelPackaging => "ModelPackaging",
            ResourceKind::ModelDeployment => "ModelDeployment",
            ResourceKind::ModelRoute => "ModelRoute",
            ResourceKind::ToolchainIntegration => "ToolchainIntegration",
            ResourceKind::PackagingIntegration => "PackagingIntegration",
            ResourceKind::TrainingIntegration => "TrainingIntegration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Collection URL template, e.g. `/api/{version}/connection`.
    pub fn url_template(self) -> &'static str {
        match self {
            ResourceKind::Connection => "/api/{version}/connection",
            ResourceKind::ModelTraining => "/api/{version}/model/training",
            ResourceKind::ModelPackaging => "/api/{version}/model/packaging",
            ResourceKind::ModelDeployment => "/api/{version}/model/deployment",
            ResourceKind::ModelRoute => "/api/{version}/model/route",
            ResourceKind::ToolchainIntegration => "/api/{version}/toolchain/integration",
            ResourceKind::PackagingIntegration => "/api/{version}/packaging/integration",
            ResourceKind::TrainingIntegration => "/api/{version}/training-integration",
        }
    }

    /// Whether the kind exposes `GET /{id}/log`.
    pub fn supports_logs(self) -> bool {
        matches!(
            self,
            ResourceKind::ModelTraining | ResourceKind::ModelPackaging
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = OdahuError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| OdahuError::InvalidResourceType(format!("{s:?}")))
    }
}

/// A kind-tagged resource. Identity is `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub status: Value,
    /// Top-level fields other than the above, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResourceRecord {
    pub fn new(kind: ResourceKind, id: impl Into<String>, spec: Value) -> Self {
        Self {
            kind,
            id: id.into(),
            spec,
            status: Value::Null,
            extra: BTreeMap::new(),
        }
    }

    /// Decode an object returned by the API for a collection of `kind`.
    ///
    /// The API does not echo `kind`; it is filled in from the collection.
    #[allow(clippy::result_large_err)]
    pub fn from_remote(kind: ResourceKind, value: Value) -> Result<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(OdahuError::Validation(format!(
                    "Expected {kind} object from server, got {other}"
                )))
            }
        };
        object.remove("kind");
        object.insert("kind".to_string(), Value::String(kind.name().to_string()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Request body for create and edit: the record without `kind`.
    pub fn to_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        body.insert("id".to_string(), Value::String(self.id.clone()));
        body.insert("spec".to_string(), self.spec.clone());
        if !self.status.is_null() {
            body.insert("status".to_string(), self.status.clone());
        }
        Value::Object(body)
    }
}
