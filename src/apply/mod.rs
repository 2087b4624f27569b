// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative bulk apply.
//!
//! [`apply`] walks a [`ChangeSet`] in order and converges each declared
//! resource: it checks whether the resource exists, then creates, edits or
//! deletes it. A failing item is recorded in [`ApplyResult::errors`] and the
//! batch moves on to the next item.
//!
//! Items are processed strictly one after another. Later resources may
//! reference earlier ones (a training referencing a connection), so the
//! order of the manifest is the order of the calls.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::client::{ApiClient, BlockingApiClient};
use crate::error::OdahuError;
use crate::manifest::{ChangeItem, ChangeSet};
use crate::resources::{ResourceClient, ResourceKind};

/// Error recorded for one item of a batch.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApplyError {
    /// `#<n>. <id>` or `#<n>` when the id is empty.
    pub identifier: String,
    pub message: String,
    #[source]
    pub source: OdahuError,
}

/// Outcome of a batch. Every processed item lands in at most one bucket;
/// an existing item skipped during removal lands in none.
#[derive(Debug, Default)]
pub struct ApplyResult {
    pub created: Vec<ChangeItem>,
    pub changed: Vec<ChangeItem>,
    pub removed: Vec<ChangeItem>,
    pub errors: Vec<ApplyError>,
}

impl ApplyResult {
    /// True when no item failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

fn write_bucket(f: &mut fmt::Formatter<'_>, label: &str, items: &[ChangeItem]) -> fmt::Result {
    let ids: Vec<&str> = items.iter().map(|i| i.resource_id.as_str()).collect();
    write!(f, "{} resources: {}", label, items.len())?;
    if !ids.is_empty() {
        write!(f, " ({})", ids.join(", "))?;
    }
    Ok(())
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation completed, ")?;
        write_bucket(f, "created", &self.created)?;
        write!(f, ", ")?;
        write_bucket(f, "changed", &self.changed)?;
        write!(f, ", ")?;
        write_bucket(f, "removed", &self.removed)?;
        for error in &self.errors {
            write!(f, "\nError: {}", error)?;
        }
        Ok(())
    }
}

/// Builds a sub-client for one kind from the generic client.
pub type ClientFactory = fn(&ApiClient, ResourceKind) -> crate::error::Result<ResourceClient>;

fn default_factory(api: &ApiClient, kind: ResourceKind) -> crate::error::Result<ResourceClient> {
    Ok(api.resource(kind))
}

/// Kind to sub-client factory registry.
#[derive(Clone)]
pub struct ClientRegistry {
    factories: HashMap<ResourceKind, ClientFactory>,
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&ResourceKind> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("ClientRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for kind in ResourceKind::ALL {
            registry.register(kind, default_factory);
        }
        registry
    }
}

impl ClientRegistry {
    /// Registry without any kind.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: ResourceKind, factory: ClientFactory) -> &mut Self {
        self.factories.insert(kind, factory);
        self
    }

    pub fn unregister(&mut self, kind: ResourceKind) -> &mut Self {
        self.factories.remove(&kind);
        self
    }

    /// Sub-client for `kind`.
    ///
    /// # Errors
    ///
    /// [`OdahuError::InvalidResourceType`] for a kind with no factory, or
    /// whatever the factory returns.
    #[allow(clippy::result_large_err)]
    pub fn build(&self, api: &ApiClient, kind: ResourceKind) -> crate::error::Result<ResourceClient> {
        match self.factories.get(&kind) {
            Some(factory) => factory(api, kind),
            None => Err(OdahuError::InvalidResourceType(kind.to_string())),
        }
    }
}

fn identifier(index: usize, item: &ChangeItem) -> String {
    if item.resource_id.is_empty() {
        format!("#{}", index + 1)
    } else {
        format!("#{}. {}", index + 1, item.resource_id)
    }
}

/// Converge remote state to `changes` with the default registry.
///
/// With `is_removal` false, existing resources are edited and absent ones
/// created. With `is_removal` true, existing resources are deleted and
/// absent ones skipped. Never fails as a whole; see [`ApplyResult::errors`].
pub async fn apply(changes: &ChangeSet, api: &ApiClient, is_removal: bool) -> ApplyResult {
    apply_with_registry(changes, api, is_removal, &ClientRegistry::default()).await
}

/// [`apply`] with an explicit kind registry.
pub async fn apply_with_registry(
    changes: &ChangeSet,
    api: &ApiClient,
    is_removal: bool,
    registry: &ClientRegistry,
) -> ApplyResult {
    let mut result = ApplyResult::default();

    for (index, item) in changes.iter().enumerate() {
        let ident = identifier(index, item);
        debug!(target: "odahu_api::apply", "Processing resource {}", ident);

        let mut client = match registry.build(api, item.kind()) {
            Ok(client) => client,
            Err(source) => {
                result.errors.push(ApplyError {
                    message: format!("Can not build client for {ident}: {source}"),
                    identifier: ident,
                    source,
                });
                continue;
            }
        };

        let exists = match client.get(&item.resource_id).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(source) => {
                result.errors.push(ApplyError {
                    message: format!("Can not get status of resource {ident}: {source}"),
                    identifier: ident,
                    source,
                });
                continue;
            }
        };

        let outcome = match (is_removal, exists) {
            (false, true) => {
                info!(target: "odahu_api::apply", "Editing of {} {} (name: {})", ident, item.kind(), item.resource_id);
                client.edit(&item.resource).await.map(|_| Some(Bucket::Changed))
            }
            (false, false) => {
                info!(target: "odahu_api::apply", "Creating of {} {} (name: {})", ident, item.kind(), item.resource_id);
                client.create(&item.resource).await.map(|_| Some(Bucket::Created))
            }
            (true, true) => {
                info!(target: "odahu_api::apply", "Removing of {} {} (name: {})", ident, item.kind(), item.resource_id);
                client.delete(&item.resource_id).await.map(|_| Some(Bucket::Removed))
            }
            (true, false) => {
                debug!(target: "odahu_api::apply", "Resource {} is absent, nothing to remove", ident);
                Ok(None)
            }
        };

        match outcome {
            Ok(Some(Bucket::Created)) => result.created.push(item.clone()),
            Ok(Some(Bucket::Changed)) => result.changed.push(item.clone()),
            Ok(Some(Bucket::Removed)) => result.removed.push(item.clone()),
            Ok(None) => {}
            Err(source) => result.errors.push(ApplyError {
                message: format!("Can not update resource {ident}: {source}"),
                identifier: ident,
                source,
            }),
        }
    }

    result
}

enum Bucket {
    Created,
    Changed,
    Removed,
}

/// [`apply`] for synchronous callers.
pub fn apply_blocking(changes: &ChangeSet, api: &BlockingApiClient, is_removal: bool) -> ApplyResult {
    api.runtime().block_on(apply(changes, api.inner(), is_removal))
}
