//! Storage strategies and the registry that selects them by key.
//!
//! A [`StorageRegistry`] is built once and is read-only afterwards. The exporter
//! asks it for a fresh [`MetadataStorage`] on every export.

mod composite;
mod local;
mod remote;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use metadata_service_sdk::{MetadataCenterClient, MetadataStorage};

use super::error::{ExportError, RegistryError};
use super::local_metadata::LocalMetadata;

pub use composite::CompositeMetadataStorage;
pub use local::LocalMetadataStorage;
pub use remote::RemoteMetadataStorage;

pub const LOCAL_STORAGE: &str = "local";
pub const REMOTE_STORAGE: &str = "remote";
pub const COMPOSITE_STORAGE: &str = "composite";

/// What a factory may draw on when building a strategy.
pub struct StorageContext<'a> {
    pub local: &'a Arc<LocalMetadata>,
    pub metadata_center: Option<&'a Arc<dyn MetadataCenterClient>>,
}

pub trait StorageFactory: Send + Sync {
    /// Build a strategy instance.
    ///
    /// # Errors
    ///
    /// Returns `ExportError` if a collaborator the strategy needs is missing.
    fn create(&self, ctx: &StorageContext<'_>) -> Result<Arc<dyn MetadataStorage>, ExportError>;
}

struct FnFactory<F>(F);

impl<F> StorageFactory for FnFactory<F>
where
    F: Fn(&StorageContext<'_>) -> Result<Arc<dyn MetadataStorage>, ExportError> + Send + Sync,
{
    fn create(&self, ctx: &StorageContext<'_>) -> Result<Arc<dyn MetadataStorage>, ExportError> {
        (self.0)(ctx)
    }
}

struct LocalFactory;

impl StorageFactory for LocalFactory {
    fn create(&self, ctx: &StorageContext<'_>) -> Result<Arc<dyn MetadataStorage>, ExportError> {
        Ok(Arc::new(LocalMetadataStorage::new(Arc::clone(ctx.local))))
    }
}

struct RemoteFactory;

impl StorageFactory for RemoteFactory {
    fn create(&self, ctx: &StorageContext<'_>) -> Result<Arc<dyn MetadataStorage>, ExportError> {
        Ok(Arc::new(remote_storage(ctx)?))
    }
}

struct CompositeFactory;

impl StorageFactory for CompositeFactory {
    fn create(&self, ctx: &StorageContext<'_>) -> Result<Arc<dyn MetadataStorage>, ExportError> {
        let local = LocalMetadataStorage::new(Arc::clone(ctx.local));
        Ok(Arc::new(CompositeMetadataStorage::new(
            local,
            remote_storage(ctx)?,
        )))
    }
}

fn remote_storage(ctx: &StorageContext<'_>) -> Result<RemoteMetadataStorage, ExportError> {
    let center = ctx.metadata_center.ok_or_else(|| {
        ExportError::RemoteStorageUnavailable(
            metadata_service_sdk::MetadataServiceError::storage_unavailable(
                "no metadata center configured",
            ),
        )
    })?;
    Ok(RemoteMetadataStorage::new(
        ctx.local.app(),
        Arc::clone(center),
    ))
}

/// Immutable map from storage key to factory.
pub struct StorageRegistry {
    factories: HashMap<String, Arc<dyn StorageFactory>>,
}

impl StorageRegistry {
    #[must_use]
    pub fn builder() -> StorageRegistryBuilder {
        StorageRegistryBuilder::default()
    }

    /// Registry with the `local`, `remote` and `composite` strategies.
    #[must_use]
    pub fn standard() -> Self {
        let mut factories: HashMap<String, Arc<dyn StorageFactory>> = HashMap::new();
        factories.insert(LOCAL_STORAGE.to_owned(), Arc::new(LocalFactory));
        factories.insert(REMOTE_STORAGE.to_owned(), Arc::new(RemoteFactory));
        factories.insert(COMPOSITE_STORAGE.to_owned(), Arc::new(CompositeFactory));
        Self { factories }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Build the strategy registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::UnsupportedStorageType` for an unknown key, or the
    /// factory's own error.
    pub fn create(
        &self,
        key: &str,
        ctx: &StorageContext<'_>,
    ) -> Result<Arc<dyn MetadataStorage>, ExportError> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| ExportError::UnsupportedStorageType(key.to_owned()))?;
        factory.create(ctx)
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Default)]
pub struct StorageRegistryBuilder {
    entries: Vec<(String, Arc<dyn StorageFactory>)>,
}

impl StorageRegistryBuilder {
    /// Add the `local`, `remote` and `composite` strategies.
    pub fn with_standard(&mut self) -> &mut Self {
        self.register(LOCAL_STORAGE, LocalFactory)
            .register(REMOTE_STORAGE, RemoteFactory)
            .register(COMPOSITE_STORAGE, CompositeFactory)
    }

    pub fn register(
        &mut self,
        key: impl Into<String>,
        factory: impl StorageFactory + 'static,
    ) -> &mut Self {
        self.entries.push((key.into(), Arc::new(factory)));
        self
    }

    pub fn register_fn<F>(&mut self, key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&StorageContext<'_>) -> Result<Arc<dyn MetadataStorage>, ExportError>
            + Send
            + Sync
            + 'static,
    {
        self.register(key, FnFactory(factory))
    }

    /// Freeze the registry.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateKey` if a key was registered twice.
    pub fn build(&mut self) -> Result<StorageRegistry, RegistryError> {
        let mut factories = HashMap::with_capacity(self.entries.len());
        for (key, factory) in self.entries.drain(..) {
            match factories.entry(key) {
                Entry::Occupied(e) => return Err(RegistryError::DuplicateKey(e.key().clone())),
                Entry::Vacant(e) => {
                    e.insert(factory);
                }
            }
        }
        Ok(StorageRegistry { factories })
    }
}
