//! In-memory metadata center, the backing store of `remote` storage in tests and
//! single-process setups.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use metadata_service_sdk::{MetadataCenterClient, MetadataInfo, MetadataServiceError};

/// Revisions kept per application by [`InMemoryMetadataCenter::new`].
pub const DEFAULT_REVISION_HISTORY: usize = 8;

#[derive(Default)]
struct AppEntry {
    /// Oldest first; the back is the latest revision.
    order: VecDeque<String>,
    revisions: HashMap<String, MetadataInfo>,
}

impl AppEntry {
    fn record(&mut self, info: &MetadataInfo, history: usize) {
        self.order.retain(|r| *r != info.revision);
        self.order.push_back(info.revision.clone());
        self.revisions.insert(info.revision.clone(), info.clone());
        while self.order.len() > history {
            if let Some(oldest) = self.order.pop_front() {
                self.revisions.remove(&oldest);
            }
        }
    }

    fn latest(&self) -> Option<&str> {
        self.order.back().map(String::as_str)
    }
}

pub struct InMemoryMetadataCenter {
    apps: DashMap<String, AppEntry>,
    history: usize,
    available: AtomicBool,
    publishes: AtomicUsize,
}

impl Default for InMemoryMetadataCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetadataCenter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_history(DEFAULT_REVISION_HISTORY)
    }

    /// Keep at most `history` revisions per application (at least one); older
    /// ones are dropped on publish.
    #[must_use]
    pub fn with_history(history: usize) -> Self {
        Self {
            apps: DashMap::new(),
            history: history.max(1),
            available: AtomicBool::new(true),
            publishes: AtomicUsize::new(0),
        }
    }

    /// Simulate the center going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), MetadataServiceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MetadataServiceError::storage_unavailable(
                "metadata center is not reachable",
            ))
        }
    }
}

#[async_trait]
impl MetadataCenterClient for InMemoryMetadataCenter {
    async fn ping(&self) -> Result<(), MetadataServiceError> {
        self.check_available()
    }

    async fn publish(&self, info: &MetadataInfo) -> Result<(), MetadataServiceError> {
        self.check_available()?;
        self.apps
            .entry(info.app.clone())
            .or_default()
            .record(info, self.history);
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(
        &self,
        app: &str,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError> {
        self.check_available()?;
        let Some(entry) = self.apps.get(app) else {
            return Ok(None);
        };
        let revision = revision.or_else(|| entry.latest());
        Ok(revision.and_then(|r| entry.revisions.get(r).cloned()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use metadata_service_sdk::ServiceUrl;

    #[tokio::test]
    async fn test_publish_then_fetch_latest_and_by_revision() {
        let center = InMemoryMetadataCenter::new();
        let first = MetadataInfo::new(
            "app",
            vec![ServiceUrl::new("dubbo", "127.0.0.1", 2002, "demo.A")],
        );
        let second = MetadataInfo::new(
            "app",
            vec![ServiceUrl::new("dubbo", "127.0.0.1", 2002, "demo.B")],
        );
        center.publish(&first).await.unwrap();
        center.publish(&second).await.unwrap();

        assert_eq!(center.fetch("app", None).await.unwrap(), Some(second));
        assert_eq!(
            center.fetch("app", Some(&first.revision)).await.unwrap(),
            Some(first)
        );
        assert!(center.fetch("other", None).await.unwrap().is_none());
        assert_eq!(center.publish_count(), 2);
    }

    #[tokio::test]
    async fn test_history_drops_oldest_revisions() {
        let center = InMemoryMetadataCenter::with_history(2);
        let snapshots: Vec<MetadataInfo> = (0..3u16)
            .map(|i| {
                MetadataInfo::new(
                    "app",
                    vec![ServiceUrl::new("dubbo", "127.0.0.1", 2002 + i, "demo.A")],
                )
            })
            .collect();
        for info in &snapshots {
            center.publish(info).await.unwrap();
        }

        assert!(
            center
                .fetch("app", Some(&snapshots[0].revision))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            center.fetch("app", Some(&snapshots[1].revision)).await.unwrap(),
            Some(snapshots[1].clone())
        );
        assert_eq!(
            center.fetch("app", None).await.unwrap(),
            Some(snapshots[2].clone())
        );

        // Re-publishing a known revision makes it latest without growing the history.
        center.publish(&snapshots[1]).await.unwrap();
        assert_eq!(
            center.fetch("app", None).await.unwrap(),
            Some(snapshots[1].clone())
        );
        assert!(
            center
                .fetch("app", Some(&snapshots[2].revision))
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(center.apps.get("app").unwrap().revisions.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_center_fails_every_call() {
        let center = InMemoryMetadataCenter::new();
        center.set_available(false);
        assert!(center.ping().await.unwrap_err().is_unavailable());
        assert!(center.fetch("app", None).await.unwrap_err().is_unavailable());
    }
}
