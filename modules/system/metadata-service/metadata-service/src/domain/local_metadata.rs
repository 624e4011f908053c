//! In-process repository of the URLs this application currently exports.

use metadata_service_sdk::{MetadataInfo, ServiceQuery, ServiceUrl};
use parking_lot::RwLock;

/// URLs of ordinary services exported by this process.
///
/// The metadata service's own URL is never recorded here.
pub struct LocalMetadata {
    app: String,
    urls: RwLock<Vec<ServiceUrl>>,
}

impl LocalMetadata {
    #[must_use]
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            urls: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Record an exported URL. Returns `false` if it was already present.
    pub fn add(&self, url: ServiceUrl) -> bool {
        let mut urls = self.urls.write();
        if urls.contains(&url) {
            return false;
        }
        urls.push(url);
        true
    }

    /// Forget an exported URL. Returns `false` if it was not present.
    pub fn remove(&self, url: &ServiceUrl) -> bool {
        let mut urls = self.urls.write();
        let before = urls.len();
        urls.retain(|u| u != url);
        urls.len() != before
    }

    #[must_use]
    pub fn lookup(&self, query: &ServiceQuery) -> Vec<ServiceUrl> {
        let mut found: Vec<ServiceUrl> = self
            .urls
            .read()
            .iter()
            .filter(|u| query.matches(u))
            .cloned()
            .collect();
        found.sort();
        found
    }

    #[must_use]
    pub fn snapshot(&self) -> MetadataInfo {
        let urls = self.urls.read().clone();
        MetadataInfo::new(self.app.clone(), urls)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn url(port: u16, version: &str) -> ServiceUrl {
        ServiceUrl::new("dubbo", "127.0.0.1", port, "demo.DemoService").with_param("version", version)
    }

    #[test]
    fn test_add_is_deduplicated_and_remove_reports_presence() {
        let local = LocalMetadata::new("app");
        assert!(local.add(url(2002, "1.0.0")));
        assert!(!local.add(url(2002, "1.0.0")));
        assert!(local.remove(&url(2002, "1.0.0")));
        assert!(!local.remove(&url(2002, "1.0.0")));
        assert!(local.snapshot().is_empty());
    }

    #[test]
    fn test_lookup_filters_by_version() {
        let local = LocalMetadata::new("app");
        local.add(url(2002, "1.0.0"));
        local.add(url(2003, "2.0.0"));

        let all = local.lookup(&ServiceQuery::new("demo.DemoService"));
        assert_eq!(all.len(), 2);

        let v2 = local.lookup(&ServiceQuery::new("demo.DemoService").with_version("2.0.0"));
        assert_eq!(v2, vec![url(2003, "2.0.0")]);
    }

    #[test]
    fn test_snapshot_revision_tracks_content() {
        let local = LocalMetadata::new("app");
        let empty = local.snapshot();
        local.add(url(2002, "1.0.0"));
        let one = local.snapshot();
        assert_ne!(empty.revision, one.revision);
        assert_eq!(one.app, "app");
        assert_eq!(one.revision, local.snapshot().revision);
    }
}
