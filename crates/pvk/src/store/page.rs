/// List envelope and record identity for PVK resources
use serde::{Deserialize, Serialize};

/// A record managed by a [`ResourceStore`](super::ResourceStore).
///
/// Records that have not been created on the server yet have no id and no
/// version tag.
pub trait Record {
    /// Server-assigned identifier (`_id`)
    fn id(&self) -> Option<&str>;

    /// Opaque version tag (`_etag`) of the last known server state
    fn etag(&self) -> Option<&str>;
}

/// One page of a list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(rename = "_items", default = "Vec::new")]
    pub items: Vec<T>,

    #[serde(rename = "_meta", default)]
    pub meta: PageMeta,
}

/// Pagination metadata of a list response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Total number of items matching the query, across all pages
    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub max_results: u64,

    #[serde(default)]
    pub page: u64,
}

impl PageMeta {
    /// Number of pages needed to cover `total`; at least one.
    pub fn page_count(&self) -> u64 {
        if self.max_results == 0 {
            return 1;
        }
        self.total.div_ceil(self.max_results).max(1)
    }
}
