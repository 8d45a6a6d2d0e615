//! Per-resource TTL policy.
//!
//! Each cached resource kind gets a default TTL matching how stale it may
//! get: the category tree changes rarely, dashboard counters constantly.
//! Deployments override individual entries through `cache.ttl_overrides`.

use crate::config::CacheConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Kinds of cached resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ProductListing,
    ProductDetail,
    CategoryTree,
    DashboardStats,
    Orders,
    AiContent,
    Settings,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::ProductListing,
        ResourceKind::ProductDetail,
        ResourceKind::CategoryTree,
        ResourceKind::DashboardStats,
        ResourceKind::Orders,
        ResourceKind::AiContent,
        ResourceKind::Settings,
    ];

    /// Built-in TTL
    pub fn default_ttl(self) -> Duration {
        let secs = match self {
            ResourceKind::ProductListing => 300,
            ResourceKind::ProductDetail => 600,
            ResourceKind::CategoryTree => 3600,
            ResourceKind::DashboardStats => 60,
            ResourceKind::Orders => 30,
            ResourceKind::AiContent => 86_400,
            ResourceKind::Settings => 1800,
        };
        Duration::from_secs(secs)
    }

    /// Key domain the resource is cached under
    pub fn domain(self) -> &'static str {
        match self {
            ResourceKind::ProductListing | ResourceKind::ProductDetail => "products",
            ResourceKind::CategoryTree => "categories",
            ResourceKind::DashboardStats => "dashboard",
            ResourceKind::Orders => "orders",
            ResourceKind::AiContent => "ai",
            ResourceKind::Settings => "settings",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ProductListing => "product_listing",
            ResourceKind::ProductDetail => "product_detail",
            ResourceKind::CategoryTree => "category_tree",
            ResourceKind::DashboardStats => "dashboard_stats",
            ResourceKind::Orders => "orders",
            ResourceKind::AiContent => "ai_content",
            ResourceKind::Settings => "settings",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

/// Effective TTL table
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    overrides: HashMap<ResourceKind, Duration>,
}

impl TtlPolicy {
    /// Built-in table without overrides
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Built-in table with `cache.ttl_overrides` applied
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut policy = Self::new();
        for (name, secs) in &config.ttl_overrides {
            match name.parse::<ResourceKind>() {
                Ok(kind) => {
                    policy.overrides.insert(kind, Duration::from_secs(*secs));
                }
                Err(reason) => warn!(resource = %name, %reason, "Ignoring TTL override"),
            }
        }
        policy
    }

    /// Override one entry
    pub fn with_override(mut self, kind: ResourceKind, ttl: Duration) -> Self {
        self.overrides.insert(kind, ttl);
        self
    }

    /// TTL for `kind`
    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_ttl())
    }

    /// Every kind with its effective TTL, in declaration order
    pub fn entries(&self) -> Vec<(ResourceKind, Duration)> {
        ResourceKind::ALL
            .into_iter()
            .map(|kind| (kind, self.ttl_for(kind)))
            .collect()
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new()
    }
}
