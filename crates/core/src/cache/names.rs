//! Resource classes and versioned cache store names.
//!
//! Store names follow `{purpose}-cache-{version}[-{build_id}]`. Only the
//! static store embeds the build id, so every deployment busts hashed
//! bundle assets while the other stores survive until the version changes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The class a request is assigned to; selects its caching protocol and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Static,
    Image,
    Api,
    Runtime,
    Page,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 5] =
        [ResourceClass::Static, ResourceClass::Image, ResourceClass::Api, ResourceClass::Runtime, ResourceClass::Page];

    /// Purpose tag used as the store name prefix.
    pub fn purpose(self) -> &'static str {
        match self {
            ResourceClass::Static => "static",
            ResourceClass::Image => "images",
            ResourceClass::Api => "api",
            ResourceClass::Runtime => "runtime",
            ResourceClass::Page => "dynamic",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceClass::Static => "static",
            ResourceClass::Image => "image",
            ResourceClass::Api => "api",
            ResourceClass::Runtime => "runtime",
            ResourceClass::Page => "page",
        };
        f.write_str(name)
    }
}

/// The set of store names belonging to one engine version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    version: String,
    build_id: String,
}

impl CacheNames {
    pub fn new(version: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self { version: version.into(), build_id: build_id.into() }
    }

    /// Store name for a resource class.
    pub fn name_for(&self, class: ResourceClass) -> String {
        match class {
            ResourceClass::Static => format!("{}-cache-{}-{}", class.purpose(), self.version, self.build_id),
            _ => format!("{}-cache-{}", class.purpose(), self.version),
        }
    }

    /// Every store name the current version owns.
    pub fn current(&self) -> Vec<String> {
        ResourceClass::ALL.iter().map(|class| self.name_for(*class)).collect()
    }

    /// Whether `name` belongs to the current version.
    pub fn is_current(&self, name: &str) -> bool {
        ResourceClass::ALL.iter().any(|class| self.name_for(*class) == name)
    }
}
