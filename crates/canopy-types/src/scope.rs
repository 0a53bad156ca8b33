use std::fmt;

use serde::{Deserialize, Serialize};

/// An independent axis along which the catalog can be queried.
///
/// Each scope has its own completeness watermark: being authoritative for a
/// resource id says nothing about being authoritative for a type, and vice
/// versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Resource id / tree queries.
    Resource,
    /// Queries by resource type.
    Type,
    /// Queries by serialised format.
    Format,
}

impl Scope {
    /// Stable upper-case label, used as a storage key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "RESOURCE",
            Self::Type => "TYPE",
            Self::Format => "FORMAT",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
