//! Product identifiers and connection-path parsing.
//!
//! A viewer subscribes to a product by connecting to a path whose final
//! segment is the product ID, e.g. `/watch/sku-1`. The identifier is opaque:
//! it is neither decoded nor normalized.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when constructing a [`ProductId`] from an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("product id must not be empty")]
pub struct InvalidProductId;

/// Opaque, non-empty identifier of a watched product.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Create a product ID, rejecting the empty string.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidProductId> {
        let value = value.into();
        if value.is_empty() {
            return Err(InvalidProductId);
        }
        Ok(Self(value))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProductId {
    type Error = InvalidProductId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProductId {
    type Error = InvalidProductId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

/// Extract the product ID from a connection's request path.
///
/// The ID is the final `/`-separated segment. Returns `None` when that
/// segment is empty (`""`, `"/"`, `"/watch/"`), which callers treat as a
/// malformed target and refuse to track.
pub fn extract_product_id(path: &str) -> Option<ProductId> {
    let last = path.rsplit('/').next().unwrap_or_default();
    ProductId::new(last).ok()
}
