//! Slice annotations and organ identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use super::geometry::Rect2D;

/// One hand-drawn rectangle anchored to an axial slice
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RoiAnnotation {
    pub slice_index: usize,
    pub rect: Rect2D,
}

impl RoiAnnotation {
    pub fn new(slice_index: usize, rect: Rect2D) -> Self {
        Self { slice_index, rect }
    }
}

impl fmt::Display for RoiAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z={}, {}", self.slice_index, self.rect)
    }
}

/// Key identifying the anatomical structure a mask belongs to ("lung", "liver", ...)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganKey(String);

impl OrganKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrganKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for OrganKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
