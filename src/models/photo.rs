// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity photo model.

use crate::models::geometry::{self, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Photo attached to a stored activity.
///
/// Natural key: `provider_photo_id` (globally unique per provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Internal ID of the owning activity in the store
    pub activity_internal_id: String,
    pub provider_photo_id: String,
    pub urls: PhotoUrls,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, with = "geometry::wkt_point")]
    pub point: Option<GeoPoint>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PhotoRecord {
    /// Store document ID derived from the natural key.
    pub fn natural_key(&self) -> String {
        urlencoding::encode(&self.provider_photo_id).into_owned()
    }
}

/// Photo URLs at several resolutions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoUrls {
    pub full: Option<String>,
    pub mid: Option<String>,
    pub small: Option<String>,
}
