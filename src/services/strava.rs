// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API endpoints used by the sync engine.
//!
//! Handles:
//! - Paginated activity listing (`after` / `before` bounds)
//! - Detailed activity fetch (full polyline, description)
//! - Activity photo listing with a size hint
//!
//! Token refresh and rate limiting live in the gateway; every method here
//! returns the gateway's `ProviderReply` so refreshed credentials propagate.

use crate::models::TokenBundle;
use crate::services::gateway::{ProviderGateway, ProviderReply, ProviderRequest};
use crate::services::rate_limit::EndpointClass;
use crate::services::transform::lenient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider name recorded on every canonical record.
pub const PROVIDER_NAME: &str = "strava";

/// Public web URL for an activity.
pub fn activity_url(activity_id: u64) -> String {
    format!("https://www.strava.com/activities/{}", activity_id)
}

/// Strava endpoint wrapper.
#[derive(Clone)]
pub struct StravaApi {
    gateway: ProviderGateway,
}

impl StravaApi {
    pub fn new(gateway: ProviderGateway) -> Self {
        Self { gateway }
    }

    /// List activities, newest first per provider ordering.
    /// An empty page signals the end of the listing.
    pub async fn list_activities(
        &self,
        user_id: &str,
        credential: &TokenBundle,
        page: u32,
        per_page: u32,
        after: Option<i64>,
        before: Option<i64>,
    ) -> ProviderReply<Vec<StravaActivity>> {
        let mut request = ProviderRequest::get("/athlete/activities", EndpointClass::List)
            .query("page", page)
            .query("per_page", per_page);
        if let Some(after) = after {
            request = request.query("after", after);
        }
        if let Some(before) = before {
            request = request.query("before", before);
        }

        self.gateway.call(user_id, credential, &request).await
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        user_id: &str,
        credential: &TokenBundle,
        activity_id: u64,
    ) -> ProviderReply<StravaActivity> {
        let request = ProviderRequest::get(
            format!("/activities/{}", activity_id),
            EndpointClass::Detail,
        )
        .query("include_all_efforts", false);

        self.gateway.call(user_id, credential, &request).await
    }

    /// Photos attached to an activity, with URLs for the requested size.
    pub async fn get_activity_photos(
        &self,
        user_id: &str,
        credential: &TokenBundle,
        activity_id: u64,
        size: u32,
    ) -> ProviderReply<Vec<StravaPhoto>> {
        let request = ProviderRequest::get(
            format!("/activities/{}/photos", activity_id),
            EndpointClass::Photos,
        )
        .query("size", size)
        .query("photo_sources", true);

        self.gateway.call(user_id, credential, &request).await
    }
}

/// Strava activity as returned by both the list (summary) and detail
/// endpoints. Summary responses simply omit the extended fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sport_type: Option<String>,
    /// Legacy activity type, used when `sport_type` is absent
    #[serde(default, rename = "type")]
    pub legacy_type: Option<String>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub distance: f64,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub moving_time: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub elapsed_time: u32,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub total_elevation_gain: f64,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    #[serde(default)]
    pub average_cadence: Option<f64>,
    #[serde(default)]
    pub average_watts: Option<f64>,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub kudos_count: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub comment_count: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub total_photo_count: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub achievement_count: u32,
    #[serde(default)]
    pub private: bool,
    /// `[lat, lng]`, or empty when the activity has no GPS
    #[serde(default)]
    pub start_latlng: Option<Vec<f64>>,
    #[serde(default)]
    pub end_latlng: Option<Vec<f64>>,
    #[serde(default)]
    pub map: Option<StravaMap>,
}

impl StravaActivity {
    /// Get the detailed polyline, falling back to summary if not available.
    pub fn get_polyline(&self) -> Option<&str> {
        let map = self.map.as_ref()?;
        [map.polyline.as_deref(), map.summary_polyline.as_deref()]
            .into_iter()
            .flatten()
            .find(|p| !p.is_empty())
    }

    /// Provider activity type, preferring the finer-grained `sport_type`.
    pub fn raw_type(&self) -> &str {
        self.sport_type
            .as_deref()
            .or(self.legacy_type.as_deref())
            .unwrap_or("")
    }
}

/// Activity map data with polylines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StravaMap {
    #[serde(default)]
    pub polyline: Option<String>,
    #[serde(default)]
    pub summary_polyline: Option<String>,
}

/// Photo descriptor from the activity photos endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaPhoto {
    #[serde(default)]
    pub unique_id: Option<String>,
    /// Numeric id, only present for some photo sources
    #[serde(default)]
    pub id: Option<u64>,
    /// URLs keyed by pixel size ("100", "600", "2048", ...)
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// `[lat, lng]`
    #[serde(default)]
    pub location: Option<Vec<f64>>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl StravaPhoto {
    /// Globally unique photo identifier, if the descriptor carries one.
    pub fn photo_id(&self) -> Option<String> {
        self.unique_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.id.map(|id| id.to_string()))
    }
}
