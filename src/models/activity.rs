// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Canonical activity model for storage and analytics.

use crate::models::geometry::{self, GeoPoint, TrackLine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical activity record, independent of the provider it came from.
///
/// Natural key: `(user_id, provider_activity_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Owning user
    pub user_id: String,
    /// Provider that supplied the record ("strava")
    pub provider: String,
    /// Provider-native activity ID (unique per provider + user)
    pub provider_activity_id: u64,
    /// Canonical activity type (run, ride, hike, ...)
    pub activity_type: String,
    /// Activity name/title
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    /// IANA timezone derived from the start point
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, with = "geometry::wkt_point")]
    pub start_point: Option<GeoPoint>,
    #[serde(default, with = "geometry::wkt_point")]
    pub end_point: Option<GeoPoint>,
    /// Moving time in seconds
    pub duration_seconds: u32,
    pub elapsed_seconds: u32,
    pub distance_meters: f64,
    pub elevation_gain: f64,
    #[serde(default)]
    pub heart_rate: Option<HeartRate>,
    #[serde(default)]
    pub cadence: Option<f64>,
    /// Average power in watts
    #[serde(default)]
    pub power: Option<f64>,
    #[serde(default, with = "geometry::wkt_line")]
    pub track_line: Option<TrackLine>,
    pub counts: ActivityCounts,
    pub is_private: bool,
    pub provider_url: String,
}

impl ActivityRecord {
    /// Store document ID derived from the natural key.
    pub fn natural_key(&self) -> String {
        activity_key(&self.user_id, self.provider_activity_id)
    }
}

/// Natural-key document ID for an activity.
pub fn activity_key(user_id: &str, provider_activity_id: u64) -> String {
    format!("{}_{}", urlencoding::encode(user_id), provider_activity_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRate {
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityCounts {
    pub kudos: u32,
    pub comments: u32,
    pub photos: u32,
    pub achievements: u32,
}

/// An activity as persisted, with the store's internal identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredActivity {
    pub internal_id: String,
    pub record: ActivityRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ActivityRecord {
        ActivityRecord {
            user_id: "user-1".to_string(),
            provider: "strava".to_string(),
            provider_activity_id: 42,
            activity_type: "ride".to_string(),
            name: "Morning Ride".to_string(),
            description: None,
            start_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            timezone: None,
            start_point: Some(GeoPoint::from_lat_lon(37.7749, -122.4194)),
            end_point: None,
            duration_seconds: 3600,
            elapsed_seconds: 3700,
            distance_meters: 25_000.0,
            elevation_gain: 300.0,
            heart_rate: Some(HeartRate {
                avg: 140.0,
                max: 171.0,
            }),
            cadence: None,
            power: Some(180.5),
            track_line: Some(TrackLine::from_lat_lon_pairs(&[
                (37.0, -122.0),
                (37.1, -122.1),
            ])),
            counts: ActivityCounts::default(),
            is_private: false,
            provider_url: "https://www.strava.com/activities/42".to_string(),
        }
    }

    #[test]
    fn test_serialized_geometry_is_wkt() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["start_point"], "POINT(-122.4194 37.7749)");
        assert_eq!(json["track_line"], "LINESTRING(-122 37, -122.1 37.1)");
        assert!(json["end_point"].is_null());
    }

    #[test]
    fn test_serde_round_trip_preserves_geometry() {
        let record = sample();
        let json = serde_json::to_string(&record).unwrap();
        let back: ActivityRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_natural_key_escapes_user_id() {
        assert_eq!(activity_key("a/b", 7), "a%2Fb_7");
        assert_eq!(sample().natural_key(), "user-1_42");
    }
}
