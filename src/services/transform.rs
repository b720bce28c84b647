// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider records to canonical records.
//!
//! Transformation is pure: no I/O except through the injected timezone
//! lookup, and a malformed polyline degrades to a missing track rather than
//! an error.

use crate::models::{
    ActivityCounts, ActivityRecord, GeoPoint, HeartRate, PhotoRecord, PhotoUrls, TrackLine,
};
use crate::services::strava::{activity_url, StravaActivity, StravaPhoto, PROVIDER_NAME};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Provider sport types mapped to the canonical activity vocabulary.
/// Values not listed pass through unchanged.
const SPORT_TYPES: &[(&str, &str)] = &[
    ("Run", "run"),
    ("TrailRun", "trail_run"),
    ("VirtualRun", "virtual_run"),
    ("Walk", "walk"),
    ("Hike", "hike"),
    ("Ride", "ride"),
    ("MountainBikeRide", "mountain_bike"),
    ("GravelRide", "gravel_ride"),
    ("EBikeRide", "ebike_ride"),
    ("EMountainBikeRide", "ebike_ride"),
    ("VirtualRide", "virtual_ride"),
    ("Velomobile", "ride"),
    ("Handcycle", "ride"),
    ("Swim", "swim"),
    ("AlpineSki", "ski"),
    ("BackcountrySki", "backcountry_ski"),
    ("NordicSki", "nordic_ski"),
    ("Snowboard", "snowboard"),
    ("Snowshoe", "snowshoe"),
    ("IceSkate", "ice_skate"),
    ("InlineSkate", "inline_skate"),
    ("RollerSki", "roller_ski"),
    ("Rowing", "rowing"),
    ("VirtualRow", "rowing"),
    ("Kayaking", "kayaking"),
    ("Canoeing", "canoeing"),
    ("StandUpPaddling", "paddleboard"),
    ("Surfing", "surfing"),
    ("Kitesurf", "kitesurf"),
    ("Windsurf", "windsurf"),
    ("Sail", "sailing"),
    ("RockClimbing", "climbing"),
    ("WeightTraining", "strength"),
    ("Crossfit", "strength"),
    ("Workout", "workout"),
    ("HighIntensityIntervalTraining", "workout"),
    ("Elliptical", "elliptical"),
    ("StairStepper", "stair_stepper"),
    ("Yoga", "yoga"),
    ("Pilates", "pilates"),
    ("Golf", "golf"),
    ("Soccer", "soccer"),
    ("Tennis", "tennis"),
    ("Wheelchair", "wheelchair"),
];

/// Map a provider sport type to the canonical vocabulary.
pub fn canonical_activity_type(raw: &str) -> String {
    SPORT_TYPES
        .iter()
        .find(|(provider, _)| *provider == raw)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Resolves an IANA timezone for a coordinate.
pub trait TimezoneLookup: Send + Sync {
    fn timezone_at(&self, point: &GeoPoint) -> Option<String>;
}

/// Lookup that never resolves; used when no timezone database is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimezoneLookup;

impl TimezoneLookup for NoTimezoneLookup {
    fn timezone_at(&self, _point: &GeoPoint) -> Option<String> {
        None
    }
}

/// Converts provider-native records into canonical ones.
#[derive(Clone)]
pub struct RecordTransformer {
    timezones: Arc<dyn TimezoneLookup>,
}

impl Default for RecordTransformer {
    fn default() -> Self {
        Self::new(Arc::new(NoTimezoneLookup))
    }
}

impl RecordTransformer {
    pub fn new(timezones: Arc<dyn TimezoneLookup>) -> Self {
        Self { timezones }
    }

    /// Map a summary or detailed activity to an `ActivityRecord`.
    pub fn transform(&self, native: &StravaActivity, user_id: &str) -> ActivityRecord {
        let start_point = native
            .start_latlng
            .as_deref()
            .and_then(GeoPoint::from_lat_lon_slice);
        let end_point = native
            .end_latlng
            .as_deref()
            .and_then(GeoPoint::from_lat_lon_slice);

        let track_line = native
            .get_polyline()
            .and_then(|encoded| match TrackLine::decode(encoded) {
                Ok(line) if !line.is_empty() => Some(line),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(
                        activity_id = native.id,
                        error = %e,
                        "Dropping undecodable polyline"
                    );
                    None
                }
            });

        // Never guess a timezone without a start point.
        let timezone = start_point
            .as_ref()
            .and_then(|point| self.timezones.timezone_at(point));

        let heart_rate = native.average_heartrate.map(|avg| HeartRate {
            avg,
            max: native.max_heartrate.unwrap_or(avg),
        });

        ActivityRecord {
            user_id: user_id.to_string(),
            provider: PROVIDER_NAME.to_string(),
            provider_activity_id: native.id,
            activity_type: canonical_activity_type(native.raw_type()),
            name: native.name.clone(),
            description: native.description.clone().filter(|d| !d.is_empty()),
            start_time: native.start_date,
            timezone,
            start_point,
            end_point,
            duration_seconds: native.moving_time,
            elapsed_seconds: native.elapsed_time,
            distance_meters: native.distance,
            elevation_gain: native.total_elevation_gain,
            heart_rate,
            cadence: native.average_cadence,
            power: native.average_watts,
            track_line,
            counts: ActivityCounts {
                kudos: native.kudos_count,
                comments: native.comment_count,
                photos: native.total_photo_count,
                achievements: native.achievement_count,
            },
            is_private: native.private,
            provider_url: activity_url(native.id),
        }
    }

    /// Map a photo descriptor. Descriptors without an identifier are skipped.
    ///
    /// URLs are keyed by pixel size: the largest becomes `full`, the median
    /// `mid` and the smallest `small`.
    pub fn transform_photo(
        &self,
        photo: &StravaPhoto,
        activity_internal_id: &str,
    ) -> Option<PhotoRecord> {
        let provider_photo_id = photo.photo_id()?;

        let mut sized: Vec<(u32, &String)> = photo
            .urls
            .iter()
            .filter_map(|(size, url)| size.parse::<u32>().ok().map(|s| (s, url)))
            .collect();
        sized.sort_by_key(|(size, _)| *size);

        let pick = |index: usize| sized.get(index).map(|(_, url)| (*url).clone());
        let urls = if sized.is_empty() {
            PhotoUrls::default()
        } else {
            PhotoUrls {
                full: pick(sized.len() - 1),
                mid: pick((sized.len() - 1) / 2),
                small: pick(0),
            }
        };

        let created_at = photo.created_at.as_deref().and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        Some(PhotoRecord {
            activity_internal_id: activity_internal_id.to_string(),
            provider_photo_id,
            urls,
            caption: photo.caption.clone().filter(|c| !c.is_empty()),
            point: photo
                .location
                .as_deref()
                .and_then(GeoPoint::from_lat_lon_slice),
            created_at,
        })
    }
}

/// Defensive numeric coercion for provider JSON.
///
/// Integer-domain fields (counts, durations) sometimes arrive as floats or
/// numeric strings. Anything unparseable, negative or null becomes zero.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn coerce_u32(value: &Value) -> u32 {
        let as_float = match value {
            Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    return u32::try_from(v).unwrap_or(u32::MAX);
                }
                n.as_f64()
            }
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match as_float {
            Some(f) if f.is_finite() && f > 0.0 => f.round().min(u32::MAX as f64) as u32,
            _ => 0,
        }
    }

    pub fn coerce_f64(value: &Value) -> f64 {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
    }

    pub fn u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(Option::<Value>::deserialize(d)?
            .as_ref()
            .map(coerce_u32)
            .unwrap_or(0))
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<Value>::deserialize(d)?
            .as_ref()
            .map(coerce_f64)
            .unwrap_or(0.0))
    }
}
