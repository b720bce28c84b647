// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Point and line geometry stored as WKT.
//!
//! Every stored representation is longitude first (`POINT(lon lat)`), the
//! opposite of the (lat, lon) pairs providers hand out.

use geo::{Coord, LineString};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Encoded polylines from the provider use precision 5 (1e-5 degrees).
pub const POLYLINE_PRECISION: u32 = 5;

/// A single WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    /// Build from the provider's `[lat, lng]` ordering.
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self { lon, lat }
    }

    /// Build from a provider `latlng` array. Anything but exactly two finite
    /// values yields `None`.
    pub fn from_lat_lon_slice(latlng: &[f64]) -> Option<Self> {
        match latlng {
            [lat, lon] if lat.is_finite() && lon.is_finite() => Some(Self::from_lat_lon(*lat, *lon)),
            _ => None,
        }
    }

    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.lon, self.lat)
    }

    pub fn from_wkt(wkt: &str) -> Result<Self, GeometryError> {
        let body = strip_tag(wkt, "POINT")?;
        let mut coords = parse_coord_list(body)?;
        match (coords.pop(), coords.is_empty()) {
            (Some(c), true) => Ok(Self { lon: c.x, lat: c.y }),
            _ => Err(GeometryError::Wkt(wkt.to_string())),
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

/// Ordered track geometry; coordinates hold `x = lon`, `y = lat`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackLine(pub LineString<f64>);

impl TrackLine {
    /// Decode a provider polyline into an ordered line.
    ///
    /// Each delta is read five bits at a time (continuation bit 0x20, zig-zag
    /// sign in the low bit), accumulated and divided by 1e5. The decoded
    /// (lat, lon) pairs end up as `Coord { x: lon, y: lat }`.
    pub fn decode(encoded: &str) -> Result<Self, GeometryError> {
        let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION)
            .map_err(|e| GeometryError::Polyline(e.to_string()))?;
        Ok(Self(line))
    }

    /// Re-encode to the provider polyline format.
    pub fn encode(&self) -> Result<String, GeometryError> {
        polyline::encode_coordinates(self.0.coords().copied(), POLYLINE_PRECISION)
            .map_err(|e| GeometryError::Polyline(e.to_string()))
    }

    pub fn from_lat_lon_pairs(pairs: &[(f64, f64)]) -> Self {
        Self(LineString::from(
            pairs
                .iter()
                .map(|&(lat, lon)| Coord { x: lon, y: lat })
                .collect::<Vec<_>>(),
        ))
    }

    /// Coordinates as (lat, lon) pairs, in track order.
    pub fn lat_lon_pairs(&self) -> Vec<(f64, f64)> {
        self.0.coords().map(|c| (c.y, c.x)).collect()
    }

    pub fn len(&self) -> usize {
        self.0 .0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0 .0.is_empty()
    }

    pub fn to_wkt(&self) -> String {
        let coords: Vec<String> = self
            .0
            .coords()
            .map(|c| format!("{} {}", c.x, c.y))
            .collect();
        format!("LINESTRING({})", coords.join(", "))
    }

    pub fn from_wkt(wkt: &str) -> Result<Self, GeometryError> {
        let body = strip_tag(wkt, "LINESTRING")?;
        Ok(Self(LineString::from(parse_coord_list(body)?)))
    }
}

fn strip_tag<'a>(wkt: &'a str, tag: &str) -> Result<&'a str, GeometryError> {
    let trimmed = wkt.trim();
    trimmed
        .strip_prefix(tag)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| GeometryError::Wkt(wkt.to_string()))
}

fn parse_coord_list(body: &str) -> Result<Vec<Coord<f64>>, GeometryError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    body.split(',')
        .map(|pair| {
            let mut nums = pair.split_whitespace().map(str::parse::<f64>);
            match (nums.next(), nums.next(), nums.next()) {
                (Some(Ok(x)), Some(Ok(y)), None) => Ok(Coord { x, y }),
                _ => Err(GeometryError::Wkt(pair.to_string())),
            }
        })
        .collect()
}

/// Serde adapter: `GeoPoint` as a WKT string.
pub mod wkt_point {
    use super::*;

    pub fn serialize<S: Serializer>(p: &Option<GeoPoint>, s: S) -> Result<S::Ok, S::Error> {
        match p {
            Some(p) => s.serialize_some(&p.to_wkt()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<GeoPoint>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|wkt| GeoPoint::from_wkt(&wkt).map_err(de::Error::custom))
            .transpose()
    }
}

/// Serde adapter: `TrackLine` as a WKT string.
pub mod wkt_line {
    use super::*;

    pub fn serialize<S: Serializer>(l: &Option<TrackLine>, s: S) -> Result<S::Ok, S::Error> {
        match l {
            Some(l) => s.serialize_some(&l.to_wkt()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TrackLine>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|wkt| TrackLine::from_wkt(&wkt).map_err(de::Error::custom))
            .transpose()
    }
}

impl Serialize for GeoPoint {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_wkt())
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let wkt = String::deserialize(d)?;
        GeoPoint::from_wkt(&wkt).map_err(de::Error::custom)
    }
}

/// Errors from geometry decoding.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("Failed to decode polyline: {0}")]
    Polyline(String),

    #[error("Malformed WKT: {0}")]
    Wkt(String),
}
