//! Derive per-point distance and speed plus whole-track aggregates.

use crate::codec::sport::classify_sport;
use crate::codec::types::{CodecError, TrackPoint, TrackSummary, Waypoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine distance, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const DEFAULT_HEART_RATE_KEYS: &[&str] = &["hr", "heart_rate", "heartrate", "gpxtpx:hr", "ns3:hr"];
pub const DEFAULT_CADENCE_KEYS: &[&str] = &["cad", "cadence", "gpxtpx:cad", "ns3:cad"];

/// Great-circle distance in meters between two coordinates given in degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Extension keys searched for sensor values, in priority order.
///
/// Keys are matched case-sensitively against the waypoint's extension names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionAliases {
    pub heart_rate: Vec<String>,
    pub cadence: Vec<String>,
}

impl Default for ExtensionAliases {
    fn default() -> Self {
        Self {
            heart_rate: DEFAULT_HEART_RATE_KEYS.iter().map(|key| key.to_string()).collect(),
            cadence: DEFAULT_CADENCE_KEYS.iter().map(|key| key.to_string()).collect(),
        }
    }
}

impl ExtensionAliases {
    pub fn heart_rate(&self, waypoint: &Waypoint) -> Option<u16> {
        first_numeric(waypoint, &self.heart_rate)
    }

    pub fn cadence(&self, waypoint: &Waypoint) -> Option<u16> {
        first_numeric(waypoint, &self.cadence)
    }
}

fn first_numeric(waypoint: &Waypoint, keys: &[String]) -> Option<u16> {
    keys.iter()
        .filter_map(|key| waypoint.extension(key))
        .find_map(parse_sensor_value)
}

fn parse_sensor_value(raw: &str) -> Option<u16> {
    let value = raw.trim().parse::<f64>().ok()?;
    if value.is_finite() && (0.0..=f64::from(u16::MAX)).contains(&value) {
        Some(value.round() as u16)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct IntStats {
    sum: u64,
    count: u64,
    max: Option<u16>,
}

impl IntStats {
    fn push(&mut self, value: u16) {
        self.sum += u64::from(value);
        self.count += 1;
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
    }

    /// Truncating integer mean.
    fn mean(&self) -> Option<u16> {
        (self.count > 0).then(|| (self.sum / self.count) as u16)
    }
}

#[derive(Debug, Clone)]
struct Previous {
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
}

/// Streaming form of the extractor: feed waypoints in order, get points back.
///
/// Only running aggregates are kept, so memory use does not grow with the
/// track length.
#[derive(Debug, Clone)]
pub struct TrackAccumulator<'a> {
    aliases: &'a ExtensionAliases,
    previous: Option<Previous>,
    point_count: usize,
    distance_m: f64,
    ascent_m: f64,
    first_time: Option<DateTime<Utc>>,
    last_time: Option<DateTime<Utc>>,
    /// Cumulative distance at the first and last timestamped points.
    timed_distance_m: (f64, f64),
    heart_rate: IntStats,
    cadence: IntStats,
    max_speed: Option<f64>,
    min_altitude: Option<f64>,
    max_altitude: Option<f64>,
}

impl<'a> TrackAccumulator<'a> {
    pub fn new(aliases: &'a ExtensionAliases) -> Self {
        Self {
            aliases,
            previous: None,
            point_count: 0,
            distance_m: 0.0,
            ascent_m: 0.0,
            first_time: None,
            last_time: None,
            timed_distance_m: (0.0, 0.0),
            heart_rate: IntStats::default(),
            cadence: IntStats::default(),
            max_speed: None,
            min_altitude: None,
            max_altitude: None,
        }
    }

    /// Consume the next waypoint and return its enriched point.
    pub fn push(&mut self, waypoint: &Waypoint) -> Result<TrackPoint, CodecError> {
        validate_coordinates(waypoint, self.point_count)?;

        let mut speed = None;
        if let Some(prev) = &self.previous {
            let segment = haversine_distance(
                prev.latitude,
                prev.longitude,
                waypoint.latitude,
                waypoint.longitude,
            );
            self.distance_m += segment;

            if let (Some(from), Some(to)) = (prev.elevation, waypoint.elevation) {
                let climb = to - from;
                if climb > 0.0 {
                    self.ascent_m += climb;
                }
            }

            if let (Some(from), Some(to)) = (prev.timestamp, waypoint.time) {
                let seconds = (to - from).num_milliseconds() as f64 / 1000.0;
                if seconds > 0.0 {
                    speed = Some(segment / seconds);
                }
            }
        }

        let heart_rate = self.aliases.heart_rate(waypoint);
        let cadence = self.aliases.cadence(waypoint);

        if let Some(hr) = heart_rate {
            self.heart_rate.push(hr);
        }
        if let Some(cad) = cadence {
            self.cadence.push(cad);
        }
        if let Some(value) = speed {
            self.max_speed = Some(self.max_speed.map_or(value, |max: f64| max.max(value)));
        }
        if let Some(elevation) = waypoint.elevation {
            self.min_altitude = Some(self.min_altitude.map_or(elevation, |min: f64| min.min(elevation)));
            self.max_altitude = Some(self.max_altitude.map_or(elevation, |max: f64| max.max(elevation)));
        }
        if let Some(time) = waypoint.time {
            if self.first_time.is_none() {
                self.first_time = Some(time);
                self.timed_distance_m.0 = self.distance_m;
            }
            self.last_time = Some(time);
            self.timed_distance_m.1 = self.distance_m;
        }

        self.previous = Some(Previous {
            latitude: waypoint.latitude,
            longitude: waypoint.longitude,
            elevation: waypoint.elevation,
            timestamp: waypoint.time,
        });
        self.point_count += 1;

        Ok(TrackPoint {
            latitude: waypoint.latitude,
            longitude: waypoint.longitude,
            elevation: waypoint.elevation,
            timestamp: waypoint.time,
            heart_rate,
            cadence,
            cumulative_distance_m: self.distance_m,
            instantaneous_speed_mps: speed,
        })
    }

    /// Close the track and compute its summary, including the sport.
    pub fn finish(self, require_timing: bool) -> Result<TrackSummary, CodecError> {
        if self.point_count < 2 {
            return Err(CodecError::EmptyTrack {
                points: self.point_count,
            });
        }
        if require_timing && self.first_time.is_none() {
            return Err(CodecError::MissingTimestamp);
        }

        let total_elapsed_seconds = match (self.first_time, self.last_time) {
            (Some(first), Some(last)) => ((last - first).num_milliseconds() as f64 / 1000.0).max(0.0),
            _ => 0.0,
        };
        // Untimed points outside the timed window add distance but no time.
        let (timed_start, timed_end) = self.timed_distance_m;
        let avg_speed_mps = (total_elapsed_seconds > 0.0)
            .then(|| (timed_end - timed_start) / total_elapsed_seconds);

        Ok(TrackSummary {
            start_time: self.first_time,
            total_elapsed_seconds,
            total_distance_m: self.distance_m,
            total_ascent_m: self.ascent_m,
            avg_heart_rate: self.heart_rate.mean(),
            max_heart_rate: self.heart_rate.max,
            avg_cadence: self.cadence.mean(),
            max_cadence: self.cadence.max,
            avg_speed_mps,
            max_speed_mps: self.max_speed,
            min_altitude_m: self.min_altitude,
            max_altitude_m: self.max_altitude,
            point_count: self.point_count,
            sport: classify_sport(avg_speed_mps),
        })
    }
}

fn validate_coordinates(waypoint: &Waypoint, index: usize) -> Result<(), CodecError> {
    let lat_ok = waypoint.latitude.is_finite() && waypoint.latitude.abs() <= 90.0;
    let lon_ok = waypoint.longitude.is_finite() && waypoint.longitude.abs() <= 180.0;
    if lat_ok && lon_ok {
        Ok(())
    } else {
        Err(CodecError::InvalidTrack {
            reason: format!(
                "point {index} has invalid coordinates ({}, {})",
                waypoint.latitude, waypoint.longitude
            ),
        })
    }
}

/// Turn a waypoint sequence into enriched points and its summary.
///
/// With `require_timing` set, a track where no point carries a timestamp is
/// rejected with [`CodecError::MissingTimestamp`].
pub fn extract_track(
    waypoints: &[Waypoint],
    aliases: &ExtensionAliases,
    require_timing: bool,
) -> Result<(Vec<TrackPoint>, TrackSummary), CodecError> {
    if waypoints.len() < 2 {
        return Err(CodecError::EmptyTrack {
            points: waypoints.len(),
        });
    }

    let mut accumulator = TrackAccumulator::new(aliases);
    let points = waypoints
        .iter()
        .map(|waypoint| accumulator.push(waypoint))
        .collect::<Result<Vec<_>, _>>()?;
    let summary = accumulator.finish(require_timing)?;

    Ok((points, summary))
}
