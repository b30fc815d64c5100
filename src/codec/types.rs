use chrono::{DateTime, Utc};
use thiserror::Error;

/// A single geostamped sample as handed over by an ingestion step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub time: Option<DateTime<Utc>>,
    /// Extension values keyed by element name, in document order.
    pub extensions: Vec<(String, String)>,
}

impl Waypoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.push((key.into(), value.into()));
        self
    }

    /// Look up an extension value by its exact (case-sensitive) key.
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Ordered run of waypoints without gaps.
#[derive(Debug, Clone, Default)]
pub struct TrackSegment {
    pub points: Vec<Waypoint>,
}

#[derive(Debug, Clone, Default)]
pub struct Track {
    pub name: Option<String>,
    pub segments: Vec<TrackSegment>,
}

/// A parsed track document, independent of the file format it came from.
#[derive(Debug, Clone, Default)]
pub struct TrackDocument {
    pub tracks: Vec<Track>,
}

impl TrackDocument {
    /// All waypoints of every segment of every track, in document order.
    pub fn waypoints(&self) -> impl Iterator<Item = &Waypoint> {
        self.tracks
            .iter()
            .flat_map(|track| &track.segments)
            .flat_map(|segment| &segment.points)
    }
}

/// A waypoint enriched with derived distance, speed and sensor values.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub heart_rate: Option<u16>,
    pub cadence: Option<u16>,
    pub cumulative_distance_m: f64,
    pub instantaneous_speed_mps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sport {
    Running,
    Cycling,
    Walking,
}

impl Sport {
    /// Value of the `sport` enum in the FIT profile.
    pub fn fit_value(self) -> u8 {
        match self {
            Sport::Running => 1,
            Sport::Cycling => 2,
            Sport::Walking => 11,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sport::Running => "running",
            Sport::Cycling => "cycling",
            Sport::Walking => "walking",
        }
    }
}

/// Aggregates over a whole track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub start_time: Option<DateTime<Utc>>,
    pub total_elapsed_seconds: f64,
    pub total_distance_m: f64,
    pub total_ascent_m: f64,
    pub avg_heart_rate: Option<u16>,
    pub max_heart_rate: Option<u16>,
    pub avg_cadence: Option<u16>,
    pub max_cadence: Option<u16>,
    pub avg_speed_mps: Option<f64>,
    pub max_speed_mps: Option<f64>,
    pub min_altitude_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub point_count: usize,
    pub sport: Sport,
}

impl TrackSummary {
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time.map(|start| {
            start + chrono::Duration::milliseconds((self.total_elapsed_seconds * 1000.0) as i64)
        })
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid track: {reason}")]
    InvalidTrack { reason: String },

    #[error("Track needs at least 2 points to form a segment, got {points}")]
    EmptyTrack { points: usize },

    #[error("No point in the track carries a timestamp")]
    MissingTimestamp,

    #[error("Cannot encode {field}{}: {reason}", point_suffix(.point_index))]
    Encoding {
        field: &'static str,
        point_index: Option<usize>,
        reason: String,
    },

    #[error("Internal invariant violated: {reason}")]
    Integrity { reason: String },
}

fn point_suffix(point_index: &Option<usize>) -> String {
    point_index
        .map(|idx| format!(" at point {idx}"))
        .unwrap_or_default()
}

impl CodecError {
    /// Whether the error stems from the caller's input rather than encoding.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidTrack { .. }
                | CodecError::EmptyTrack { .. }
                | CodecError::MissingTimestamp
        )
    }

    pub(crate) fn encoding(field: &'static str, reason: impl Into<String>) -> Self {
        CodecError::Encoding {
            field,
            point_index: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn integrity(reason: impl Into<String>) -> Self {
        CodecError::Integrity {
            reason: reason.into(),
        }
    }

    /// Attach the index of the offending point to an encoding error.
    pub(crate) fn at_point(self, index: usize) -> Self {
        match self {
            CodecError::Encoding { field, reason, .. } => CodecError::Encoding {
                field,
                point_index: Some(index),
                reason,
            },
            other => other,
        }
    }
}
