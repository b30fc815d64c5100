pub mod crc;
pub mod encode;
pub mod extract;
pub mod profile;
pub mod sport;
pub mod types;
pub mod writer;

use crate::config::CodecConfig;
use encode::{ActivityEncoder, seal_file};
use extract::TrackAccumulator;
use profile::FitProfile;
use std::borrow::Borrow;

pub use crc::{crc16, verify_checksum};
pub use encode::{DeviceInfo, encode_activity};
pub use extract::{ExtensionAliases, extract_track, haversine_distance};
pub use sport::classify_sport;
pub use types::{
    CodecError, Sport, Track, TrackDocument, TrackPoint, TrackSegment, TrackSummary, Waypoint,
};

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConvertedActivity {
    /// Complete FIT file: header, message stream and trailing CRC.
    pub bytes: Vec<u8>,
    pub summary: TrackSummary,
}

/// Convert a parsed track document into a FIT activity file.
///
/// Points of every segment of every track are joined in document order.
pub fn convert_track(
    document: &TrackDocument,
    config: &CodecConfig,
) -> Result<ConvertedActivity, CodecError> {
    if document.tracks.is_empty() {
        return Err(CodecError::InvalidTrack {
            reason: "document contains no tracks".into(),
        });
    }
    if document.tracks.iter().all(|track| track.segments.is_empty()) {
        return Err(CodecError::InvalidTrack {
            reason: "document contains no track segments".into(),
        });
    }

    let waypoints: Vec<&Waypoint> = document.waypoints().collect();
    if waypoints.is_empty() {
        return Err(CodecError::InvalidTrack {
            reason: "track segments contain no points".into(),
        });
    }

    convert_waypoints(waypoints, config)
}

/// Convert an ordered waypoint sequence into a FIT activity file.
///
/// The pipeline runs in a single pass: each waypoint is enriched by the
/// extractor and immediately written as a record, so the enriched points are
/// never collected. All input checks happen before the first byte is encoded,
/// and any failure discards the partial output.
pub fn convert_waypoints<I>(waypoints: I, config: &CodecConfig) -> Result<ConvertedActivity, CodecError>
where
    I: IntoIterator,
    I::Item: Borrow<Waypoint>,
    I::IntoIter: ExactSizeIterator + Clone,
{
    let waypoints = waypoints.into_iter();
    let point_count = waypoints.len();
    if point_count < 2 {
        return Err(CodecError::EmptyTrack {
            points: point_count,
        });
    }

    let start_time = waypoints
        .clone()
        .find_map(|waypoint| Borrow::<Waypoint>::borrow(&waypoint).time)
        .ok_or(CodecError::MissingTimestamp)?;

    let profile = FitProfile::STANDARD;
    let mut accumulator = TrackAccumulator::new(&config.extensions);
    let mut encoder = ActivityEncoder::begin(&profile, &config.device, start_time)?;

    for (index, waypoint) in waypoints.enumerate() {
        let point = accumulator.push(waypoint.borrow())?;
        encoder.write_point(index, &point)?;
    }

    let summary = accumulator.finish(true)?;
    let data_section = encoder.finish(&summary, summary.sport)?;
    let bytes = seal_file(&data_section)?;

    let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    if declared != data_section.len() || !verify_checksum(&bytes) {
        return Err(CodecError::integrity("sealed file failed self-check"));
    }

    tracing::debug!(
        points = summary.point_count,
        distance_m = summary.total_distance_m,
        sport = summary.sport.as_str(),
        bytes = bytes.len(),
        "converted track to FIT activity"
    );

    Ok(ConvertedActivity { bytes, summary })
}
