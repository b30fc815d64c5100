//! Serialize a track into a FIT activity message stream.
//!
//! The data section of a FIT file is a sequence of messages. A definition
//! message binds a local message number (0-15) to a global message and a field
//! layout; every following data message with the same local number is read
//! with that layout until another definition replaces it. [`MessageStream`]
//! tracks the active layout per local number and only writes a definition when
//! the layout of the next data message differs from it.

use crate::codec::profile::{
    FILE_MAGIC, FieldSpec, FitProfile, HEADER_SIZE, PROFILE_VERSION, PROTOCOL_VERSION,
    SummaryFields, local,
};
use crate::codec::crc::crc16;
use crate::codec::types::{CodecError, Sport, TrackPoint, TrackSummary};
use crate::codec::writer::{BinaryWriter, FieldValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

const DEFINITION_FLAG: u8 = 0x40;
const LOCAL_NUMBER_MASK: u8 = 0x0F;
const ARCHITECTURE_LITTLE_ENDIAN: u8 = 0;

/// Identity written into the file_id message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    /// 255 is the FIT "development" manufacturer.
    pub manufacturer: u16,
    pub product: u16,
    pub serial_number: u32,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            manufacturer: 255,
            product: 1,
            serial_number: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldDefinition {
    number: u8,
    size: u8,
    base_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MessageDefinition {
    global_mesg_num: u16,
    fields: Vec<FieldDefinition>,
}

impl MessageDefinition {
    fn data_size(&self) -> usize {
        self.fields.iter().map(|field| field.size as usize).sum()
    }
}

/// One data message under construction: a global message and its values.
#[derive(Debug, Clone)]
pub struct Message<'p> {
    global_mesg_num: u16,
    values: Vec<(&'p FieldSpec, FieldValue)>,
}

impl<'p> Message<'p> {
    pub fn new(global_mesg_num: u16) -> Self {
        Self {
            global_mesg_num,
            values: Vec::new(),
        }
    }

    pub fn field(mut self, spec: &'p FieldSpec, value: FieldValue) -> Self {
        self.values.push((spec, value));
        self
    }

    /// Add the field only when a value is present.
    pub fn optional(self, spec: &'p FieldSpec, value: Option<FieldValue>) -> Self {
        match value {
            Some(value) => self.field(spec, value),
            None => self,
        }
    }

    fn definition(&self) -> MessageDefinition {
        MessageDefinition {
            global_mesg_num: self.global_mesg_num,
            fields: self
                .values
                .iter()
                .map(|(spec, _)| FieldDefinition {
                    number: spec.number,
                    size: spec.base_type.size(),
                    base_type: spec.base_type.id(),
                })
                .collect(),
        }
    }
}

/// Definition-aware writer for the FIT data section.
#[derive(Debug, Default)]
pub struct MessageStream {
    writer: BinaryWriter,
    active: [Option<MessageDefinition>; 16],
    definitions_written: usize,
    data_written: usize,
}

impl MessageStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    pub fn definitions_written(&self) -> usize {
        self.definitions_written
    }

    pub fn data_written(&self) -> usize {
        self.data_written
    }

    /// Write `message` under `local_number`, preceded by a definition when the
    /// local number is unbound or bound to a different layout.
    ///
    /// Values are encoded before anything is appended, so a failing field
    /// leaves the stream untouched.
    pub fn write(&mut self, local_number: u8, message: &Message<'_>) -> Result<(), CodecError> {
        if local_number > local::MAX {
            return Err(CodecError::integrity(format!(
                "local message number {local_number} exceeds {}",
                local::MAX
            )));
        }

        let definition = message.definition();
        let mut payload = BinaryWriter::with_capacity(definition.data_size());
        for (spec, value) in &message.values {
            payload.write_field(spec, *value)?;
        }
        if payload.len() != definition.data_size() {
            return Err(CodecError::integrity(format!(
                "message {} encoded {} bytes for a {} byte layout",
                message.global_mesg_num,
                payload.len(),
                definition.data_size()
            )));
        }

        let slot = &mut self.active[local_number as usize];
        if slot.as_ref() != Some(&definition) {
            write_definition(&mut self.writer, local_number, &definition)?;
            *slot = Some(definition);
            self.definitions_written += 1;
        }

        self.writer.write_u8(local_number & LOCAL_NUMBER_MASK);
        self.writer.write_bytes(payload.as_bytes());
        self.data_written += 1;
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

fn write_definition(
    writer: &mut BinaryWriter,
    local_number: u8,
    definition: &MessageDefinition,
) -> Result<(), CodecError> {
    let field_count = u8::try_from(definition.fields.len()).map_err(|_| {
        CodecError::integrity(format!(
            "message {} declares {} fields",
            definition.global_mesg_num,
            definition.fields.len()
        ))
    })?;

    writer.write_u8(DEFINITION_FLAG | (local_number & LOCAL_NUMBER_MASK));
    writer.write_u8(0); // reserved
    writer.write_u8(ARCHITECTURE_LITTLE_ENDIAN);
    writer.write_u16_le(definition.global_mesg_num);
    writer.write_u8(field_count);
    for field in &definition.fields {
        writer.write_u8(field.number);
        writer.write_u8(field.size);
        writer.write_u8(field.base_type);
    }
    Ok(())
}

/// Incremental activity writer.
///
/// [`begin`](Self::begin) emits the file_id and start event, each
/// [`write_point`](Self::write_point) one record, and
/// [`finish`](Self::finish) the stop event and the lap, session and activity
/// summaries. Points never need to be held in memory together.
#[derive(Debug)]
pub struct ActivityEncoder<'p> {
    profile: &'p FitProfile,
    stream: MessageStream,
    start_time: DateTime<Utc>,
    records: usize,
}

impl<'p> ActivityEncoder<'p> {
    pub fn begin(
        profile: &'p FitProfile,
        device: &DeviceInfo,
        start_time: DateTime<Utc>,
    ) -> Result<Self, CodecError> {
        let mut stream = MessageStream::new();
        let ids = &profile.file_id;
        let file_id = Message::new(profile.mesg_nums.file_id)
            .field(&ids.file_type, FieldValue::Raw(profile.enums.file_type_activity.into()))
            .field(&ids.manufacturer, FieldValue::Raw(device.manufacturer.into()))
            .field(&ids.product, FieldValue::Raw(device.product.into()))
            .field(&ids.serial_number, FieldValue::Raw(device.serial_number))
            .field(&ids.time_created, FieldValue::Time(start_time));
        stream.write(local::FILE_ID, &file_id)?;

        let start = timer_event(profile, start_time, profile.enums.event_type_start);
        stream.write(local::EVENT, &start)?;

        Ok(Self {
            profile,
            stream,
            start_time,
            records: 0,
        })
    }

    /// Append one record message; `index` is only used for error reporting.
    pub fn write_point(&mut self, index: usize, point: &TrackPoint) -> Result<(), CodecError> {
        let fields = &self.profile.record;
        let record = Message::new(self.profile.mesg_nums.record)
            .optional(&fields.timestamp, point.timestamp.map(FieldValue::Time))
            .field(&fields.position_lat, FieldValue::Number(point.latitude))
            .field(
                &fields.position_long,
                FieldValue::Number(wrap_longitude(point.longitude)),
            )
            .optional(&fields.altitude, point.elevation.map(FieldValue::Number))
            .optional(&fields.heart_rate, point.heart_rate.map(|hr| FieldValue::Number(hr.into())))
            .optional(&fields.cadence, point.cadence.map(|cad| FieldValue::Number(cad.into())))
            .field(&fields.distance, FieldValue::Number(point.cumulative_distance_m))
            .optional(&fields.speed, point.instantaneous_speed_mps.map(FieldValue::Number));

        self.stream
            .write(local::RECORD, &record)
            .map_err(|err| match err {
                CodecError::Encoding {
                    field,
                    point_index,
                    reason,
                } if field == fields.speed.name => CodecError::Encoding {
                    field,
                    point_index,
                    reason: format!(
                        "{reason}; the position jumps at {:.0} m/s from the previous point, likely a GPS glitch",
                        point.instantaneous_speed_mps.unwrap_or_default()
                    ),
                },
                other => other,
            })
            .map_err(|err| err.at_point(index))?;
        self.records += 1;
        Ok(())
    }

    /// Emit the closing messages and return the finished data section.
    pub fn finish(mut self, summary: &TrackSummary, sport: Sport) -> Result<Vec<u8>, CodecError> {
        if self.records != summary.point_count {
            return Err(CodecError::integrity(format!(
                "wrote {} records for a summary of {} points",
                self.records, summary.point_count
            )));
        }

        let profile = self.profile;
        let end_time = summary.end_time().unwrap_or(self.start_time);

        let stop = timer_event(profile, end_time, profile.enums.event_type_stop_all);
        self.stream.write(local::EVENT, &stop)?;

        let lap = summary_message(
            profile.mesg_nums.lap,
            &profile.lap,
            profile.enums.event_lap,
            profile,
            summary,
            sport,
            self.start_time,
            end_time,
        );
        self.stream.write(local::LAP, &lap)?;

        let extra = &profile.session_extra;
        let session = summary_message(
            profile.mesg_nums.session,
            &profile.session,
            profile.enums.event_session,
            profile,
            summary,
            sport,
            self.start_time,
            end_time,
        )
        .field(&extra.first_lap_index, FieldValue::Raw(0))
        .field(&extra.num_laps, FieldValue::Raw(1));
        self.stream.write(local::SESSION, &session)?;

        let fields = &profile.activity;
        let activity = Message::new(profile.mesg_nums.activity)
            .field(&fields.timestamp, FieldValue::Time(end_time))
            .field(
                &fields.total_timer_time,
                FieldValue::Number(summary.total_elapsed_seconds),
            )
            .field(&fields.num_sessions, FieldValue::Raw(1))
            .field(
                &fields.activity_type,
                FieldValue::Raw(profile.enums.activity_manual.into()),
            )
            .field(&fields.event, FieldValue::Raw(profile.enums.event_activity.into()))
            .field(&fields.event_type, FieldValue::Raw(profile.enums.event_type_stop.into()));
        self.stream.write(local::ACTIVITY, &activity)?;

        tracing::debug!(
            records = self.records,
            definitions = self.stream.definitions_written(),
            messages = self.stream.data_written(),
            bytes = self.stream.len(),
            "encoded activity message stream"
        );

        Ok(self.stream.into_bytes())
    }
}

fn timer_event(profile: &FitProfile, time: DateTime<Utc>, event_type: u8) -> Message<'_> {
    let fields = &profile.event;
    Message::new(profile.mesg_nums.event)
        .field(&fields.timestamp, FieldValue::Time(time))
        .field(&fields.event, FieldValue::Raw(profile.enums.event_timer.into()))
        .field(&fields.event_type, FieldValue::Raw(event_type.into()))
        .field(&fields.event_group, FieldValue::Raw(0))
}

#[allow(clippy::too_many_arguments)]
fn summary_message<'p>(
    global_mesg_num: u16,
    fields: &'p SummaryFields,
    event: u8,
    profile: &FitProfile,
    summary: &TrackSummary,
    sport: Sport,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Message<'p> {
    let number = |value: Option<f64>| value.map(FieldValue::Number);
    let count = |value: Option<u16>| value.map(|v| FieldValue::Number(v.into()));

    Message::new(global_mesg_num)
        .field(&fields.timestamp, FieldValue::Time(end_time))
        .field(&fields.event, FieldValue::Raw(event.into()))
        .field(&fields.event_type, FieldValue::Raw(profile.enums.event_type_stop.into()))
        .field(&fields.start_time, FieldValue::Time(start_time))
        .field(
            &fields.total_elapsed_time,
            FieldValue::Number(summary.total_elapsed_seconds),
        )
        .field(
            &fields.total_timer_time,
            FieldValue::Number(summary.total_elapsed_seconds),
        )
        .field(&fields.total_distance, FieldValue::Number(summary.total_distance_m))
        .field(&fields.total_ascent, FieldValue::Number(summary.total_ascent_m))
        .optional(&fields.avg_speed, number(summary.avg_speed_mps))
        .optional(&fields.max_speed, number(summary.max_speed_mps))
        .optional(&fields.avg_heart_rate, count(summary.avg_heart_rate))
        .optional(&fields.max_heart_rate, count(summary.max_heart_rate))
        .optional(&fields.avg_cadence, count(summary.avg_cadence))
        .optional(&fields.max_cadence, count(summary.max_cadence))
        .optional(&fields.min_altitude, number(summary.min_altitude_m))
        .optional(&fields.max_altitude, number(summary.max_altitude_m))
        .field(&fields.sport, FieldValue::Raw(sport.fit_value().into()))
        .field(&fields.message_index, FieldValue::Raw(0))
}

/// +180° and -180° are the same meridian; only the latter fits in sint32 semicircles.
fn wrap_longitude(longitude: f64) -> f64 {
    if longitude >= 180.0 {
        longitude - 360.0
    } else {
        longitude
    }
}

/// Encode a whole activity from a summary and its points.
pub fn encode_activity<I>(
    profile: &FitProfile,
    device: &DeviceInfo,
    summary: &TrackSummary,
    points: I,
    sport: Sport,
) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator,
    I::Item: Borrow<TrackPoint>,
{
    let start_time = summary.start_time.ok_or(CodecError::MissingTimestamp)?;
    let mut encoder = ActivityEncoder::begin(profile, device, start_time)?;
    for (index, point) in points.into_iter().enumerate() {
        encoder.write_point(index, point.borrow())?;
    }
    encoder.finish(summary, sport)
}

/// Wrap a data section with the 14-byte header and the trailing CRC.
///
/// Bytes 12..14 of the header carry the CRC of header bytes 0..12; the final
/// two bytes carry the CRC of the header and the whole data section.
pub fn seal_file(data_section: &[u8]) -> Result<Vec<u8>, CodecError> {
    let data_size = u32::try_from(data_section.len()).map_err(|_| {
        CodecError::encoding(
            "data_size",
            format!("{} byte message stream does not fit in a FIT file", data_section.len()),
        )
    })?;

    let mut writer = BinaryWriter::with_capacity(HEADER_SIZE as usize + data_section.len() + 2);
    writer.write_u8(HEADER_SIZE);
    writer.write_u8(PROTOCOL_VERSION);
    writer.write_u16_le(PROFILE_VERSION);
    writer.write_u32_le(data_size);
    writer.write_bytes(&FILE_MAGIC);
    let header_crc = crc16(writer.as_bytes());
    writer.write_u16_le(header_crc);
    writer.write_bytes(data_section);
    let file_crc = crc16(writer.as_bytes());
    writer.write_u16_le(file_crc);

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crc::verify_checksum;
    use chrono::{Duration, TimeZone};

    const PROFILE: FitProfile = FitProfile::STANDARD;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap()
    }

    fn point(index: usize, heart_rate: Option<u16>) -> TrackPoint {
        TrackPoint {
            latitude: 48.0 + index as f64 * 0.0001,
            longitude: 11.0,
            elevation: Some(520.0),
            timestamp: Some(t0() + Duration::seconds(index as i64)),
            heart_rate,
            cadence: None,
            cumulative_distance_m: index as f64 * 11.1,
            instantaneous_speed_mps: (index > 0).then_some(11.1),
        }
    }

    fn summary(point_count: usize) -> TrackSummary {
        TrackSummary {
            start_time: Some(t0()),
            total_elapsed_seconds: (point_count - 1) as f64,
            total_distance_m: (point_count - 1) as f64 * 11.1,
            total_ascent_m: 0.0,
            avg_heart_rate: None,
            max_heart_rate: None,
            avg_cadence: None,
            max_cadence: None,
            avg_speed_mps: Some(11.1),
            max_speed_mps: Some(11.1),
            min_altitude_m: Some(520.0),
            max_altitude_m: Some(520.0),
            point_count,
            sport: Sport::Cycling,
        }
    }

    /// Walk the data section and return (is_definition, local number) per message.
    fn message_headers(data: &[u8]) -> Vec<(bool, u8)> {
        let mut layouts: std::collections::HashMap<u8, usize> = std::collections::HashMap::new();
        let mut offset = 0;
        let mut headers = Vec::new();
        while offset < data.len() {
            let header = data[offset];
            let local_number = header & 0x0F;
            offset += 1;
            if header & DEFINITION_FLAG != 0 {
                let num_fields = data[offset + 4] as usize;
                let size: usize = (0..num_fields)
                    .map(|idx| data[offset + 5 + idx * 3 + 1] as usize)
                    .sum();
                layouts.insert(local_number, size);
                offset += 5 + num_fields * 3;
                headers.push((true, local_number));
            } else {
                offset += layouts[&local_number];
                headers.push((false, local_number));
            }
        }
        assert_eq!(offset, data.len());
        headers
    }

    #[test]
    fn definitions_are_only_repeated_when_the_layout_changes() {
        let points = vec![point(0, None), point(1, Some(120)), point(2, Some(121)), point(3, None)];
        let data = encode_activity(&PROFILE, &DeviceInfo::default(), &summary(4), &points, Sport::Cycling)
            .unwrap();

        let record_definitions = message_headers(&data)
            .into_iter()
            .filter(|(is_definition, local_number)| *is_definition && *local_number == local::RECORD)
            .count();
        // no hr -> hr -> hr -> no hr
        assert_eq!(record_definitions, 3);
    }

    #[test]
    fn message_order_follows_activity_layout() {
        let points = vec![point(0, None), point(1, None)];
        let data = encode_activity(&PROFILE, &DeviceInfo::default(), &summary(2), &points, Sport::Cycling)
            .unwrap();

        let data_locals: Vec<u8> = message_headers(&data)
            .into_iter()
            .filter(|(is_definition, _)| !is_definition)
            .map(|(_, local_number)| local_number)
            .collect();
        assert_eq!(
            data_locals,
            vec![
                local::FILE_ID,
                local::EVENT,
                local::RECORD,
                local::RECORD,
                local::EVENT,
                local::LAP,
                local::SESSION,
                local::ACTIVITY,
            ]
        );
    }

    #[test]
    fn file_id_time_created_comes_from_start_time() {
        let points = vec![point(0, None), point(1, None)];
        let data = encode_activity(&PROFILE, &DeviceInfo::default(), &summary(2), &points, Sport::Cycling)
            .unwrap();

        // definition: 1 header + 5 fixed + 5 fields * 3, then data header,
        // type (1), manufacturer (2), product (2), serial (4), time_created (4).
        let data_start = 1 + 5 + 5 * 3 + 1;
        let created = &data[data_start + 9..data_start + 13];
        let expected = (t0().timestamp() - crate::codec::profile::FIT_EPOCH_OFFSET_SECS) as u32;
        assert_eq!(u32::from_le_bytes(created.try_into().unwrap()), expected);
    }

    #[test]
    fn encoding_error_reports_point_index() {
        let mut bad = point(1, None);
        bad.elevation = Some(-700.0);
        let points = vec![point(0, None), bad];
        let err = encode_activity(&PROFILE, &DeviceInfo::default(), &summary(2), &points, Sport::Cycling)
            .unwrap_err();
        match err {
            CodecError::Encoding {
                field, point_index, ..
            } => {
                assert_eq!(field, "altitude");
                assert_eq!(point_index, Some(1));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn speed_overflow_names_the_position_jump() {
        let mut jump = point(1, None);
        jump.instantaneous_speed_mps = Some(111.2);
        let points = vec![point(0, None), jump];
        let err = encode_activity(&PROFILE, &DeviceInfo::default(), &summary(2), &points, Sport::Cycling)
            .unwrap_err();
        match &err {
            CodecError::Encoding {
                field, point_index, reason,
            } => {
                assert_eq!(*field, "speed");
                assert_eq!(*point_index, Some(1));
                assert!(reason.contains("GPS glitch"), "reason was {reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("at point 1"));
    }

    #[test]
    fn failed_message_leaves_stream_untouched() {
        let fields = &PROFILE.record;
        let mut stream = MessageStream::new();
        let bad = Message::new(PROFILE.mesg_nums.record)
            .field(&fields.distance, FieldValue::Number(1.0))
            .field(&fields.heart_rate, FieldValue::Number(400.0));
        assert!(stream.write(local::RECORD, &bad).is_err());
        assert!(stream.is_empty());
    }

    #[test]
    fn local_numbers_above_fifteen_are_rejected() {
        let mut stream = MessageStream::new();
        let message = Message::new(PROFILE.mesg_nums.event);
        let err = stream.write(16, &message).unwrap_err();
        assert!(matches!(err, CodecError::Integrity { .. }));
    }

    #[test]
    fn record_count_mismatch_is_an_integrity_error() {
        let points = vec![point(0, None), point(1, None)];
        let err = encode_activity(&PROFILE, &DeviceInfo::default(), &summary(3), &points, Sport::Cycling)
            .unwrap_err();
        assert!(matches!(err, CodecError::Integrity { .. }));
    }

    #[test]
    fn longitude_180_wraps_to_minus_180() {
        let mut edge = point(0, None);
        edge.longitude = 180.0;
        let mut encoder = ActivityEncoder::begin(&PROFILE, &DeviceInfo::default(), t0()).unwrap();
        assert!(encoder.write_point(0, &edge).is_ok());
    }

    #[test]
    fn sealed_file_has_header_length_and_checksums() {
        let data = vec![0x40, 0x00, 0x00, 0x00, 0x00, 0x00];
        let file = seal_file(&data).unwrap();

        assert_eq!(file.len(), 14 + data.len() + 2);
        assert_eq!(file[0], 14);
        assert_eq!(file[1], PROTOCOL_VERSION);
        assert_eq!(u16::from_le_bytes([file[2], file[3]]), PROFILE_VERSION);
        assert_eq!(u32::from_le_bytes(file[4..8].try_into().unwrap()), data.len() as u32);
        assert_eq!(&file[8..12], b".FIT");
        assert_eq!(u16::from_le_bytes([file[12], file[13]]), crc16(&file[..12]));
        assert!(verify_checksum(&file));
    }
}
