//! Subset of the FIT global profile needed to write activity files.
//!
//! Message numbers, field numbers, base types and scale/offset pairs are kept
//! in one immutable [`FitProfile`] value that the encoder receives explicitly.

/// FIT base types used by the activity messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Enum,
    UInt8,
    UInt16,
    SInt32,
    UInt32,
    UInt32z,
}

impl BaseType {
    /// Base type identifier written into field definitions.
    pub fn id(self) -> u8 {
        match self {
            BaseType::Enum => 0x00,
            BaseType::UInt8 => 0x02,
            BaseType::UInt16 => 0x84,
            BaseType::SInt32 => 0x85,
            BaseType::UInt32 => 0x86,
            BaseType::UInt32z => 0x8C,
        }
    }

    pub fn size(self) -> u8 {
        match self {
            BaseType::Enum | BaseType::UInt8 => 1,
            BaseType::UInt16 => 2,
            BaseType::SInt32 | BaseType::UInt32 | BaseType::UInt32z => 4,
        }
    }

    /// Inclusive range of raw values that are not the base type's invalid marker.
    pub fn valid_range(self) -> (i64, i64) {
        match self {
            BaseType::Enum | BaseType::UInt8 => (0, 0xFE),
            BaseType::UInt16 => (0, 0xFFFE),
            BaseType::SInt32 => (i32::MIN as i64, i32::MAX as i64 - 1),
            BaseType::UInt32 => (0, 0xFFFF_FFFE),
            BaseType::UInt32z => (1, 0xFFFF_FFFF),
        }
    }
}

/// One field of a global message: number, storage type and unit conversion.
///
/// Raw values are computed as `(value + offset) * scale`, rounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub number: u8,
    pub base_type: BaseType,
    pub scale: f64,
    pub offset: f64,
}

impl FieldSpec {
    pub const fn new(name: &'static str, number: u8, base_type: BaseType) -> Self {
        Self {
            name,
            number,
            base_type,
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub const fn scaled(
        name: &'static str,
        number: u8,
        base_type: BaseType,
        scale: f64,
        offset: f64,
    ) -> Self {
        Self {
            name,
            number,
            base_type,
            scale,
            offset,
        }
    }
}

/// 2^31 / 180: semicircles per degree.
pub const SEMICIRCLES_PER_DEGREE: f64 = 2_147_483_648.0 / 180.0;

/// Seconds between the Unix epoch and the FIT epoch (1989-12-31T00:00:00Z).
pub const FIT_EPOCH_OFFSET_SECS: i64 = 631_065_600;

pub const HEADER_SIZE: u8 = 14;
/// Protocol 2.0.
pub const PROTOCOL_VERSION: u8 = 0x20;
/// Profile 21.40.
pub const PROFILE_VERSION: u16 = 2140;
pub const FILE_MAGIC: [u8; 4] = *b".FIT";

#[derive(Debug, Clone, Copy)]
pub struct FileIdFields {
    pub file_type: FieldSpec,
    pub manufacturer: FieldSpec,
    pub product: FieldSpec,
    pub serial_number: FieldSpec,
    pub time_created: FieldSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct EventFields {
    pub timestamp: FieldSpec,
    pub event: FieldSpec,
    pub event_type: FieldSpec,
    pub event_group: FieldSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct RecordFields {
    pub timestamp: FieldSpec,
    pub position_lat: FieldSpec,
    pub position_long: FieldSpec,
    pub altitude: FieldSpec,
    pub heart_rate: FieldSpec,
    pub cadence: FieldSpec,
    pub distance: FieldSpec,
    pub speed: FieldSpec,
}

/// Fields shared by lap and session summaries; only the numbers differ.
#[derive(Debug, Clone, Copy)]
pub struct SummaryFields {
    pub timestamp: FieldSpec,
    pub event: FieldSpec,
    pub event_type: FieldSpec,
    pub start_time: FieldSpec,
    pub total_elapsed_time: FieldSpec,
    pub total_timer_time: FieldSpec,
    pub total_distance: FieldSpec,
    pub total_ascent: FieldSpec,
    pub avg_speed: FieldSpec,
    pub max_speed: FieldSpec,
    pub avg_heart_rate: FieldSpec,
    pub max_heart_rate: FieldSpec,
    pub avg_cadence: FieldSpec,
    pub max_cadence: FieldSpec,
    pub min_altitude: FieldSpec,
    pub max_altitude: FieldSpec,
    pub sport: FieldSpec,
    pub message_index: FieldSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionExtraFields {
    pub first_lap_index: FieldSpec,
    pub num_laps: FieldSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityFields {
    pub timestamp: FieldSpec,
    pub total_timer_time: FieldSpec,
    pub num_sessions: FieldSpec,
    pub activity_type: FieldSpec,
    pub event: FieldSpec,
    pub event_type: FieldSpec,
}

/// Global message numbers.
#[derive(Debug, Clone, Copy)]
pub struct MesgNums {
    pub file_id: u16,
    pub event: u16,
    pub record: u16,
    pub lap: u16,
    pub session: u16,
    pub activity: u16,
}

/// Enum values written by the encoder.
#[derive(Debug, Clone, Copy)]
pub struct ProfileEnums {
    pub file_type_activity: u8,
    pub event_timer: u8,
    pub event_lap: u8,
    pub event_session: u8,
    pub event_activity: u8,
    pub event_type_start: u8,
    pub event_type_stop: u8,
    pub event_type_stop_all: u8,
    pub activity_manual: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct FitProfile {
    pub mesg_nums: MesgNums,
    pub enums: ProfileEnums,
    pub file_id: FileIdFields,
    pub event: EventFields,
    pub record: RecordFields,
    pub lap: SummaryFields,
    pub session: SummaryFields,
    pub session_extra: SessionExtraFields,
    pub activity: ActivityFields,
}

const TIMESTAMP: FieldSpec = FieldSpec::new("timestamp", 253, BaseType::UInt32);
const MESSAGE_INDEX: FieldSpec = FieldSpec::new("message_index", 254, BaseType::UInt16);

impl FitProfile {
    pub const STANDARD: FitProfile = FitProfile {
        mesg_nums: MesgNums {
            file_id: 0,
            event: 21,
            record: 20,
            lap: 19,
            session: 18,
            activity: 34,
        },
        enums: ProfileEnums {
            file_type_activity: 4,
            event_timer: 0,
            event_lap: 9,
            event_session: 8,
            event_activity: 26,
            event_type_start: 0,
            event_type_stop: 1,
            event_type_stop_all: 4,
            activity_manual: 0,
        },
        file_id: FileIdFields {
            file_type: FieldSpec::new("type", 0, BaseType::Enum),
            manufacturer: FieldSpec::new("manufacturer", 1, BaseType::UInt16),
            product: FieldSpec::new("product", 2, BaseType::UInt16),
            serial_number: FieldSpec::new("serial_number", 3, BaseType::UInt32z),
            time_created: FieldSpec::new("time_created", 4, BaseType::UInt32),
        },
        event: EventFields {
            timestamp: TIMESTAMP,
            event: FieldSpec::new("event", 0, BaseType::Enum),
            event_type: FieldSpec::new("event_type", 1, BaseType::Enum),
            event_group: FieldSpec::new("event_group", 4, BaseType::UInt8),
        },
        record: RecordFields {
            timestamp: TIMESTAMP,
            position_lat: FieldSpec::scaled(
                "position_lat",
                0,
                BaseType::SInt32,
                SEMICIRCLES_PER_DEGREE,
                0.0,
            ),
            position_long: FieldSpec::scaled(
                "position_long",
                1,
                BaseType::SInt32,
                SEMICIRCLES_PER_DEGREE,
                0.0,
            ),
            altitude: FieldSpec::scaled("altitude", 2, BaseType::UInt16, 5.0, 500.0),
            heart_rate: FieldSpec::new("heart_rate", 3, BaseType::UInt8),
            cadence: FieldSpec::new("cadence", 4, BaseType::UInt8),
            distance: FieldSpec::scaled("distance", 5, BaseType::UInt32, 100.0, 0.0),
            speed: FieldSpec::scaled("speed", 6, BaseType::UInt16, 1000.0, 0.0),
        },
        lap: SummaryFields {
            timestamp: TIMESTAMP,
            event: FieldSpec::new("event", 0, BaseType::Enum),
            event_type: FieldSpec::new("event_type", 1, BaseType::Enum),
            start_time: FieldSpec::new("start_time", 2, BaseType::UInt32),
            total_elapsed_time: FieldSpec::scaled(
                "total_elapsed_time",
                7,
                BaseType::UInt32,
                1000.0,
                0.0,
            ),
            total_timer_time: FieldSpec::scaled(
                "total_timer_time",
                8,
                BaseType::UInt32,
                1000.0,
                0.0,
            ),
            total_distance: FieldSpec::scaled("total_distance", 9, BaseType::UInt32, 100.0, 0.0),
            avg_speed: FieldSpec::scaled("avg_speed", 13, BaseType::UInt16, 1000.0, 0.0),
            max_speed: FieldSpec::scaled("max_speed", 14, BaseType::UInt16, 1000.0, 0.0),
            avg_heart_rate: FieldSpec::new("avg_heart_rate", 15, BaseType::UInt8),
            max_heart_rate: FieldSpec::new("max_heart_rate", 16, BaseType::UInt8),
            avg_cadence: FieldSpec::new("avg_cadence", 17, BaseType::UInt8),
            max_cadence: FieldSpec::new("max_cadence", 18, BaseType::UInt8),
            total_ascent: FieldSpec::new("total_ascent", 21, BaseType::UInt16),
            sport: FieldSpec::new("sport", 25, BaseType::Enum),
            max_altitude: FieldSpec::scaled("max_altitude", 43, BaseType::UInt16, 5.0, 500.0),
            min_altitude: FieldSpec::scaled("min_altitude", 62, BaseType::UInt16, 5.0, 500.0),
            message_index: MESSAGE_INDEX,
        },
        session: SummaryFields {
            timestamp: TIMESTAMP,
            event: FieldSpec::new("event", 0, BaseType::Enum),
            event_type: FieldSpec::new("event_type", 1, BaseType::Enum),
            start_time: FieldSpec::new("start_time", 2, BaseType::UInt32),
            sport: FieldSpec::new("sport", 5, BaseType::Enum),
            total_elapsed_time: FieldSpec::scaled(
                "total_elapsed_time",
                7,
                BaseType::UInt32,
                1000.0,
                0.0,
            ),
            total_timer_time: FieldSpec::scaled(
                "total_timer_time",
                8,
                BaseType::UInt32,
                1000.0,
                0.0,
            ),
            total_distance: FieldSpec::scaled("total_distance", 9, BaseType::UInt32, 100.0, 0.0),
            avg_speed: FieldSpec::scaled("avg_speed", 14, BaseType::UInt16, 1000.0, 0.0),
            max_speed: FieldSpec::scaled("max_speed", 15, BaseType::UInt16, 1000.0, 0.0),
            avg_heart_rate: FieldSpec::new("avg_heart_rate", 16, BaseType::UInt8),
            max_heart_rate: FieldSpec::new("max_heart_rate", 17, BaseType::UInt8),
            avg_cadence: FieldSpec::new("avg_cadence", 18, BaseType::UInt8),
            max_cadence: FieldSpec::new("max_cadence", 19, BaseType::UInt8),
            total_ascent: FieldSpec::new("total_ascent", 22, BaseType::UInt16),
            max_altitude: FieldSpec::scaled("max_altitude", 50, BaseType::UInt16, 5.0, 500.0),
            min_altitude: FieldSpec::scaled("min_altitude", 71, BaseType::UInt16, 5.0, 500.0),
            message_index: MESSAGE_INDEX,
        },
        session_extra: SessionExtraFields {
            first_lap_index: FieldSpec::new("first_lap_index", 25, BaseType::UInt16),
            num_laps: FieldSpec::new("num_laps", 26, BaseType::UInt16),
        },
        activity: ActivityFields {
            timestamp: TIMESTAMP,
            total_timer_time: FieldSpec::scaled(
                "total_timer_time",
                0,
                BaseType::UInt32,
                1000.0,
                0.0,
            ),
            num_sessions: FieldSpec::new("num_sessions", 1, BaseType::UInt16),
            activity_type: FieldSpec::new("type", 2, BaseType::Enum),
            event: FieldSpec::new("event", 3, BaseType::Enum),
            event_type: FieldSpec::new("event_type", 4, BaseType::Enum),
        },
    };
}

impl Default for FitProfile {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Local message slots used by the encoder (0-15).
pub mod local {
    pub const FILE_ID: u8 = 0;
    pub const EVENT: u8 = 1;
    pub const RECORD: u8 = 2;
    pub const LAP: u8 = 3;
    pub const SESSION: u8 = 4;
    pub const ACTIVITY: u8 = 5;
    pub const MAX: u8 = 15;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_type_sizes_match_identifiers() {
        for base in [
            BaseType::Enum,
            BaseType::UInt8,
            BaseType::UInt16,
            BaseType::SInt32,
            BaseType::UInt32,
            BaseType::UInt32z,
        ] {
            // The low 5 bits of a base type id are its number; sizes follow the FIT table.
            let expected = match base.id() & 0x1F {
                0x00 | 0x02 => 1,
                0x04 => 2,
                0x05 | 0x06 | 0x0C => 4,
                other => panic!("unexpected base type {other:#x}"),
            };
            assert_eq!(base.size(), expected);
        }
    }

    #[test]
    fn record_and_session_numbers_follow_global_profile() {
        let profile = FitProfile::STANDARD;
        assert_eq!(profile.mesg_nums.record, 20);
        assert_eq!(profile.mesg_nums.session, 18);
        assert_eq!(profile.record.altitude.offset, 500.0);
        assert_eq!(profile.session.sport.number, 5);
        assert_eq!(profile.lap.sport.number, 25);
    }
}
