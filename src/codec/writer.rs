use crate::codec::profile::{BaseType, FIT_EPOCH_OFFSET_SECS, FieldSpec};
use crate::codec::types::CodecError;
use chrono::{DateTime, Utc};

/// A value to be stored in a field, before scale and offset are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// A quantity in the field's natural unit (degrees, meters, m/s, ...).
    Number(f64),
    /// An instant, stored as seconds since the FIT epoch.
    Time(DateTime<Utc>),
    /// A raw enum or integer value written as-is.
    Raw(u32),
}

/// Convert an instant to seconds since 1989-12-31T00:00:00Z.
pub fn fit_timestamp(time: DateTime<Utc>) -> Result<u32, CodecError> {
    let seconds = time.timestamp() - FIT_EPOCH_OFFSET_SECS;
    u32::try_from(seconds)
        .ok()
        .filter(|value| *value < u32::MAX)
        .ok_or_else(|| {
            CodecError::encoding("timestamp", format!("{time} lies outside the FIT time range"))
        })
}

/// Little-endian byte sink for FIT messages.
///
/// All scale/offset conversions and range checks happen in [`write_field`],
/// so individual messages only describe which values go where.
///
/// [`write_field`]: BinaryWriter::write_field
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Encode `value` according to `spec` and append it.
    pub fn write_field(&mut self, spec: &FieldSpec, value: FieldValue) -> Result<(), CodecError> {
        let raw = raw_value(spec, value)?;
        let (min, max) = spec.base_type.valid_range();
        if raw < min || raw > max {
            return Err(CodecError::encoding(
                spec.name,
                format!("raw value {raw} outside {min}..={max}"),
            ));
        }

        match spec.base_type {
            BaseType::Enum | BaseType::UInt8 => self.write_u8(raw as u8),
            BaseType::UInt16 => self.write_u16_le(raw as u16),
            BaseType::SInt32 => self.write_i32_le(raw as i32),
            BaseType::UInt32 | BaseType::UInt32z => self.write_u32_le(raw as u32),
        }
        Ok(())
    }
}

fn raw_value(spec: &FieldSpec, value: FieldValue) -> Result<i64, CodecError> {
    match value {
        FieldValue::Number(quantity) => {
            if !quantity.is_finite() {
                return Err(CodecError::encoding(spec.name, "value is not finite"));
            }
            let scaled = ((quantity + spec.offset) * spec.scale).round();
            if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
                return Err(CodecError::encoding(spec.name, format!("{quantity} overflows")));
            }
            Ok(scaled as i64)
        }
        FieldValue::Time(time) => fit_timestamp(time).map(i64::from),
        FieldValue::Raw(raw) => Ok(i64::from(raw)),
    }
}
