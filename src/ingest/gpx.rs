//! GPX 1.1 track reader.
//!
//! Only `<trk>` content is read: track names, segments and `<trkpt>` elements
//! with their `ele`, `time` and `<extensions>` children. Every element with
//! text inside `<extensions>` becomes one extension entry keyed by its
//! qualified name (for example `gpxtpx:hr`), however deeply it is nested.

use crate::codec::{Track, TrackDocument, TrackSegment, Waypoint};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpxError {
    #[error("GPX document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("Track point {index} is missing its {attribute} attribute")]
    MissingCoordinate {
        index: usize,
        attribute: &'static str,
    },

    #[error("Track point {index} has a non-numeric {field}: {value:?}")]
    InvalidNumber {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("Track point {index} has an invalid time {value:?}: {source}")]
    InvalidTime {
        index: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Parse GPX bytes into a [`TrackDocument`].
pub fn parse_gpx(bytes: &[u8]) -> Result<TrackDocument, GpxError> {
    let text = std::str::from_utf8(bytes)?;
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut parser = GpxParser::default();
    loop {
        let event = reader.read_event().map_err(|err| GpxError::Xml {
            position: reader.buffer_position(),
            message: err.to_string(),
        })?;

        match event {
            Event::Start(start) => parser.open(&start)?,
            Event::Empty(start) => {
                parser.open(&start)?;
                parser.close()?;
            }
            Event::Text(content) => {
                let unescaped = content.unescape().map_err(|err| GpxError::Xml {
                    position: reader.buffer_position(),
                    message: err.to_string(),
                })?;
                parser.text.push_str(&unescaped);
            }
            Event::CData(content) => {
                parser.text.push_str(&String::from_utf8_lossy(&content));
            }
            Event::End(_) => parser.close()?,
            Event::Eof => break,
            _ => {}
        }
    }

    tracing::debug!(
        tracks = parser.document.tracks.len(),
        points = parser.point_count,
        "parsed GPX document"
    );
    Ok(parser.document)
}

#[derive(Debug)]
struct OpenElement {
    local: String,
    qualified: String,
}

#[derive(Debug, Default)]
struct GpxParser {
    document: TrackDocument,
    path: Vec<OpenElement>,
    point: Option<Waypoint>,
    /// Depth of the `<extensions>` element of the current point, when inside one.
    extensions_depth: Option<usize>,
    text: String,
    point_count: usize,
}

impl GpxParser {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), GpxError> {
        let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let qualified = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        self.text.clear();

        if self.point.is_some() {
            if local == "extensions" && self.extensions_depth.is_none() {
                self.extensions_depth = Some(self.path.len());
            }
        } else {
            match local.as_str() {
                "trk" => self.document.tracks.push(Track::default()),
                "trkseg" => self.current_track().segments.push(TrackSegment::default()),
                "trkpt" => self.point = Some(self.point_from_attributes(start)?),
                _ => {}
            }
        }

        self.path.push(OpenElement { local, qualified });
        Ok(())
    }

    fn close(&mut self) -> Result<(), GpxError> {
        let Some(element) = self.path.pop() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.text);
        let parent = self.path.last().map(|open| open.local.clone());

        if let Some(depth) = self.extensions_depth {
            if self.path.len() == depth {
                self.extensions_depth = None;
            } else if !text.is_empty() {
                if let Some(point) = self.point.as_mut() {
                    point.extensions.push((element.qualified, text));
                }
            }
            return Ok(());
        }

        match (element.local.as_str(), parent.as_deref()) {
            ("trkpt", _) => {
                if let Some(point) = self.point.take() {
                    self.current_segment().points.push(point);
                    self.point_count += 1;
                }
            }
            ("ele", Some("trkpt")) => {
                let index = self.point_count;
                if let Some(point) = self.point.as_mut() {
                    point.elevation = Some(parse_number(&text, index, "ele")?);
                }
            }
            ("time", Some("trkpt")) => {
                let index = self.point_count;
                if let Some(point) = self.point.as_mut() {
                    point.time = Some(parse_time(&text, index)?);
                }
            }
            ("name", Some("trk")) => {
                if !text.is_empty() {
                    self.current_track().name = Some(text);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn point_from_attributes(&self, start: &BytesStart<'_>) -> Result<Waypoint, GpxError> {
        let index = self.point_count;
        let mut latitude = None;
        let mut longitude = None;

        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| GpxError::Xml {
                position: 0,
                message: err.to_string(),
            })?;
            let value = attribute.unescape_value().map_err(|err| GpxError::Xml {
                position: 0,
                message: err.to_string(),
            })?;
            match attribute.key.local_name().as_ref() {
                b"lat" => latitude = Some(parse_number(&value, index, "lat")?),
                b"lon" => longitude = Some(parse_number(&value, index, "lon")?),
                _ => {}
            }
        }

        let latitude = latitude.ok_or(GpxError::MissingCoordinate {
            index,
            attribute: "lat",
        })?;
        let longitude = longitude.ok_or(GpxError::MissingCoordinate {
            index,
            attribute: "lon",
        })?;
        Ok(Waypoint::new(latitude, longitude))
    }

    fn current_track(&mut self) -> &mut Track {
        if self.document.tracks.is_empty() {
            self.document.tracks.push(Track::default());
        }
        let last = self.document.tracks.len() - 1;
        &mut self.document.tracks[last]
    }

    fn current_segment(&mut self) -> &mut TrackSegment {
        let track = self.current_track();
        if track.segments.is_empty() {
            track.segments.push(TrackSegment::default());
        }
        let last = track.segments.len() - 1;
        &mut track.segments[last]
    }
}

fn parse_number(raw: &str, index: usize, field: &'static str) -> Result<f64, GpxError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| GpxError::InvalidNumber {
            index,
            field,
            value: raw.to_string(),
        })
}

fn parse_time(raw: &str, index: usize) -> Result<DateTime<Utc>, GpxError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|source| GpxError::InvalidTime {
            index,
            value: raw.to_string(),
            source,
        })
}
