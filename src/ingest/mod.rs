//! Readers that turn track files into a [`TrackDocument`](crate::codec::TrackDocument).

pub mod gpx;

pub use gpx::{GpxError, parse_gpx};
