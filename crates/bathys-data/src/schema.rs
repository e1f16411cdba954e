//! Serde data file structs for boat layouts.
//!
//! A layout names every junction and every segment between them, plus an
//! optional list of command lines run once the grid is built. Layouts are
//! deserialized from RON, JSON, or TOML and resolved into a
//! [`bathys_core::grid::PowerGrid`] by the loader.

use bathys_core::junction::Side;
use bathys_core::segment::SegmentStatus;
use serde::Deserialize;

// ===========================================================================
// Junctions
// ===========================================================================

/// The kind of junction to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindData {
    Bus,
    Selector,
    SingleThrow,
    DoubleThrow,
    Feeder,
    Battery,
    Load,
    Consumer,
}

/// A command part attached to a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartData {
    OnOff,
    ExtendRetract,
    OpenClose,
}

/// A junction definition in a layout file.
#[derive(Debug, Clone, Deserialize)]
pub struct JunctionData {
    pub name: String,
    pub kind: KindData,
    /// Supply for feeders (required) and batteries (overrides tuning).
    #[serde(default)]
    pub capacity: Option<f64>,
    /// Draw for loads (required) and consumers (overrides active usage).
    #[serde(default)]
    pub usage: Option<f64>,
    #[serde(default)]
    pub parts: Vec<PartData>,
}

// ===========================================================================
// Segments
// ===========================================================================

/// One end of a segment: the junction it plugs into and where on its box.
#[derive(Debug, Clone, Deserialize)]
pub struct EndData {
    pub junction: String,
    #[serde(default)]
    pub side: Side,
    #[serde(default)]
    pub offset: i32,
}

/// A segment definition in a layout file.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentData {
    pub name: String,
    pub from: EndData,
    pub to: EndData,
    #[serde(default)]
    pub status: SegmentStatus,
}

// ===========================================================================
// Layout
// ===========================================================================

/// A whole boat: junctions in insertion order, then segments, then setup.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutData {
    pub junctions: Vec<JunctionData>,
    #[serde(default)]
    pub segments: Vec<SegmentData>,
    /// Command lines (`Target.Aspect Command Value`) applied after building.
    #[serde(default)]
    pub setup: Vec<String>,
}
