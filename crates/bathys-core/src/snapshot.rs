//! Snapshots of derived electrical state.
//!
//! A [`GridSnapshot`] captures every field propagation writes (fault flags,
//! paths, segment loads, cached power) in grid insertion order. Two
//! snapshots encode to the same bytes exactly when the electrical state is
//! identical, which is what idempotence checks and desync debugging compare.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::grid::PowerGrid;
use crate::id::SegmentId;
use crate::junction::FaultFlags;
use crate::segment::SegmentFaults;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionSnapshot {
    pub name: String,
    pub faults: FaultFlags,
    pub powered: bool,
    /// Names of the segments on the memoized path, source first.
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSnapshot {
    pub name: String,
    pub level: Fixed64,
    pub faults: SegmentFaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub junctions: Vec<JunctionSnapshot>,
    pub segments: Vec<SegmentSnapshot>,
}

impl GridSnapshot {
    pub fn capture(grid: &PowerGrid) -> Self {
        let segment_name = |id: SegmentId| grid.segment(id).map(|s| s.name().to_string());
        let junctions = grid
            .junctions()
            .map(|(_, j)| JunctionSnapshot {
                name: j.name().to_string(),
                faults: j.faults(),
                powered: j.has_power(),
                path: j
                    .path_to_source_segments()
                    .into_iter()
                    .filter_map(&segment_name)
                    .collect(),
            })
            .collect();
        let segments = grid
            .segments()
            .map(|(_, s)| SegmentSnapshot {
                name: s.name().to_string(),
                level: s.power_level(),
                faults: s.faults(),
            })
            .collect();
        Self {
            junctions,
            segments,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bitcode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SnapshotError> {
        bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))
    }

    /// FNV-1a over the snapshot's fields, for cheap per-tick comparison.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = StateHash::new();
        for j in &self.junctions {
            hasher.write(j.name.as_bytes());
            let f = j.faults;
            hasher.write(&[
                f.shorted as u8,
                f.overenergized as u8,
                f.under_powered as u8,
                f.shutdown as u8,
                j.powered as u8,
            ]);
            for seg in &j.path {
                hasher.write(seg.as_bytes());
            }
        }
        for s in &self.segments {
            hasher.write(s.name.as_bytes());
            hasher.write(&s.level.to_bits().to_le_bytes());
            let f = s.faults;
            hasher.write(&[f.shorted as u8, f.overenergized as u8, f.under_powered as u8]);
        }
        hasher.0
    }
}

// ---------------------------------------------------------------------------
// FNV-1a
// ---------------------------------------------------------------------------

struct StateHash(u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }
}
