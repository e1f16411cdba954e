use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a junction (switch, bus, pump, battery) in the power grid.
    pub struct JunctionId;

    /// Identifies a segment (wire) between two junction ports.
    pub struct SegmentId;
}

/// One end of a segment: the junction it attaches to and the port index on
/// that junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub junction: JunctionId,
    pub port: usize,
}

impl Endpoint {
    pub fn new(junction: JunctionId, port: usize) -> Self {
        Self { junction, port }
    }
}

/// One hop of a memoized path to a source: the segment crossed and the
/// junction reached through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub segment: SegmentId,
    pub junction: JunctionId,
}
