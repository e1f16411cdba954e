use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::fixed::Fixed64;
use crate::id::{Endpoint, JunctionId, SegmentId};
use crate::junction::{Junction, Side};
use crate::segment::{Segment, SegmentStatus};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while building a grid.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("junction name already in use: {0}")]
    DuplicateName(String),
    #[error("junction not found: {0:?}")]
    UnknownJunction(JunctionId),
    #[error("junction {name} refused another port (limit reached)")]
    PortLimit { name: String },
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// One end of a connection request: junction, diagram side and offset.
pub type PortSpec = (JunctionId, Side, i32);

/// Arena owning every junction and segment for the session.
///
/// Iteration goes through the insertion-ordered id lists, so every pass of
/// the propagation engine visits junctions in the order they were added.
/// Topology is fixed once built; at runtime only port enablement, segment
/// status and per-junction parameters change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerGrid {
    junctions: SlotMap<JunctionId, Junction>,
    segments: SlotMap<SegmentId, Segment>,
    junction_order: Vec<JunctionId>,
    segment_order: Vec<SegmentId>,
    names: HashMap<String, JunctionId>,
}

impl PowerGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a junction. Names must be unique within the grid.
    pub fn add_junction(&mut self, junction: Junction) -> Result<JunctionId, GridError> {
        let name = junction.name().to_string();
        if self.names.contains_key(&name) {
            return Err(GridError::DuplicateName(name));
        }
        let id = self.junctions.insert(junction);
        self.junction_order.push(id);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Create a segment between two junctions and bind a new port on each.
    /// Nothing is inserted if either junction would exceed its port limit.
    pub fn connect(
        &mut self,
        name: impl Into<String>,
        a: PortSpec,
        b: PortSpec,
    ) -> Result<SegmentId, GridError> {
        let needed = if a.0 == b.0 { 2 } else { 1 };
        for (junction, _, _) in [a, b] {
            let Some(target) = self.junctions.get(junction) else {
                return Err(GridError::UnknownJunction(junction));
            };
            if !target.has_port_capacity(needed) {
                return Err(GridError::PortLimit {
                    name: target.name().to_string(),
                });
            }
        }
        let port_a = self.junctions[a.0].port_count();
        let port_b = if a.0 == b.0 {
            port_a + 1
        } else {
            self.junctions[b.0].port_count()
        };
        let id = self.segments.insert(Segment::new(
            name,
            Endpoint::new(a.0, port_a),
            Endpoint::new(b.0, port_b),
        ));
        self.segment_order.push(id);
        for (junction, side, offset) in [a, b] {
            let bound = self.junctions[junction].add_port(id, side, offset);
            debug_assert!(bound, "port capacity was checked before inserting");
        }
        Ok(id)
    }

    /// Insert a pre-built segment without binding ports. Used to describe
    /// topologies whose ports were bound separately.
    pub fn insert_segment(&mut self, segment: Segment) -> SegmentId {
        let id = self.segments.insert(segment);
        self.segment_order.push(id);
        id
    }

    // -- Lookup ---------------------------------------------------------------

    pub fn junction(&self, id: JunctionId) -> Option<&Junction> {
        self.junctions.get(id)
    }

    pub fn junction_mut(&mut self, id: JunctionId) -> Option<&mut Junction> {
        self.junctions.get_mut(id)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(id)
    }

    pub fn junction_id(&self, name: &str) -> Option<JunctionId> {
        self.names.get(name).copied()
    }

    pub fn junction_by_name(&self, name: &str) -> Option<&Junction> {
        self.junction_id(name).and_then(|id| self.junctions.get(id))
    }

    pub fn junction_by_name_mut(&mut self, name: &str) -> Option<&mut Junction> {
        let id = self.junction_id(name)?;
        self.junctions.get_mut(id)
    }

    /// Junction ids in insertion order.
    pub fn junction_ids(&self) -> &[JunctionId] {
        &self.junction_order
    }

    /// Segment ids in insertion order.
    pub fn segment_ids(&self) -> &[SegmentId] {
        &self.segment_order
    }

    pub fn junctions(&self) -> impl Iterator<Item = (JunctionId, &Junction)> {
        self.junction_order
            .iter()
            .filter_map(|&id| self.junctions.get(id).map(|j| (id, j)))
    }

    pub fn segments(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.segment_order
            .iter()
            .filter_map(|&id| self.segments.get(id).map(|s| (id, s)))
    }

    pub fn junction_count(&self) -> usize {
        self.junctions.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    // -- Runtime state --------------------------------------------------------

    /// Set a segment's physical status. Returns `false` for an unknown id.
    pub fn set_segment_status(&mut self, id: SegmentId, status: SegmentStatus) -> bool {
        match self.segments.get_mut(id) {
            Some(segment) => {
                segment.set_status(status);
                true
            }
            None => false,
        }
    }

    /// Load on a segment after the last propagation; zero for unknown ids.
    pub fn power_level(&self, id: SegmentId) -> Fixed64 {
        self.segments
            .get(id)
            .map_or(Fixed64::ZERO, Segment::power_level)
    }

    /// `HasPower` computed from the current segment levels.
    ///
    /// A junction has power when it is not shut down and one of its live
    /// ports (the selected one on a multi-select junction) carries a nonzero
    /// load. A source with capacity and at least one enabled port counts as
    /// powered while not shut down.
    pub fn has_power(&self, id: JunctionId) -> bool {
        let Some(junction) = self.junctions.get(id) else {
            return false;
        };
        if junction.is_shutdown() {
            return false;
        }
        if junction.is_power_source() && junction.power_available() > Fixed64::ZERO {
            return junction.enabled_port_count() > 0;
        }
        let live_port = |index: usize| {
            junction
                .ports()
                .get(index)
                .filter(|p| p.enabled)
                .and_then(|p| p.segment)
                .is_some_and(|s| self.power_level(s) > Fixed64::ZERO)
        };
        if junction.capabilities().multi_select {
            junction.selected_port().is_some_and(live_port)
        } else {
            (0..junction.port_count()).any(live_port)
        }
    }

    // -- Crate-internal access for the propagation passes -------------------

    pub(crate) fn junction_entry(&mut self, id: JunctionId) -> Option<&mut Junction> {
        self.junctions.get_mut(id)
    }

    pub(crate) fn segment_entry(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(id)
    }
}
