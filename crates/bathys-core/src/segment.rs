use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::id::{Endpoint, JunctionId};

/// Physical condition of a wire, set by the host (damage, breakers).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentStatus {
    #[default]
    Normal,
    /// A fault that takes down everything electrically connected to it.
    Shorted,
    /// Cut; nothing crosses it.
    Opened,
}

/// Derived fault flags, cleared at the start of every propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentFaults {
    pub shorted: bool,
    pub overenergized: bool,
    pub under_powered: bool,
}

/// A wire between two junction ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    name: String,
    a: Endpoint,
    b: Endpoint,
    status: SegmentStatus,
    /// Load routed through this segment this tick. `None` until the first
    /// sink on a path touches it.
    level: Option<Fixed64>,
    faults: SegmentFaults,
}

impl Segment {
    pub fn new(name: impl Into<String>, a: Endpoint, b: Endpoint) -> Self {
        Self {
            name: name.into(),
            a,
            b,
            status: SegmentStatus::Normal,
            level: None,
            faults: SegmentFaults::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        (self.a, self.b)
    }

    /// The endpoint opposite `junction`. A segment looping back onto the same
    /// junction reports its `b` end.
    pub fn other_end(&self, junction: JunctionId) -> Option<Endpoint> {
        if self.a.junction == junction {
            Some(self.b)
        } else if self.b.junction == junction {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub fn set_status(&mut self, status: SegmentStatus) {
        self.status = status;
    }

    /// Load carried after the last propagation; zero when untouched.
    pub fn power_level(&self) -> Fixed64 {
        self.level.unwrap_or(Fixed64::ZERO)
    }

    pub fn faults(&self) -> SegmentFaults {
        self.faults
    }

    pub fn is_shorted(&self) -> bool {
        self.faults.shorted
    }

    pub fn is_overenergized(&self) -> bool {
        self.faults.overenergized
    }

    pub fn is_under_powered(&self) -> bool {
        self.faults.under_powered
    }

    // -- Propagation-side mutators ------------------------------------------

    pub(crate) fn reset(&mut self) {
        self.level = None;
        self.faults = SegmentFaults::default();
    }

    /// Saturates at `Fixed64::MAX`, which still exceeds any capacity.
    pub(crate) fn add_load(&mut self, load: Fixed64) {
        self.level = Some(match self.level {
            Some(current) => current.saturating_add(load),
            None => load,
        });
    }

    /// Untouched segments settle at zero.
    pub(crate) fn settle(&mut self) {
        self.level.get_or_insert(Fixed64::ZERO);
    }

    pub(crate) fn force_level(&mut self, level: Fixed64) {
        self.level = Some(level);
    }

    pub(crate) fn faults_mut(&mut self) -> &mut SegmentFaults {
        &mut self.faults
    }
}
