//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::fixed::Fixed64;
use crate::grid::PowerGrid;
use crate::id::{JunctionId, SegmentId};
use crate::junction::{Junction, Side};

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Wiring
// ===========================================================================

/// Connect `a`'s next port (right side) to `b`'s next port (left side).
pub fn link(grid: &mut PowerGrid, name: &str, a: JunctionId, b: JunctionId) -> SegmentId {
    grid.connect(name, (a, Side::Right, 0), (b, Side::Left, 0))
        .expect("test wiring must respect port limits")
}

pub fn add(grid: &mut PowerGrid, junction: Junction) -> JunctionId {
    grid.add_junction(junction)
        .expect("test junction names must be unique")
}

// ===========================================================================
// Canonical topologies
// ===========================================================================

/// `SOURCE -SegA- SINK1 -SegB- SINK2` with every port enabled.
pub struct SinkChain {
    pub grid: PowerGrid,
    pub source: JunctionId,
    pub sink1: JunctionId,
    pub sink2: JunctionId,
    pub seg_a: SegmentId,
    pub seg_b: SegmentId,
}

impl SinkChain {
    pub fn build(available: Fixed64, usage1: Fixed64, usage2: Fixed64) -> Self {
        let mut grid = PowerGrid::new();
        let source = add(&mut grid, Junction::feeder("SOURCE", available));
        let sink1 = add(&mut grid, Junction::load("SINK1", usage1));
        let sink2 = add(&mut grid, Junction::load("SINK2", usage2));
        let seg_a = link(&mut grid, "SegA", source, sink1);
        let seg_b = link(&mut grid, "SegB", sink1, sink2);
        Self {
            grid,
            source,
            sink1,
            sink2,
            seg_a,
            seg_b,
        }
    }
}

/// A generator feeding `count` loads of `usage` each off one bus.
pub fn star_grid(capacity: Fixed64, count: usize, usage: Fixed64) -> (PowerGrid, JunctionId, Vec<JunctionId>) {
    let mut grid = PowerGrid::new();
    let source = add(&mut grid, Junction::feeder("GEN", capacity));
    let bus = add(&mut grid, Junction::bus("BUS"));
    link(&mut grid, "GEN-BUS", source, bus);
    let loads = (0..count)
        .map(|i| {
            let load = add(&mut grid, Junction::load(format!("LOAD{i}"), usage));
            link(&mut grid, &format!("BUS-LOAD{i}"), bus, load);
            load
        })
        .collect();
    (grid, source, loads)
}

/// A ladder of `rungs` bus pairs fed from one generator at the top.
///
/// Each rung links left and right rails and hangs one load, so the graph is
/// full of cycles. Used by benchmarks and traversal tests.
pub fn ladder_grid(rungs: usize, capacity: Fixed64, usage: Fixed64) -> PowerGrid {
    let mut grid = PowerGrid::new();
    let source = add(&mut grid, Junction::feeder("GEN", capacity));
    let mut prev: Option<(JunctionId, JunctionId)> = None;
    for i in 0..rungs {
        let left = add(&mut grid, Junction::bus(format!("L{i}")));
        let right = add(&mut grid, Junction::bus(format!("R{i}")));
        let load = add(&mut grid, Junction::load(format!("X{i}"), usage));
        link(&mut grid, &format!("rung{i}"), left, right);
        link(&mut grid, &format!("tap{i}"), right, load);
        match prev {
            None => {
                link(&mut grid, "feed", source, left);
            }
            Some((pl, pr)) => {
                link(&mut grid, &format!("lrail{i}"), pl, left);
                link(&mut grid, &format!("rrail{i}"), pr, right);
            }
        }
        prev = Some((left, right));
    }
    grid
}
