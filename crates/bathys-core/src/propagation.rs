//! Power propagation for a [`PowerGrid`].
//!
//! [`propagate_power`] recomputes every derived electrical field from the
//! topology, the enabled-port state and each junction's usage and
//! availability. It keeps no state between calls, so running it twice on
//! an unchanged grid produces identical results.
//!
//! # Passes
//!
//! 1. **Reset** -- clear segment levels, fault flags, paths and cached power.
//! 2. **Short containment** -- flood out from every `Shorted` segment; reached
//!    junctions become shorted and shut down, traversed segments shorted.
//! 3. **Source conflicts** -- a live source that can reach another source
//!    shuts down, and its subnet is marked overenergized.
//! 4. **Path memoization** -- breadth-first from every live source with
//!    capacity; each junction keeps the path with the fewest hops. Ties keep
//!    the path found first, i.e. from the source added to the grid first.
//! 5. **Load accumulation** -- every sink adds its usage to each segment on
//!    its path; a charging source adds its charging draw when its path ends
//!    on its charging segment.
//! 6. **Settle** -- segments no path touched carry zero.
//! 7. **Overload** -- a source whose connected load exceeds its capacity
//!    shuts down; its subnet is marked under-powered and carries nothing.
//! 8. **Publish** -- cache `has_power`, charging feed and supplied totals on
//!    each junction for the tick that follows.
//!
//! # Traversal rules
//!
//! Every flood and search owns its visited set. Disabled ports and `Opened`
//! segments are impassable. Path memoization additionally crosses only
//! `Normal` segments. Ids that no longer resolve are skipped, which leaves
//! whatever is only reachable through them unpowered.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace, warn};

use crate::fixed::{Fixed64, fixed64_to_f64};
use crate::grid::PowerGrid;
use crate::id::{JunctionId, PathStep, SegmentId};
use crate::junction::Junction;
use crate::segment::{Segment, SegmentStatus};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Recompute fault flags, paths and segment loads for the whole grid.
pub fn propagate_power(grid: &mut PowerGrid) {
    reset(grid);
    contain_shorts(grid);
    detect_source_conflicts(grid);
    memoize_paths(grid);
    accumulate_load(grid);
    settle_levels(grid);
    let supplied = detect_overloads(grid);
    publish(grid, &supplied);
    trace!(
        junctions = grid.junction_count(),
        segments = grid.segment_count(),
        "power propagation complete"
    );
}

// ---------------------------------------------------------------------------
// Flood fill
// ---------------------------------------------------------------------------

/// Whether a flood may enter a junction through that junction's charging port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Any,
    SkipChargingPorts,
}

/// Depth-first flood over enabled ports and non-opened segments.
///
/// Segments are recorded when crossed from a reached junction, even if the
/// far port turns out to be disabled.
struct Flood<'g> {
    grid: &'g PowerGrid,
    entry: Entry,
    visited: HashSet<JunctionId>,
    seen: HashSet<SegmentId>,
    junctions: Vec<JunctionId>,
    segments: Vec<SegmentId>,
}

impl<'g> Flood<'g> {
    fn new(grid: &'g PowerGrid, entry: Entry) -> Self {
        Self {
            grid,
            entry,
            visited: HashSet::new(),
            seen: HashSet::new(),
            junctions: Vec::new(),
            segments: Vec::new(),
        }
    }

    fn run(&mut self, origin: JunctionId, arrived: Option<SegmentId>) {
        let mut stack = vec![(origin, arrived)];
        while let Some((id, from)) = stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            let Some(junction) = self.grid.junction(id) else {
                debug!(?id, "flood reached a missing junction, skipping");
                continue;
            };
            self.junctions.push(id);

            for seg_id in junction.connected_segments(from) {
                let Some(segment) = self.grid.segment(seg_id) else {
                    debug!(junction = junction.name(), "port bound to a missing segment, skipping");
                    continue;
                };
                if segment.status() == SegmentStatus::Opened {
                    continue;
                }
                if self.seen.insert(seg_id) {
                    self.segments.push(seg_id);
                }
                let Some((next_id, next)) = far_side(self.grid, id, seg_id, segment) else {
                    continue;
                };
                let port = far_port(segment, id);
                if !next.is_port_enabled(port) {
                    continue;
                }
                if self.entry == Entry::SkipChargingPorts && next.is_charging_port(port) {
                    continue;
                }
                stack.push((next_id, Some(seg_id)));
            }
        }
    }
}

/// Resolve the junction across `segment` from `from`. Dangling endpoints and
/// endpoints whose port is not bound back to the segment yield `None`.
fn far_side<'g>(
    grid: &'g PowerGrid,
    from: JunctionId,
    seg_id: SegmentId,
    segment: &Segment,
) -> Option<(JunctionId, &'g Junction)> {
    let Some(end) = segment.other_end(from) else {
        debug!(segment = segment.name(), "segment does not touch the junction it was reached from");
        return None;
    };
    let Some(next) = grid.junction(end.junction) else {
        debug!(segment = segment.name(), "segment endpoint is dangling");
        return None;
    };
    let bound = next
        .ports()
        .get(end.port)
        .and_then(|p| p.segment)
        .is_some_and(|s| s == seg_id);
    if !bound {
        debug!(
            segment = segment.name(),
            junction = next.name(),
            "segment endpoint port is not bound to the segment"
        );
        return None;
    }
    Some((end.junction, next))
}

fn far_port(segment: &Segment, from: JunctionId) -> usize {
    segment.other_end(from).map_or(usize::MAX, |end| end.port)
}

fn live_sources(grid: &PowerGrid) -> Vec<JunctionId> {
    grid.junctions()
        .filter(|(_, j)| j.is_power_source() && !j.is_shutdown())
        .map(|(id, _)| id)
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 1: reset
// ---------------------------------------------------------------------------

fn reset(grid: &mut PowerGrid) {
    let segments = grid.segment_ids().to_vec();
    for id in segments {
        if let Some(segment) = grid.segment_entry(id) {
            segment.reset();
        }
    }
    let junctions = grid.junction_ids().to_vec();
    for id in junctions {
        if let Some(junction) = grid.junction_entry(id) {
            junction.reset_derived();
        }
    }
}

// ---------------------------------------------------------------------------
// Pass 2: short containment
// ---------------------------------------------------------------------------

fn contain_shorts(grid: &mut PowerGrid) {
    let shorted: Vec<SegmentId> = grid
        .segments()
        .filter(|(_, s)| s.status() == SegmentStatus::Shorted)
        .map(|(id, _)| id)
        .collect();

    for seed in shorted {
        let Some(segment) = grid.segment(seed) else {
            continue;
        };
        let (a, b) = segment.endpoints();
        let mut flood = Flood::new(grid, Entry::Any);
        for end in [a, b] {
            let enabled = grid
                .junction(end.junction)
                .is_some_and(|j| j.is_port_enabled(end.port));
            if enabled {
                flood.run(end.junction, Some(seed));
            }
        }
        let Flood {
            junctions, segments, ..
        } = flood;

        warn!(
            segment = grid.segment(seed).map_or("?", Segment::name),
            junctions = junctions.len(),
            "short circuit isolated"
        );
        for id in std::iter::once(seed).chain(segments) {
            if let Some(segment) = grid.segment_entry(id) {
                segment.faults_mut().shorted = true;
            }
        }
        for id in junctions {
            if let Some(junction) = grid.junction_entry(id) {
                let faults = junction.faults_mut();
                faults.shorted = true;
                faults.shutdown = true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pass 3: source conflicts
// ---------------------------------------------------------------------------

fn detect_source_conflicts(grid: &mut PowerGrid) {
    for origin in live_sources(grid) {
        let mut flood = Flood::new(grid, Entry::SkipChargingPorts);
        flood.run(origin, None);
        let conflict = flood.junctions.iter().any(|&other| {
            other != origin && grid.junction(other).is_some_and(Junction::is_power_source)
        });
        if !conflict {
            continue;
        }
        let Flood {
            junctions, segments, ..
        } = flood;

        if let Some(source) = grid.junction_entry(origin) {
            warn!(source = source.name(), "second source on the same subnet, shutting down");
            let faults = source.faults_mut();
            faults.shutdown = true;
            faults.overenergized = true;
        }
        for id in junctions {
            if let Some(junction) = grid.junction_entry(id) {
                junction.faults_mut().overenergized = true;
            }
        }
        for id in segments {
            if let Some(segment) = grid.segment_entry(id) {
                segment.faults_mut().overenergized = true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pass 4: path memoization
// ---------------------------------------------------------------------------

fn memoize_paths(grid: &mut PowerGrid) {
    let feeding: Vec<JunctionId> = live_sources(grid)
        .into_iter()
        .filter(|&id| {
            grid.junction(id)
                .is_some_and(|j| j.power_available() > Fixed64::ZERO)
        })
        .collect();

    for origin in feeding {
        let found = shortest_paths_from(grid, origin);
        for (target, path) in found {
            if let Some(junction) = grid.junction_entry(target) {
                junction.offer_path(&path);
            }
        }
    }
}

/// Fewest-hop path from `origin` to every junction it can feed, in discovery
/// order. Other sources are recorded when reached but never fed through.
fn shortest_paths_from(grid: &PowerGrid, origin: JunctionId) -> Vec<(JunctionId, Vec<PathStep>)> {
    let mut visited = HashSet::from([origin]);
    let mut queue = VecDeque::from([(origin, None, Vec::new())]);
    let mut found = Vec::new();

    while let Some((id, from, path)) = queue.pop_front() {
        let Some(junction) = grid.junction(id) else {
            continue;
        };
        if id != origin && junction.is_power_source() {
            continue;
        }
        for seg_id in junction.connected_segments(from) {
            let Some(segment) = grid.segment(seg_id) else {
                continue;
            };
            if segment.status() != SegmentStatus::Normal {
                continue;
            }
            let Some((next_id, next)) = far_side(grid, id, seg_id, segment) else {
                continue;
            };
            let faults = next.faults();
            if !next.is_port_enabled(far_port(segment, id))
                || faults.shutdown
                || faults.shorted
                || faults.overenergized
            {
                continue;
            }
            if !visited.insert(next_id) {
                continue;
            }
            let mut next_path: Vec<PathStep> = path.clone();
            next_path.push(PathStep {
                segment: seg_id,
                junction: next_id,
            });
            found.push((next_id, next_path.clone()));
            queue.push_back((next_id, Some(seg_id), next_path));
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Pass 5: load accumulation
// ---------------------------------------------------------------------------

fn accumulate_load(grid: &mut PowerGrid) {
    let mut draws: Vec<(Fixed64, Vec<SegmentId>)> = Vec::new();
    for (_, junction) in grid.junctions() {
        let Some(path) = junction.path_to_source() else {
            continue;
        };
        if junction.is_power_source() {
            let Some(charging) = junction.charging_segment() else {
                continue;
            };
            if path.last().map(|step| step.segment) != Some(charging) {
                continue;
            }
        }
        let segments = path.iter().map(|step| step.segment).collect();
        draws.push((junction.current_power_usage(), segments));
    }

    for (usage, segments) in draws {
        for id in segments {
            if let Some(segment) = grid.segment_entry(id) {
                segment.add_load(usage);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pass 6: settle
// ---------------------------------------------------------------------------

fn settle_levels(grid: &mut PowerGrid) {
    let segments = grid.segment_ids().to_vec();
    for id in segments {
        if let Some(segment) = grid.segment_entry(id) {
            segment.settle();
        }
    }
}

// ---------------------------------------------------------------------------
// Pass 7: overload
// ---------------------------------------------------------------------------

/// Returns the load carried by every source that stayed up.
fn detect_overloads(grid: &mut PowerGrid) -> HashMap<JunctionId, Fixed64> {
    let mut supplied = HashMap::new();

    for origin in live_sources(grid) {
        let Some(source) = grid.junction(origin) else {
            continue;
        };
        let demand = source
            .connected_segments(None)
            .into_iter()
            .filter_map(|id| grid.segment(id))
            .filter(|s| s.status() == SegmentStatus::Normal)
            .fold(Fixed64::ZERO, |acc, s| acc.saturating_add(s.power_level()));
        let capacity = source.power_available();

        if demand <= Fixed64::ZERO || demand <= capacity {
            supplied.insert(origin, demand);
            continue;
        }

        warn!(
            source = source.name(),
            demand = fixed64_to_f64(demand),
            capacity = fixed64_to_f64(capacity),
            "source overloaded, shutting down"
        );
        let mut flood = Flood::new(grid, Entry::SkipChargingPorts);
        flood.run(origin, None);
        let Flood {
            junctions, segments, ..
        } = flood;

        if let Some(source) = grid.junction_entry(origin) {
            source.faults_mut().shutdown = true;
        }
        for id in junctions.into_iter().filter(|&id| id != origin) {
            if let Some(junction) = grid.junction_entry(id) {
                junction.faults_mut().under_powered = true;
            }
        }
        for id in segments {
            if let Some(segment) = grid.segment_entry(id) {
                segment.faults_mut().under_powered = true;
                segment.force_level(Fixed64::ZERO);
            }
        }
    }
    supplied
}

// ---------------------------------------------------------------------------
// Pass 8: publish
// ---------------------------------------------------------------------------

fn publish(grid: &mut PowerGrid, supplied: &HashMap<JunctionId, Fixed64>) {
    let cached: Vec<(JunctionId, bool, bool)> = grid
        .junctions()
        .map(|(id, junction)| {
            let charge_fed = junction
                .charging_segment()
                .and_then(|s| grid.segment(s))
                .is_some_and(|s| s.power_level() > Fixed64::ZERO && !s.is_under_powered());
            (id, grid.has_power(id), charge_fed)
        })
        .collect();

    for (id, powered, charge_fed) in cached {
        let total = supplied.get(&id).copied().unwrap_or(Fixed64::ZERO);
        if let Some(junction) = grid.junction_entry(id) {
            junction.publish(powered, charge_fed, total);
        }
    }
}
