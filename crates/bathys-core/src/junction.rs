//! Junctions: the nodes of the power grid.
//!
//! A junction is one record configured by capability flags, a load profile,
//! an optional supply and an ordered list of command [`Part`]s. Switches,
//! buses, pumps and batteries differ only in that configuration.
//!
//! # Ports
//!
//! Ports are ordered connection points, each optionally bound to one
//! [`SegmentId`]. A plain junction enables any subset of its ports. A
//! multi-select junction keeps at most one port enabled: selecting a port
//! disables every other.
//!
//! # Derived state
//!
//! Fault flags, the memoized path to a source, the cached `powered` flag and
//! the supplied total are written by [`crate::propagation::propagate_power`]
//! and cleared at the start of every run.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{Aspect, CommandHandler, CommandResult, Request, Verb, format_flag};
use crate::fixed::{Fixed64, format_fixed};
use crate::id::{JunctionId, PathStep, SegmentId};
use crate::part::Part;
use crate::tuning::{BatteryTuning, LoadTuning};

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Which edge of the junction's diagram box a port sits on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[default]
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub segment: Option<SegmentId>,
    pub enabled: bool,
    pub side: Side,
    pub offset: i32,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunctionStatus {
    #[default]
    Normal,
    Damaged50,
    Damaged100,
    /// Refuses every configuration command.
    Destroyed,
}

impl JunctionStatus {
    pub fn label(self) -> &'static str {
        match self {
            JunctionStatus::Normal => "NORMAL",
            JunctionStatus::Damaged50 => "DAMAGED50",
            JunctionStatus::Damaged100 => "DAMAGED100",
            JunctionStatus::Destroyed => "DESTROYED",
        }
    }
}

/// Discovery label; behaviour comes from [`Capabilities`] and the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunctionKind {
    Bus,
    Selector,
    SingleThrow,
    DoubleThrow,
    Feeder,
    Battery,
    Load,
    Consumer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub power_source: bool,
    pub multi_select: bool,
    pub chargeable: bool,
}

/// Derived fault flags, cleared at the start of every propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaultFlags {
    pub shorted: bool,
    pub overenergized: bool,
    pub under_powered: bool,
    pub shutdown: bool,
}

// ---------------------------------------------------------------------------
// Power strategies
// ---------------------------------------------------------------------------

/// How much a junction draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PowerProfile {
    /// Switches, buses and sources draw nothing of their own.
    Passive,
    Constant { usage: Fixed64, noise: Fixed64 },
    /// Draw follows the first on/off part: `active` when on, `idle` when off.
    Switched {
        active: Fixed64,
        idle: Fixed64,
        noise: Fixed64,
    },
}

/// What a source can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supply {
    pub capacity: Fixed64,
    /// Draw through the charging port while charging.
    pub charging_draw: Fixed64,
}

/// Stored charge of a battery, as a fraction of full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryCell {
    pub level: Fixed64,
    pub charge_rate: Fixed64,
    pub discharge_rate: Fixed64,
}

// ---------------------------------------------------------------------------
// Junction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    name: String,
    kind: JunctionKind,
    capabilities: Capabilities,
    ports: Vec<Port>,
    port_limit: Option<usize>,
    selected_port: Option<usize>,
    charging_port: Option<usize>,
    status: JunctionStatus,
    profile: PowerProfile,
    supply: Option<Supply>,
    battery: Option<BatteryCell>,
    parts: Vec<Part>,
    notifications: Vec<String>,

    // Derived each propagation.
    faults: FaultFlags,
    path: Option<Vec<PathStep>>,
    powered: bool,
    charge_fed: bool,
    supplied: Fixed64,
}

impl Junction {
    fn with_kind(name: impl Into<String>, kind: JunctionKind, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            kind,
            capabilities,
            ports: Vec::new(),
            port_limit: None,
            selected_port: None,
            charging_port: None,
            status: JunctionStatus::Normal,
            profile: PowerProfile::Passive,
            supply: None,
            battery: None,
            parts: Vec::new(),
            notifications: Vec::new(),
            faults: FaultFlags::default(),
            path: None,
            powered: false,
            charge_fed: false,
            supplied: Fixed64::ZERO,
        }
    }

    /// A distribution bus: any subset of ports enabled, draws nothing.
    pub fn bus(name: impl Into<String>) -> Self {
        Self::with_kind(name, JunctionKind::Bus, Capabilities::default())
    }

    /// A selector switch: exactly one port live at a time.
    pub fn selector(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            JunctionKind::Selector,
            Capabilities {
                multi_select: true,
                ..Capabilities::default()
            },
        )
    }

    /// Single-throw switch: a selector with one port.
    pub fn single_throw(name: impl Into<String>) -> Self {
        let mut j = Self::selector(name).with_port_limit(1);
        j.kind = JunctionKind::SingleThrow;
        j
    }

    /// Double-throw switch: a selector with two ports.
    pub fn double_throw(name: impl Into<String>) -> Self {
        let mut j = Self::selector(name).with_port_limit(2);
        j.kind = JunctionKind::DoubleThrow;
        j
    }

    /// A generator feeding every enabled port.
    pub fn feeder(name: impl Into<String>, capacity: Fixed64) -> Self {
        let mut j = Self::with_kind(
            name,
            JunctionKind::Feeder,
            Capabilities {
                power_source: true,
                ..Capabilities::default()
            },
        );
        j.supply = Some(Supply {
            capacity,
            charging_draw: Fixed64::ZERO,
        });
        j
    }

    /// A battery: a feeder with stored charge and one optional charging port.
    pub fn battery(name: impl Into<String>, tuning: &BatteryTuning) -> Self {
        let mut j = Self::with_kind(
            name,
            JunctionKind::Battery,
            Capabilities {
                power_source: true,
                chargeable: true,
                ..Capabilities::default()
            },
        );
        j.supply = Some(Supply {
            capacity: Fixed64::from_num(tuning.capacity),
            charging_draw: Fixed64::from_num(tuning.charging_draw),
        });
        j.battery = Some(BatteryCell {
            level: Fixed64::from_num(tuning.initial_level),
            charge_rate: Fixed64::from_num(tuning.charge_rate),
            discharge_rate: Fixed64::from_num(tuning.discharge_rate),
        });
        j
    }

    /// A fixed load drawing `usage` through every enabled port's path.
    pub fn load(name: impl Into<String>, usage: Fixed64) -> Self {
        let mut j = Self::with_kind(name, JunctionKind::Load, Capabilities::default());
        j.profile = PowerProfile::Constant {
            usage,
            noise: Fixed64::ZERO,
        };
        j
    }

    /// A switched consumer (pump, fan) selecting one feed, with an on/off part.
    pub fn consumer(name: impl Into<String>, tuning: &LoadTuning) -> Self {
        let mut j = Self::selector(name).with_part(Part::on_off());
        j.kind = JunctionKind::Consumer;
        j.profile = PowerProfile::Switched {
            active: Fixed64::from_num(tuning.active_usage),
            idle: Fixed64::from_num(tuning.idle_usage),
            noise: Fixed64::from_num(tuning.noise),
        };
        j
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_port_limit(mut self, limit: usize) -> Self {
        self.port_limit = Some(limit);
        self
    }

    pub fn with_profile(mut self, profile: PowerProfile) -> Self {
        self.profile = profile;
        self
    }

    // -- Identity and configuration -----------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JunctionKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn status(&self) -> JunctionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: JunctionStatus) {
        self.status = status;
    }

    pub fn profile(&self) -> &PowerProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: PowerProfile) {
        self.profile = profile;
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn battery_level(&self) -> Option<Fixed64> {
        self.battery.as_ref().map(|cell| cell.level)
    }

    pub fn set_battery_level(&mut self, level: Fixed64) {
        if let Some(cell) = self.battery.as_mut() {
            cell.level = level.clamp(Fixed64::ZERO, Fixed64::from_num(1));
        }
    }

    // -- Ports ---------------------------------------------------------------

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Whether `count` more ports fit under the port limit.
    pub fn has_port_capacity(&self, count: usize) -> bool {
        self.port_limit
            .is_none_or(|limit| self.ports.len() + count <= limit)
    }

    /// Append a port bound to `segment`. Returns `false` once the port limit
    /// is reached.
    pub fn add_port(&mut self, segment: SegmentId, side: Side, offset: i32) -> bool {
        if !self.has_port_capacity(1) {
            return false;
        }
        self.ports.push(Port {
            segment: Some(segment),
            enabled: !self.capabilities.multi_select,
            side,
            offset,
        });
        if self.capabilities.multi_select {
            self.set_port_enabled(self.ports.len() - 1, true);
        }
        true
    }

    /// Out-of-range indices are ignored.
    pub fn set_port_enabled(&mut self, port: usize, enabled: bool) {
        if port >= self.ports.len() {
            debug!(junction = self.name.as_str(), port, "port index out of range");
            return;
        }
        if self.capabilities.multi_select {
            if enabled {
                self.select_port(Some(port));
            } else {
                self.ports[port].enabled = false;
                if self.selected_port == Some(port) {
                    self.selected_port = None;
                }
            }
        } else {
            self.ports[port].enabled = enabled;
        }
    }

    pub fn is_port_enabled(&self, port: usize) -> bool {
        self.ports.get(port).is_some_and(|p| p.enabled)
    }

    pub fn enabled_port_count(&self) -> usize {
        self.ports.iter().filter(|p| p.enabled).count()
    }

    pub fn selected_port(&self) -> Option<usize> {
        self.selected_port
    }

    fn select_port(&mut self, port: Option<usize>) {
        for (i, p) in self.ports.iter_mut().enumerate() {
            p.enabled = Some(i) == port;
        }
        self.selected_port = port;
    }

    /// Port index bound to `segment`, if any.
    pub fn port_of(&self, segment: SegmentId) -> Option<usize> {
        self.ports.iter().position(|p| p.segment == Some(segment))
    }

    /// Segments reachable through enabled ports, without `exclude`.
    ///
    /// Arriving through a port that is disabled yields nothing. A chargeable
    /// junction never feeds out through its charging port.
    pub fn connected_segments(&self, exclude: Option<SegmentId>) -> Vec<SegmentId> {
        if let Some(arrived) = exclude {
            if self
                .ports
                .iter()
                .any(|p| p.segment == Some(arrived) && !p.enabled)
            {
                return Vec::new();
            }
        }
        self.ports
            .iter()
            .enumerate()
            .filter(|(i, p)| p.enabled && Some(*i) != self.charging_port)
            .filter_map(|(_, p)| p.segment)
            .filter(|s| Some(*s) != exclude)
            .collect()
    }

    // -- Power collaborator surface ------------------------------------------

    pub fn is_power_source(&self) -> bool {
        self.capabilities.power_source
    }

    pub fn charging_port(&self) -> Option<usize> {
        self.charging_port
    }

    pub fn is_charging_port(&self, port: usize) -> bool {
        self.charging_port == Some(port)
    }

    pub fn is_charging_segment(&self, segment: SegmentId) -> bool {
        self.charging_port
            .and_then(|i| self.ports.get(i))
            .is_some_and(|p| p.segment == Some(segment))
    }

    /// Segment bound to the active charging port.
    pub fn charging_segment(&self) -> Option<SegmentId> {
        self.charging_port
            .and_then(|i| self.ports.get(i))
            .and_then(|p| p.segment)
    }

    /// Capacity this source can deliver right now. Zero for non-sources and
    /// for a drained battery.
    pub fn power_available(&self) -> Fixed64 {
        let Some(supply) = &self.supply else {
            return Fixed64::ZERO;
        };
        match &self.battery {
            Some(cell) if cell.level <= Fixed64::ZERO => Fixed64::ZERO,
            _ => supply.capacity,
        }
    }

    /// Draw this junction puts on its path to a source.
    pub fn current_power_usage(&self) -> Fixed64 {
        if self.faults.shutdown {
            return Fixed64::ZERO;
        }
        if let Some(supply) = &self.supply {
            return if self.charging_port.is_some() {
                supply.charging_draw
            } else {
                Fixed64::ZERO
            };
        }
        match &self.profile {
            PowerProfile::Passive => Fixed64::ZERO,
            PowerProfile::Constant { usage, .. } => *usage,
            PowerProfile::Switched { active, idle, .. } => {
                if self.is_switched_on() { *active } else { *idle }
            }
        }
    }

    pub fn noise_level(&self) -> Fixed64 {
        if self.faults.shutdown {
            return Fixed64::ZERO;
        }
        match &self.profile {
            PowerProfile::Passive => Fixed64::ZERO,
            PowerProfile::Constant { noise, .. } => *noise,
            PowerProfile::Switched { noise, .. } => {
                if self.is_switched_on() { *noise } else { Fixed64::ZERO }
            }
        }
    }

    /// State of the first on/off part; junctions without one count as on.
    pub fn is_switched_on(&self) -> bool {
        self.parts
            .iter()
            .find_map(Part::switched_on)
            .unwrap_or(true)
    }

    // -- Derived state (read side) -------------------------------------------

    pub fn faults(&self) -> FaultFlags {
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

    pub fn is_shutdown(&self) -> bool {
        self.faults.shutdown
    }

    /// `HasPower` as of the last propagation.
    pub fn has_power(&self) -> bool {
        self.powered
    }

    /// Total draw on this source as of the last propagation.
    pub fn supplied(&self) -> Fixed64 {
        self.supplied
    }

    pub fn path_to_source(&self) -> Option<&[PathStep]> {
        self.path.as_deref()
    }

    /// Segments from the feeding source out to this junction.
    pub fn path_to_source_segments(&self) -> Vec<SegmentId> {
        self.path
            .iter()
            .flatten()
            .map(|step| step.segment)
            .collect()
    }

    /// Junctions from the first hop out of the source to this junction.
    pub fn path_to_source_junctions(&self) -> Vec<JunctionId> {
        self.path
            .iter()
            .flatten()
            .map(|step| step.junction)
            .collect()
    }

    // -- Derived state (propagation side) ------------------------------------

    pub(crate) fn reset_derived(&mut self) {
        self.faults = FaultFlags::default();
        self.path = None;
        self.powered = false;
        self.charge_fed = false;
        self.supplied = Fixed64::ZERO;
    }

    pub(crate) fn faults_mut(&mut self) -> &mut FaultFlags {
        &mut self.faults
    }

    /// Keep the shorter path; equal lengths keep the incumbent.
    pub(crate) fn offer_path(&mut self, candidate: &[PathStep]) {
        if candidate.is_empty() {
            return;
        }
        let replace = match &self.path {
            None => true,
            Some(existing) => candidate.len() < existing.len(),
        };
        if replace {
            self.path = Some(candidate.to_vec());
        }
    }

    pub(crate) fn publish(&mut self, powered: bool, charge_fed: bool, supplied: Fixed64) {
        self.powered = powered;
        self.charge_fed = charge_fed;
        self.supplied = supplied;
    }

    // -- Notifications -------------------------------------------------------

    pub fn notify(&mut self, message: impl Into<String>) {
        self.notifications.push(message.into());
    }

    pub fn pending_notifications(&self) -> &[String] {
        &self.notifications
    }

    // -- Command surface -----------------------------------------------------

    fn set_charging_port(&mut self, port: Option<usize>) {
        if let Some(old) = self.charging_port.take() {
            self.set_port_enabled(old, false);
        }
        if let Some(new) = port {
            self.charging_port = Some(new);
            self.set_port_enabled(new, true);
        }
    }

    fn parse_port(&self, value: &str) -> Option<usize> {
        value
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&i| i < self.ports.len())
    }

    /// Whether the junction's own power surface owns `aspect`.
    fn owns_aspect(&self, aspect: &Aspect) -> bool {
        match aspect {
            Aspect::PowerPort(_) => !self.capabilities.multi_select,
            Aspect::PowerSelect => self.capabilities.multi_select,
            Aspect::Charge => self.capabilities.chargeable,
            _ => false,
        }
    }

    fn handle_base(&mut self, request: &Request<'_>) -> CommandResult {
        if !self.owns_aspect(&request.aspect) {
            return CommandResult::NotHandled;
        }
        if self.status == JunctionStatus::Destroyed {
            return CommandResult::Blocked;
        }
        match &request.aspect {
            Aspect::PowerPort(index) => {
                let enable = match request.verb {
                    Verb::Enable => true,
                    Verb::Disable => false,
                    _ => return CommandResult::HandledWithError,
                };
                match index {
                    Some(i) if *i < self.ports.len() => {
                        self.set_port_enabled(*i, enable);
                        CommandResult::Handled
                    }
                    _ => CommandResult::HandledWithError,
                }
            }
            Aspect::PowerSelect => {
                if request.verb != Verb::Set {
                    return CommandResult::HandledWithError;
                }
                if request.value == "-1" || request.value.eq_ignore_ascii_case("OFF") {
                    self.select_port(None);
                    return CommandResult::Handled;
                }
                match self.parse_port(request.value) {
                    Some(i) => {
                        self.select_port(Some(i));
                        CommandResult::Handled
                    }
                    None => CommandResult::HandledWithError,
                }
            }
            Aspect::Charge => match request.verb {
                Verb::Enable => {
                    if request.value == "-1" {
                        self.set_charging_port(None);
                        return CommandResult::Handled;
                    }
                    match self.parse_port(request.value) {
                        Some(i) => {
                            self.set_charging_port(Some(i));
                            CommandResult::Handled
                        }
                        None => CommandResult::HandledWithError,
                    }
                }
                Verb::Disable => {
                    self.set_charging_port(None);
                    CommandResult::Handled
                }
                _ => {
                    let message = format!("{}.CHARGE UNKNOWNCOMMAND", self.name);
                    self.notify(message);
                    CommandResult::HandledWithError
                }
            },
            _ => CommandResult::NotHandled,
        }
    }

    fn can_handle_base(&self, request: &Request<'_>) -> bool {
        if !self.owns_aspect(&request.aspect) || self.status == JunctionStatus::Destroyed {
            return false;
        }
        match &request.aspect {
            Aspect::PowerPort(index) => {
                matches!(request.verb, Verb::Enable | Verb::Disable)
                    && index.is_some_and(|i| i < self.ports.len())
            }
            Aspect::PowerSelect => {
                request.verb == Verb::Set
                    && (request.value == "-1"
                        || request.value.eq_ignore_ascii_case("OFF")
                        || self.parse_port(request.value).is_some())
            }
            Aspect::Charge => match request.verb {
                Verb::Enable => request.value == "-1" || self.parse_port(request.value).is_some(),
                Verb::Disable => true,
                _ => false,
            },
            _ => false,
        }
    }

    fn query_base(&self, aspect: &Aspect) -> Option<String> {
        let text = match aspect {
            Aspect::PowerPort(Some(i)) if !self.capabilities.multi_select => {
                format_flag(self.ports.get(*i)?.enabled).to_string()
            }
            Aspect::PowerSelect if self.capabilities.multi_select => {
                index_or_none(self.selected_port)
            }
            Aspect::Charge if self.capabilities.chargeable => index_or_none(self.charging_port),
            Aspect::Level => format_fixed(self.battery.as_ref()?.level),
            Aspect::PowerFault => format_flag(self.faults.shutdown).to_string(),
            Aspect::PowerLevel => format_fixed(self.current_power_usage()),
            Aspect::NoiseLevel => format_fixed(self.noise_level()),
            Aspect::PowerState => self.power_state_label().to_string(),
            Aspect::Status => self.status.label().to_string(),
            _ => return None,
        };
        Some(text)
    }

    fn power_state_label(&self) -> &'static str {
        let f = self.faults;
        if f.shorted {
            "SHORTED"
        } else if f.overenergized {
            "OVERENERGIZED"
        } else if f.under_powered {
            "UNDERPOWERED"
        } else if f.shutdown {
            "SHUTDOWN"
        } else {
            "NORMAL"
        }
    }

    fn tick_battery(&mut self, dt: Fixed64) {
        let Some(cell) = self.battery.clone() else {
            return;
        };
        let one = Fixed64::from_num(1);
        let mut level = cell.level;

        if self.charging_port.is_some() && self.charge_fed && level < one {
            level = level.saturating_add(cell.charge_rate.saturating_mul(dt));
            if level >= one {
                level = one;
                self.set_charging_port(None);
                let message = format!("{} fully charged", self.name);
                self.notify(message);
            }
        }

        if self.supplied > Fixed64::ZERO && level > Fixed64::ZERO {
            let old = level;
            let mut new = old.saturating_sub(cell.discharge_rate.saturating_mul(dt));
            let twenty = Fixed64::from_num(0.2);
            let ten = Fixed64::from_num(0.1);
            if old > twenty && new <= twenty {
                let message = format!("{} at 20%", self.name);
                self.notify(message);
            } else if old > ten && new <= ten {
                let message = format!("{} at 10%", self.name);
                self.notify(message);
            } else if new <= Fixed64::ZERO {
                new = Fixed64::ZERO;
                let message = format!("{} depleted", self.name);
                self.notify(message);
            }
            level = new.max(Fixed64::ZERO);
        }

        if let Some(cell) = self.battery.as_mut() {
            cell.level = level;
        }
    }
}

fn index_or_none(index: Option<usize>) -> String {
    index.map_or_else(|| "-1".to_string(), |i| i.to_string())
}

// ---------------------------------------------------------------------------
// CommandHandler
// ---------------------------------------------------------------------------

impl CommandHandler for Junction {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle_command(&mut self, aspect: &str, command: &str, value: &str) -> CommandResult {
        let request = Request::parse(aspect, command, value);
        let destroyed = self.status == JunctionStatus::Destroyed;
        for part in &mut self.parts {
            if destroyed && part.query(&request.aspect).is_some() {
                return CommandResult::Blocked;
            }
            let result = part.handle(&request);
            if result.is_terminal() {
                return result;
            }
        }
        self.handle_base(&request)
    }

    fn can_handle_command(&self, aspect: &str, command: &str, value: &str) -> bool {
        let request = Request::parse(aspect, command, value);
        if self.status != JunctionStatus::Destroyed && self.parts.iter().any(|p| p.can_handle(&request)) {
            return true;
        }
        self.can_handle_base(&request)
    }

    fn query_state(&self, aspect: &str) -> String {
        let aspect = Aspect::parse(aspect);
        self.parts
            .iter()
            .find_map(|p| p.query(&aspect))
            .or_else(|| self.query_base(&aspect))
            .unwrap_or_default()
    }

    fn query_entire_state(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.parts.iter().flat_map(Part::entire_state).collect();
        if self.capabilities.chargeable {
            lines.push(match self.charging_port {
                Some(i) => format!("CHARGE ENABLE {i}"),
                None => "CHARGE DISABLE".to_string(),
            });
        }
        if self.capabilities.multi_select {
            lines.push(format!("POWERSELECT SET {}", index_or_none(self.selected_port)));
        } else {
            for (i, port) in self.ports.iter().enumerate() {
                let verb = if port.enabled { "ENABLE" } else { "DISABLE" };
                lines.push(format!("{} {verb}", Aspect::power_port(i)));
            }
        }
        lines
    }

    fn available_commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.parts.iter().flat_map(Part::commands).collect();
        if self.capabilities.chargeable {
            commands.push("CHARGE ENABLE <pin>".to_string());
            commands.push("CHARGE DISABLE".to_string());
        }
        if self.capabilities.multi_select {
            commands.push("POWERSELECT SET <port|-1|OFF>".to_string());
        } else {
            for i in 0..self.ports.len() {
                commands.push(format!("{} ENABLE|DISABLE", Aspect::power_port(i)));
            }
        }
        commands
    }

    fn available_queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = self.parts.iter().flat_map(Part::queries).collect();
        if self.battery.is_some() {
            queries.push("LEVEL".to_string());
        }
        if self.capabilities.chargeable {
            queries.push("CHARGE".to_string());
        }
        if self.capabilities.multi_select {
            queries.push("POWERSELECT".to_string());
        } else {
            queries.extend((0..self.ports.len()).map(Aspect::power_port));
        }
        queries.extend(
            ["POWERFAULT", "POWERLEVEL", "NOISELEVEL", "POWERSTATE", "STATUS"]
                .into_iter()
                .map(String::from),
        );
        queries
    }

    fn tick(&mut self, dt: Fixed64) {
        self.tick_battery(dt);
        if self.powered {
            for part in &mut self.parts {
                part.tick(dt);
            }
        }
    }

    fn drain_notifications(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn make_segment_ids(n: usize) -> Vec<SegmentId> {
        let mut sm = SlotMap::<SegmentId, ()>::with_key();
        (0..n).map(|_| sm.insert(())).collect()
    }

    fn with_ports(mut j: Junction, segs: &[SegmentId]) -> Junction {
        for &s in segs {
            assert!(j.add_port(s, Side::Left, 0));
        }
        j
    }

    // -----------------------------------------------------------------------
    // Test 1: plain junction ports start enabled and toggle independently
    // -----------------------------------------------------------------------
    #[test]
    fn plain_ports_toggle_independently() {
        let segs = make_segment_ids(3);
        let mut bus = with_ports(Junction::bus("BUS"), &segs);
        assert_eq!(bus.enabled_port_count(), 3);
        bus.set_port_enabled(1, false);
        assert!(bus.is_port_enabled(0));
        assert!(!bus.is_port_enabled(1));
        assert!(bus.is_port_enabled(2));
        assert!(!bus.is_port_enabled(9));
    }

    // -----------------------------------------------------------------------
    // Test 2: multi-select keeps at most one port enabled
    // -----------------------------------------------------------------------
    #[test]
    fn multi_select_keeps_one_port() {
        let segs = make_segment_ids(3);
        let mut sel = with_ports(Junction::selector("SEL"), &segs);
        // The last added port is selected.
        assert_eq!(sel.selected_port(), Some(2));
        assert_eq!(sel.enabled_port_count(), 1);

        sel.set_port_enabled(0, true);
        assert_eq!(sel.selected_port(), Some(0));
        assert!(sel.is_port_enabled(0));
        assert!(!sel.is_port_enabled(2));

        sel.set_port_enabled(0, false);
        assert_eq!(sel.selected_port(), None);
        assert_eq!(sel.enabled_port_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Test 3: throw switches cap their port counts
    // -----------------------------------------------------------------------
    #[test]
    fn port_limits() {
        let segs = make_segment_ids(3);
        let mut spst = Junction::single_throw("SPST");
        assert!(spst.add_port(segs[0], Side::Left, 0));
        assert!(!spst.add_port(segs[1], Side::Right, 0));

        let mut spdt = Junction::double_throw("SPDT");
        assert!(spdt.add_port(segs[0], Side::Left, 0));
        assert!(spdt.add_port(segs[1], Side::Right, 0));
        assert!(!spdt.add_port(segs[2], Side::Top, 0));
        assert_eq!(spdt.port_count(), 2);
    }

    // -----------------------------------------------------------------------
    // Test 4: connected segments skip disabled ports and the arrival edge
    // -----------------------------------------------------------------------
    #[test]
    fn connected_segments_rules() {
        let segs = make_segment_ids(3);
        let mut bus = with_ports(Junction::bus("BUS"), &segs);
        assert_eq!(bus.connected_segments(None), segs);
        assert_eq!(bus.connected_segments(Some(segs[0])), vec![segs[1], segs[2]]);

        bus.set_port_enabled(2, false);
        assert_eq!(bus.connected_segments(Some(segs[0])), vec![segs[1]]);
        // Arriving through a disabled port leads nowhere.
        assert!(bus.connected_segments(Some(segs[2])).is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 5: the charging port never feeds out
    // -----------------------------------------------------------------------
    #[test]
    fn charging_port_excluded_from_feed() {
        let segs = make_segment_ids(2);
        let mut bat = with_ports(Junction::battery("BAT", &BatteryTuning::default()), &segs);
        assert_eq!(bat.handle_command("CHARGE", "ENABLE", "1"), CommandResult::Handled);
        assert!(bat.is_charging_port(1));
        assert!(bat.is_charging_segment(segs[1]));
        assert_eq!(bat.connected_segments(None), vec![segs[0]]);
        assert_eq!(bat.current_power_usage(), Fixed64::from_num(6));
    }

    // -----------------------------------------------------------------------
    // Test 6: port commands on a plain junction
    // -----------------------------------------------------------------------
    #[test]
    fn power_port_commands() {
        let segs = make_segment_ids(2);
        let mut bus = with_ports(Junction::bus("BUS"), &segs);
        assert_eq!(bus.handle_command("POWERPORT_1", "DISABLE", ""), CommandResult::Handled);
        assert_eq!(bus.query_state("POWERPORT_1"), "false");
        assert_eq!(
            bus.handle_command("POWERPORT_7", "ENABLE", ""),
            CommandResult::HandledWithError
        );
        assert_eq!(
            bus.handle_command("POWERPORT_0", "SET", "true"),
            CommandResult::HandledWithError
        );
        assert_eq!(bus.handle_command("POWERSELECT", "SET", "0"), CommandResult::NotHandled);
        assert_eq!(bus.query_state("FLOW"), "");
    }

    // -----------------------------------------------------------------------
    // Test 7: selector hides per-port aspects
    // -----------------------------------------------------------------------
    #[test]
    fn power_select_commands() {
        let segs = make_segment_ids(3);
        let mut sel = with_ports(Junction::selector("SEL"), &segs);
        assert_eq!(sel.handle_command("POWERSELECT", "SET", "1"), CommandResult::Handled);
        assert_eq!(sel.query_state("POWERSELECT"), "1");
        assert_eq!(sel.handle_command("POWERSELECT", "SET", "OFF"), CommandResult::Handled);
        assert_eq!(sel.query_state("POWERSELECT"), "-1");
        assert_eq!(
            sel.handle_command("POWERSELECT", "SET", "5"),
            CommandResult::HandledWithError
        );
        assert_eq!(
            sel.handle_command("POWERSELECT", "SET", "abc"),
            CommandResult::HandledWithError
        );
        assert_eq!(sel.handle_command("POWERPORT_0", "ENABLE", ""), CommandResult::NotHandled);
        assert_eq!(sel.query_state("POWERPORT_0"), "");
    }

    // -----------------------------------------------------------------------
    // Test 8: unknown charge commands queue a notification
    // -----------------------------------------------------------------------
    #[test]
    fn unknown_charge_command_notifies() {
        let segs = make_segment_ids(1);
        let mut bat = with_ports(Junction::battery("BAT1", &BatteryTuning::default()), &segs);
        assert_eq!(
            bat.handle_command("CHARGE", "TOGGLE", ""),
            CommandResult::HandledWithError
        );
        assert_eq!(bat.drain_notifications(), vec!["BAT1.CHARGE UNKNOWNCOMMAND".to_string()]);
        assert!(bat.drain_notifications().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 9: composite consumer tries parts before the power surface
    // -----------------------------------------------------------------------
    #[test]
    fn consumer_delegates_to_parts_first() {
        let segs = make_segment_ids(2);
        let mut pump = with_ports(Junction::consumer("PUMP", &LoadTuning::default()), &segs);
        assert_eq!(pump.current_power_usage(), Fixed64::from_num(0.1));
        assert_eq!(pump.handle_command("ON", "SET", "true"), CommandResult::Handled);
        assert_eq!(pump.current_power_usage(), Fixed64::from_num(5));
        assert_eq!(pump.query_state("POWERLEVEL"), "5.00");
        assert_eq!(pump.handle_command("POWERSELECT", "SET", "0"), CommandResult::Handled);
        assert_eq!(
            pump.query_entire_state(),
            vec!["ON SET true".to_string(), "POWERSELECT SET 0".to_string()]
        );
    }

    // -----------------------------------------------------------------------
    // Test 10: destroyed junctions block configuration
    // -----------------------------------------------------------------------
    #[test]
    fn destroyed_blocks_commands() {
        let segs = make_segment_ids(1);
        let mut pump = with_ports(Junction::consumer("PUMP", &LoadTuning::default()), &segs);
        pump.set_status(JunctionStatus::Destroyed);
        assert_eq!(pump.handle_command("ON", "SET", "true"), CommandResult::Blocked);
        assert_eq!(pump.handle_command("POWERSELECT", "SET", "0"), CommandResult::Blocked);
        assert!(!pump.can_handle_command("ON", "SET", "true"));
        assert_eq!(pump.query_state("STATUS"), "DESTROYED");
    }

    // -----------------------------------------------------------------------
    // Test 11: shutdown zeroes usage
    // -----------------------------------------------------------------------
    #[test]
    fn shutdown_draws_nothing() {
        let mut load = Junction::load("LOAD", Fixed64::from_num(4));
        assert_eq!(load.current_power_usage(), Fixed64::from_num(4));
        load.faults_mut().shutdown = true;
        assert_eq!(load.current_power_usage(), Fixed64::ZERO);
        assert_eq!(load.query_state("POWERFAULT"), "true");
        assert_eq!(load.query_state("POWERSTATE"), "SHUTDOWN");
    }

    // -----------------------------------------------------------------------
    // Test 12: offered paths only replace when strictly shorter
    // -----------------------------------------------------------------------
    #[test]
    fn offer_path_prefers_shorter() {
        let segs = make_segment_ids(3);
        let mut sm = SlotMap::<JunctionId, ()>::with_key();
        let (x, y) = (sm.insert(()), sm.insert(()));
        let mut j = Junction::bus("J");
        let long = vec![
            PathStep { segment: segs[0], junction: x },
            PathStep { segment: segs[1], junction: y },
        ];
        let short = vec![PathStep { segment: segs[2], junction: y }];
        let tie = vec![PathStep { segment: segs[0], junction: y }];

        j.offer_path(&long);
        j.offer_path(&short);
        assert_eq!(j.path_to_source_segments(), vec![segs[2]]);
        j.offer_path(&tie);
        assert_eq!(j.path_to_source_segments(), vec![segs[2]]);
        j.offer_path(&[]);
        assert_eq!(j.path_to_source_junctions(), vec![y]);
    }

    // -----------------------------------------------------------------------
    // Test 13: battery charges when fed and reports fully charged
    // -----------------------------------------------------------------------
    #[test]
    fn battery_charges_until_full() {
        let segs = make_segment_ids(2);
        let mut bat = with_ports(Junction::battery("BAT", &BatteryTuning::default()), &segs);
        bat.set_battery_level(Fixed64::from_num(0.99));
        bat.handle_command("CHARGE", "ENABLE", "1");
        bat.publish(false, true, Fixed64::ZERO);

        bat.tick(Fixed64::from_num(1));
        assert_eq!(bat.battery_level(), Some(Fixed64::from_num(1)));
        assert_eq!(bat.charging_port(), None);
        assert!(!bat.is_port_enabled(1));
        assert_eq!(bat.drain_notifications(), vec!["BAT fully charged".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Test 14: battery discharge crosses warning thresholds
    // -----------------------------------------------------------------------
    #[test]
    fn battery_discharge_warnings() {
        let segs = make_segment_ids(1);
        let mut bat = with_ports(Junction::battery("BAT", &BatteryTuning::default()), &segs);
        bat.set_battery_level(Fixed64::from_num(0.205));
        bat.publish(true, false, Fixed64::from_num(10));

        bat.tick(Fixed64::from_num(1));
        assert_eq!(bat.drain_notifications(), vec!["BAT at 20%".to_string()]);

        bat.set_battery_level(Fixed64::from_num(0.005));
        bat.tick(Fixed64::from_num(1));
        assert_eq!(bat.drain_notifications(), vec!["BAT depleted".to_string()]);
        assert_eq!(bat.battery_level(), Some(Fixed64::ZERO));
        assert_eq!(bat.power_available(), Fixed64::ZERO);
    }

    // -----------------------------------------------------------------------
    // Test 15: parts only tick while powered
    // -----------------------------------------------------------------------
    #[test]
    fn parts_tick_only_with_power() {
        let mut hatch = Junction::bus("HATCH").with_part(Part::open_close(&Default::default()));
        hatch.handle_command("OPEN", "SET", "true");
        hatch.tick(Fixed64::from_num(5));
        assert_eq!(hatch.query_state("OPEN"), "MOVING");

        hatch.publish(true, false, Fixed64::ZERO);
        hatch.tick(Fixed64::from_num(5));
        assert_eq!(hatch.query_state("OPEN"), "OPEN");
    }

    // -----------------------------------------------------------------------
    // Test 16: out-of-range port indexes leave every port as it was
    // -----------------------------------------------------------------------
    #[test]
    fn out_of_range_port_is_ignored() {
        let segs = make_segment_ids(2);
        let mut bus = with_ports(Junction::bus("BUS"), &segs);
        bus.set_port_enabled(5, false);
        assert_eq!(bus.enabled_port_count(), 2);

        let mut sel = with_ports(Junction::selector("SEL"), &segs);
        sel.set_port_enabled(5, true);
        assert_eq!(sel.selected_port(), Some(1));
        assert_eq!(sel.enabled_port_count(), 1);
    }
}
