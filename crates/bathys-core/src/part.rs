//! Composable command parts.
//!
//! A junction carries an ordered list of [`Part`]s. Each command is offered
//! to the parts in order and then to the junction's own power surface; the
//! first result other than [`CommandResult::NotHandled`] wins.

use serde::{Deserialize, Serialize};

use crate::command::{Aspect, CommandResult, Request, Verb, format_flag, parse_flag};
use crate::fixed::Fixed64;
use crate::tuning::ActuatorTuning;

// ---------------------------------------------------------------------------
// Actuator travel
// ---------------------------------------------------------------------------

/// Where a two-position actuator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Travel {
    /// Resting in the `false` position (retracted, closed).
    Home,
    Moving,
    /// Resting in the `true` position (extended, open).
    Away,
}

/// A two-position mechanism that takes `move_time` seconds of powered time to
/// travel between positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actuator {
    target: bool,
    travel: Travel,
    remaining: Fixed64,
    move_time: Fixed64,
}

impl Actuator {
    pub fn new(tuning: &ActuatorTuning) -> Self {
        Self {
            target: false,
            travel: Travel::Home,
            remaining: Fixed64::ZERO,
            move_time: tuning.move_time(),
        }
    }

    pub fn target(&self) -> bool {
        self.target
    }

    pub fn travel(&self) -> Travel {
        self.travel
    }

    /// Request a new position. Reversing mid-travel only costs the distance
    /// already covered.
    pub fn set_target(&mut self, target: bool) {
        let resting = match self.travel {
            Travel::Home => Some(false),
            Travel::Away => Some(true),
            Travel::Moving => None,
        };
        if resting == Some(target) {
            self.target = target;
            return;
        }
        if self.travel == Travel::Moving {
            if self.target != target {
                self.remaining = self.move_time - self.remaining;
            }
        } else {
            self.remaining = self.move_time;
        }
        self.target = target;
        self.travel = Travel::Moving;
    }

    pub fn tick(&mut self, dt: Fixed64) {
        if self.travel != Travel::Moving {
            return;
        }
        self.remaining = self.remaining.saturating_sub(dt);
        if self.remaining <= Fixed64::ZERO {
            self.remaining = Fixed64::ZERO;
            self.travel = if self.target { Travel::Away } else { Travel::Home };
        }
    }
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// One command behaviour attached to a junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    /// `ON SET <bool>`.
    OnOff { on: bool },
    /// `EXTEND SET <bool>`; reports `IN`, `OUT` or `MOVING`.
    ExtendRetract(Actuator),
    /// `OPEN SET <bool>`; reports `CLOSED`, `OPEN` or `MOVING`.
    OpenClose(Actuator),
}

impl Part {
    pub fn on_off() -> Self {
        Part::OnOff { on: false }
    }

    pub fn extend_retract(tuning: &ActuatorTuning) -> Self {
        Part::ExtendRetract(Actuator::new(tuning))
    }

    pub fn open_close(tuning: &ActuatorTuning) -> Self {
        Part::OpenClose(Actuator::new(tuning))
    }

    /// The aspect this part answers to.
    fn aspect(&self) -> Aspect {
        match self {
            Part::OnOff { .. } => Aspect::On,
            Part::ExtendRetract(_) => Aspect::Extend,
            Part::OpenClose(_) => Aspect::Open,
        }
    }

    fn wire_name(&self) -> &'static str {
        match self {
            Part::OnOff { .. } => "ON",
            Part::ExtendRetract(_) => "EXTEND",
            Part::OpenClose(_) => "OPEN",
        }
    }

    /// `Some(state)` for an on/off part.
    pub fn switched_on(&self) -> Option<bool> {
        match self {
            Part::OnOff { on } => Some(*on),
            _ => None,
        }
    }

    pub fn handle(&mut self, request: &Request<'_>) -> CommandResult {
        if request.aspect != self.aspect() {
            return CommandResult::NotHandled;
        }
        if request.verb != Verb::Set {
            return CommandResult::HandledWithError;
        }
        let Some(flag) = parse_flag(request.value) else {
            return CommandResult::HandledWithError;
        };
        match self {
            Part::OnOff { on } => *on = flag,
            Part::ExtendRetract(actuator) | Part::OpenClose(actuator) => {
                actuator.set_target(flag)
            }
        }
        CommandResult::Handled
    }

    pub fn can_handle(&self, request: &Request<'_>) -> bool {
        request.aspect == self.aspect()
            && request.verb == Verb::Set
            && parse_flag(request.value).is_some()
    }

    pub fn query(&self, aspect: &Aspect) -> Option<String> {
        if *aspect != self.aspect() {
            return None;
        }
        let text = match self {
            Part::OnOff { on } => format_flag(*on),
            Part::ExtendRetract(actuator) => match actuator.travel() {
                Travel::Home => "IN",
                Travel::Moving => "MOVING",
                Travel::Away => "OUT",
            },
            Part::OpenClose(actuator) => match actuator.travel() {
                Travel::Home => "CLOSED",
                Travel::Moving => "MOVING",
                Travel::Away => "OPEN",
            },
        };
        Some(text.to_string())
    }

    pub fn entire_state(&self) -> Vec<String> {
        let flag = match self {
            Part::OnOff { on } => *on,
            Part::ExtendRetract(actuator) | Part::OpenClose(actuator) => actuator.target(),
        };
        vec![format!("{} SET {}", self.wire_name(), format_flag(flag))]
    }

    pub fn commands(&self) -> Vec<String> {
        vec![format!("{} SET <true|false>", self.wire_name())]
    }

    pub fn queries(&self) -> Vec<String> {
        vec![self.wire_name().to_string()]
    }

    /// Advance moving parts. Only called while the owning junction has power.
    pub fn tick(&mut self, dt: Fixed64) {
        match self {
            Part::OnOff { .. } => {}
            Part::ExtendRetract(actuator) | Part::OpenClose(actuator) => actuator.tick(dt),
        }
    }
}
