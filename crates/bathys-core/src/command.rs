//! The string command protocol every grid node speaks.
//!
//! Commands arrive as `(aspect, command, value)` string triples. Handlers
//! parse them once into [`Aspect`] and [`Verb`] and match on those, so the
//! set of aspects a junction understands is checked by the compiler rather
//! than by string comparisons scattered through the code.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of [`CommandHandler::handle_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandResult {
    /// The command was applied.
    Handled,
    /// The command was understood but the handler refused it in its current state.
    Blocked,
    /// The (aspect, command) pair is unknown to this handler.
    NotHandled,
    /// The aspect is known but the command or value is invalid.
    HandledWithError,
}

impl CommandResult {
    /// `true` for every result except [`CommandResult::NotHandled`]. Composite
    /// handlers stop at the first terminal result.
    pub fn is_terminal(self) -> bool {
        self != CommandResult::NotHandled
    }
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// A named node reachable through the command protocol.
///
/// `query_entire_state` must return only configuration commands: feeding
/// its lines into a fresh handler of the same kind reproduces the same
/// configuration. Sensor readings, computed values and one-shot actions
/// never appear there.
pub trait CommandHandler {
    fn name(&self) -> &str;

    fn handle_command(&mut self, aspect: &str, command: &str, value: &str) -> CommandResult;

    fn can_handle_command(&self, aspect: &str, command: &str, value: &str) -> bool;

    /// Current value of `aspect`, or an empty string if the aspect is unknown.
    fn query_state(&self, aspect: &str) -> String;

    fn query_entire_state(&self) -> Vec<String>;

    fn available_commands(&self) -> Vec<String>;

    fn available_queries(&self) -> Vec<String>;

    /// Advance non-electrical behaviour by `dt` seconds.
    fn tick(&mut self, dt: Fixed64) {
        let _ = dt;
    }

    /// Take every notification queued since the last drain.
    fn drain_notifications(&mut self) -> Vec<String> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Parsed aspects and verbs
// ---------------------------------------------------------------------------

/// Every aspect a grid junction or one of its parts can address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aspect {
    /// `POWERPORT_<n>`. `None` when the suffix is not a port number.
    PowerPort(Option<usize>),
    PowerSelect,
    PowerFault,
    PowerLevel,
    NoiseLevel,
    PowerState,
    Status,
    Charge,
    Level,
    On,
    Extend,
    Open,
    Other(String),
}

const POWERPORT_PREFIX: &str = "POWERPORT_";

impl Aspect {
    /// Parse an aspect token. Matching ignores ASCII case.
    pub fn parse(token: &str) -> Self {
        let upper = token.trim().to_ascii_uppercase();
        if let Some(index) = upper.strip_prefix(POWERPORT_PREFIX) {
            return Aspect::PowerPort(index.parse().ok());
        }
        match upper.as_str() {
            "POWERSELECT" => Aspect::PowerSelect,
            "POWERFAULT" => Aspect::PowerFault,
            "POWERLEVEL" => Aspect::PowerLevel,
            "NOISELEVEL" => Aspect::NoiseLevel,
            "POWERSTATE" => Aspect::PowerState,
            "STATUS" => Aspect::Status,
            "CHARGE" => Aspect::Charge,
            "LEVEL" => Aspect::Level,
            "ON" => Aspect::On,
            "EXTEND" => Aspect::Extend,
            "OPEN" => Aspect::Open,
            _ => Aspect::Other(upper),
        }
    }

    /// Wire name of a port aspect.
    pub fn power_port(index: usize) -> String {
        format!("{POWERPORT_PREFIX}{index}")
    }
}

/// The command word of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Set,
    Enable,
    Disable,
    Other(String),
}

impl Verb {
    pub fn parse(token: &str) -> Self {
        let upper = token.trim().to_ascii_uppercase();
        match upper.as_str() {
            "SET" => Verb::Set,
            "ENABLE" => Verb::Enable,
            "DISABLE" => Verb::Disable,
            _ => Verb::Other(upper),
        }
    }
}

/// A command after parsing, handed to each part of a junction in turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub aspect: Aspect,
    pub verb: Verb,
    pub value: &'a str,
}

impl<'a> Request<'a> {
    pub fn parse(aspect: &str, command: &str, value: &'a str) -> Self {
        Self {
            aspect: Aspect::parse(aspect),
            verb: Verb::parse(command),
            value: value.trim(),
        }
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Parse a boolean command value. Accepts `true/false`, `1/0`, `yes/no` and
/// `on/off`, ignoring case.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn format_flag(flag: bool) -> &'static str {
    if flag { "true" } else { "false" }
}
