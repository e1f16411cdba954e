//! Routes `Target.Aspect Command Value` lines to named handlers.
//!
//! The dispatcher owns the [`PowerGrid`] (every junction is a handler) plus
//! any number of external handlers registered by the host. Names are unique
//! across both.

use std::collections::HashMap;

use tracing::debug;

use crate::command::{CommandHandler, CommandResult};
use crate::fixed::Fixed64;
use crate::grid::PowerGrid;
use crate::id::JunctionId;
use crate::propagation::propagate_power;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a line could not be split into target, aspect, command and value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,
    #[error("comment line")]
    Comment,
    #[error("missing '.' between target and aspect: {0:?}")]
    MissingTarget(String),
    #[error("missing aspect: {0:?}")]
    MissingAspect(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("handler name already registered: {0}")]
    DuplicateName(String),
}

// ---------------------------------------------------------------------------
// Command lines
// ---------------------------------------------------------------------------

/// One parsed command line. `value` is the rest of the line and may contain
/// spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub target: &'a str,
    pub aspect: &'a str,
    pub command: &'a str,
    pub value: &'a str,
}

impl<'a> CommandLine<'a> {
    pub fn parse(line: &'a str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if line.starts_with("//") {
            return Err(ParseError::Comment);
        }
        let Some((target, rest)) = line.split_once('.') else {
            return Err(ParseError::MissingTarget(line.to_string()));
        };
        let (aspect, rest) = split_token(rest.trim_start());
        if aspect.is_empty() {
            return Err(ParseError::MissingAspect(line.to_string()));
        }
        let (command, value) = split_token(rest);
        Ok(Self {
            target: target.trim(),
            aspect,
            command,
            value: value.trim(),
        })
    }
}

fn split_token(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim_start()),
        None => (text, ""),
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Junction(JunctionId),
    External(usize),
}

pub struct Dispatcher {
    grid: PowerGrid,
    external: Vec<Box<dyn CommandHandler>>,
    table: HashMap<String, Slot>,
    order: Vec<Slot>,
}

impl Dispatcher {
    /// Take ownership of a built grid and register every junction.
    pub fn new(grid: PowerGrid) -> Self {
        let mut table = HashMap::new();
        let mut order = Vec::new();
        for (id, junction) in grid.junctions() {
            table.insert(junction.name().to_string(), Slot::Junction(id));
            order.push(Slot::Junction(id));
        }
        Self {
            grid,
            external: Vec::new(),
            table,
            order,
        }
    }

    /// Register a non-junction handler (sensor panel, controller, ...).
    pub fn register(&mut self, handler: Box<dyn CommandHandler>) -> Result<(), DispatchError> {
        let name = handler.name().to_string();
        if self.table.contains_key(&name) {
            return Err(DispatchError::DuplicateName(name));
        }
        let slot = Slot::External(self.external.len());
        self.external.push(handler);
        self.table.insert(name, slot);
        self.order.push(slot);
        Ok(())
    }

    pub fn grid(&self) -> &PowerGrid {
        &self.grid
    }

    /// Mutable access for runtime state (segment status, parameters). Junctions
    /// added here are not routed; topology is fixed once dispatching starts.
    pub fn grid_mut(&mut self) -> &mut PowerGrid {
        &mut self.grid
    }

    pub fn into_grid(self) -> PowerGrid {
        self.grid
    }

    /// Handler names in registration order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|&slot| self.handler(slot))
            .map(|h| h.name())
            .collect()
    }

    fn handler(&self, slot: Slot) -> Option<&dyn CommandHandler> {
        match slot {
            Slot::Junction(id) => self.grid.junction(id).map(|j| j as &dyn CommandHandler),
            Slot::External(i) => self.external.get(i).map(|h| h.as_ref()),
        }
    }

    fn handler_mut(&mut self, slot: Slot) -> Option<&mut dyn CommandHandler> {
        match slot {
            Slot::Junction(id) => self
                .grid
                .junction_mut(id)
                .map(|j| j as &mut dyn CommandHandler),
            Slot::External(i) => match self.external.get_mut(i) {
                Some(h) => Some(h.as_mut()),
                None => None,
            },
        }
    }

    fn lookup(&self, target: &str) -> Option<Slot> {
        self.table.get(target).copied()
    }

    // -- Commands -------------------------------------------------------------

    /// Run one line. Comments, blank lines, malformed lines and unknown
    /// targets all come back as [`CommandResult::NotHandled`].
    pub fn process_command(&mut self, line: &str) -> CommandResult {
        let parsed = match CommandLine::parse(line) {
            Ok(parsed) => parsed,
            Err(ParseError::Empty | ParseError::Comment) => return CommandResult::NotHandled,
            Err(err) => {
                debug!(%err, "unparseable command line");
                return CommandResult::NotHandled;
            }
        };
        let Some(slot) = self.lookup(parsed.target) else {
            debug!(name = parsed.target, "no handler for command target");
            return CommandResult::NotHandled;
        };
        match self.handler_mut(slot) {
            Some(handler) => handler.handle_command(parsed.aspect, parsed.command, parsed.value),
            None => CommandResult::NotHandled,
        }
    }

    /// Run every non-comment, non-blank line of `text` in order.
    pub fn process_block(&mut self, text: &str) -> Vec<(String, CommandResult)> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//"))
            .map(|line| (line.to_string(), self.process_command(line)))
            .collect()
    }

    pub fn can_handle(&self, line: &str) -> bool {
        let Ok(parsed) = CommandLine::parse(line) else {
            return false;
        };
        self.lookup(parsed.target)
            .and_then(|slot| self.handler(slot))
            .is_some_and(|h| h.can_handle_command(parsed.aspect, parsed.command, parsed.value))
    }

    // -- Queries --------------------------------------------------------------

    /// `None` for an unknown target; an empty string for an unknown aspect.
    pub fn query(&self, target: &str, aspect: &str) -> Option<String> {
        let slot = self.lookup(target)?;
        self.handler(slot).map(|h| h.query_state(aspect))
    }

    /// Every handler's configuration as `name.` prefixed command lines.
    /// Feeding the result to [`Dispatcher::process_block`] restores it.
    pub fn entire_state(&self) -> Vec<String> {
        self.prefixed(|h| h.query_entire_state())
    }

    pub fn available_commands(&self) -> Vec<String> {
        self.prefixed(|h| h.available_commands())
    }

    pub fn available_queries(&self) -> Vec<String> {
        self.prefixed(|h| h.available_queries())
    }

    fn prefixed(&self, lines: impl Fn(&dyn CommandHandler) -> Vec<String>) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|&slot| self.handler(slot))
            .flat_map(|h| {
                let name = h.name();
                lines(h)
                    .into_iter()
                    .map(move |line| format!("{name}.{line}"))
            })
            .collect()
    }

    // -- Per-tick -------------------------------------------------------------

    pub fn propagate(&mut self) {
        propagate_power(&mut self.grid);
    }

    pub fn tick_all(&mut self, dt: Fixed64) {
        for slot in self.order.clone() {
            if let Some(handler) = self.handler_mut(slot) {
                handler.tick(dt);
            }
        }
    }

    /// Propagate power, then tick every handler against the fresh state.
    pub fn step(&mut self, dt: Fixed64) {
        self.propagate();
        self.tick_all(dt);
    }

    /// Drain every handler's notification queue, in registration order.
    pub fn drain_notifications(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        for slot in self.order.clone() {
            if let Some(handler) = self.handler_mut(slot) {
                out.extend(handler.drain_notifications());
            }
        }
        out
    }
}
