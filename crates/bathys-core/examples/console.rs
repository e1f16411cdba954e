//! Headless console for a small submarine power grid.
//!
//! Builds a generator, a battery, a main bus and a handful of consumers, then
//! reads command lines from stdin. After every line the grid propagates and
//! ticks once, and any notifications are printed.
//!
//! ```text
//! PUMP1.ON SET true        run a command
//! ?PUMP1.POWERLEVEL        query one aspect
//! MAIN.POWERPORT_2 DISABLE cut the aft bus
//! dump                     print the full configuration
//! help                     list every command
//! ```
//!
//! Run with: `RUST_LOG=bathys_core=debug cargo run -p bathys-core --example console`

use std::error::Error;
use std::io::{self, BufRead, Write};

use bathys_core::dispatcher::Dispatcher;
use bathys_core::fixed::{Fixed64, f64_to_fixed64, format_fixed};
use bathys_core::grid::{GridError, PowerGrid};
use bathys_core::junction::{Junction, Side};
use bathys_core::part::Part;
use bathys_core::tuning::Tuning;
use tracing_subscriber::EnvFilter;

fn build_boat(tuning: &Tuning) -> Result<PowerGrid, GridError> {
    let mut grid = PowerGrid::new();
    let generator = grid.add_junction(Junction::feeder("GENERATOR", f64_to_fixed64(20.0)))?;
    let battery = grid.add_junction(Junction::battery("BATTERY", &tuning.battery))?;
    let main_bus = grid.add_junction(Junction::bus("MAIN"))?;
    let aft_bus = grid.add_junction(Junction::bus("AFT"))?;
    let pump1 = grid.add_junction(Junction::consumer("PUMP1", &tuning.load))?;
    let pump2 = grid.add_junction(Junction::consumer("PUMP2", &tuning.load))?;
    let periscope = grid.add_junction(
        Junction::load("PERISCOPE", f64_to_fixed64(1.0))
            .with_part(Part::extend_retract(&tuning.actuator)),
    )?;
    let ballast = grid.add_junction(
        Junction::load("BALLAST", f64_to_fixed64(0.5))
            .with_part(Part::open_close(&tuning.actuator)),
    )?;

    // The generator charges the battery; the battery runs the boat.
    grid.connect("GEN-BAT", (generator, Side::Right, 0), (battery, Side::Left, 0))?;
    grid.connect("BAT-MAIN", (battery, Side::Right, 0), (main_bus, Side::Left, 0))?;
    grid.connect("MAIN-PUMP1", (main_bus, Side::Bottom, 0), (pump1, Side::Top, 0))?;
    grid.connect("MAIN-AFT", (main_bus, Side::Right, 0), (aft_bus, Side::Left, 0))?;
    grid.connect("AFT-PUMP2", (aft_bus, Side::Bottom, 0), (pump2, Side::Top, 0))?;
    grid.connect("AFT-PERISCOPE", (aft_bus, Side::Top, 0), (periscope, Side::Bottom, 0))?;
    grid.connect("MAIN-BALLAST", (main_bus, Side::Top, 0), (ballast, Side::Bottom, 0))?;
    Ok(grid)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let tuning = Tuning::default();
    let mut dispatcher = Dispatcher::new(build_boat(&tuning)?);
    dispatcher.process_command("BATTERY.CHARGE ENABLE 0");
    let dt: Fixed64 = f64_to_fixed64(0.1);
    dispatcher.step(dt);

    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    writeln!(out, "{} handlers online", dispatcher.handler_names().len())?;

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        match line {
            "" => {}
            "quit" | "exit" => break,
            "dump" => {
                for entry in dispatcher.entire_state() {
                    writeln!(out, "{entry}")?;
                }
            }
            "help" => {
                for entry in dispatcher.available_commands() {
                    writeln!(out, "{entry}")?;
                }
            }
            query if query.starts_with('?') => {
                let Some((target, aspect)) = query[1..].split_once('.') else {
                    writeln!(out, "usage: ?TARGET.ASPECT")?;
                    continue;
                };
                match dispatcher.query(target.trim(), aspect.trim()) {
                    Some(value) => writeln!(out, "{value}")?,
                    None => writeln!(out, "no such handler: {target}")?,
                }
            }
            command => {
                let result = dispatcher.process_command(command);
                writeln!(out, "{result:?}")?;
            }
        }

        dispatcher.step(dt);
        for note in dispatcher.drain_notifications() {
            writeln!(out, "! {note}")?;
        }
        if let Some(generator) = dispatcher.grid().junction_by_name("GENERATOR") {
            writeln!(out, "  generator load {}", format_fixed(generator.supplied()))?;
        }
    }
    Ok(())
}
