//! Tuning constants for junction constructors.
//!
//! Values are plain `f64` so they read naturally in config files; they are
//! converted to [`Fixed64`] once, when a junction or part is built. Every
//! field has a default, so a config file only needs the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, checked_f64_to_fixed64, f64_to_fixed64};

/// Draw and noise of a switched consumer (pump, fan, light).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTuning {
    /// Draw while switched on.
    pub active_usage: f64,
    /// Draw while switched off but still wired in.
    pub idle_usage: f64,
    /// Noise reported while drawing.
    pub noise: f64,
}

impl Default for LoadTuning {
    fn default() -> Self {
        Self {
            active_usage: 5.0,
            idle_usage: 0.1,
            noise: 0.1,
        }
    }
}

/// Battery supply and charge behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryTuning {
    /// Power available while the cell holds any charge.
    pub capacity: f64,
    /// Draw through the charging port while charging.
    pub charging_draw: f64,
    /// Fraction of full charge gained per second.
    pub charge_rate: f64,
    /// Fraction of full charge lost per second while supplying load.
    pub discharge_rate: f64,
    /// Initial charge fraction.
    pub initial_level: f64,
}

impl Default for BatteryTuning {
    fn default() -> Self {
        Self {
            capacity: 400.0,
            charging_draw: 6.0,
            charge_rate: 0.02,
            discharge_rate: 0.01,
            initial_level: 1.0,
        }
    }
}

/// Timing of moving parts (extend/retract, open/close).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorTuning {
    /// Seconds a full travel takes while powered.
    pub move_seconds: f64,
}

impl Default for ActuatorTuning {
    fn default() -> Self {
        Self { move_seconds: 1.5 }
    }
}

/// All tuning sections together. This is the shape of a tuning file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub load: LoadTuning,
    pub battery: BatteryTuning,
    pub actuator: ActuatorTuning,
}

impl Tuning {
    /// The first field whose value cannot be represented as [`Fixed64`].
    pub fn out_of_range_field(&self) -> Option<&'static str> {
        [
            ("load.active_usage", self.load.active_usage),
            ("load.idle_usage", self.load.idle_usage),
            ("load.noise", self.load.noise),
            ("battery.capacity", self.battery.capacity),
            ("battery.charging_draw", self.battery.charging_draw),
            ("battery.charge_rate", self.battery.charge_rate),
            ("battery.discharge_rate", self.battery.discharge_rate),
            ("battery.initial_level", self.battery.initial_level),
            ("actuator.move_seconds", self.actuator.move_seconds),
        ]
        .into_iter()
        .find(|(_, value)| checked_f64_to_fixed64(*value).is_none())
        .map(|(field, _)| field)
    }
}

impl ActuatorTuning {
    pub fn move_time(&self) -> Fixed64 {
        f64_to_fixed64(self.move_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_equipment() {
        let t = Tuning::default();
        assert_eq!(t.load.active_usage, 5.0);
        assert_eq!(t.load.idle_usage, 0.1);
        assert_eq!(t.battery.capacity, 400.0);
        assert_eq!(t.battery.charging_draw, 6.0);
        assert_eq!(t.actuator.move_seconds, 1.5);
    }

    #[test]
    fn out_of_range_fields_are_named() {
        let mut t = Tuning::default();
        assert_eq!(t.out_of_range_field(), None);
        t.battery.charge_rate = f64::NAN;
        assert_eq!(t.out_of_range_field(), Some("battery.charge_rate"));
        t.load.active_usage = 3e9;
        assert_eq!(t.out_of_range_field(), Some("load.active_usage"));
    }

    #[test]
    fn move_time_converts_to_fixed() {
        let a = ActuatorTuning { move_seconds: 2.0 };
        assert_eq!(a.move_time(), Fixed64::from_num(2));
    }
}
