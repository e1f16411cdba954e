use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. Every power,
/// noise, charge and timer quantity in the grid uses this type so repeated
/// propagations produce identical bits.
pub type Fixed64 = I32F32;

/// Convert an f64 to Fixed64. Use only for initialization, never in the tick.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert an f64 that came from outside the program. `None` when the value
/// is not finite or does not fit in Q32.32.
#[inline]
pub fn checked_f64_to_fixed64(v: f64) -> Option<Fixed64> {
    if v.is_finite() {
        Fixed64::checked_from_num(v)
    } else {
        None
    }
}

/// Convert Fixed64 to f64. Use only for display.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Render a quantity with two decimals, the format every numeric query uses.
pub fn format_fixed(v: Fixed64) -> String {
    format!("{:.2}", fixed64_to_f64(v))
}
