//! Core deterministic primitives for the fixed-point datapath.
//!
//! The hardware register is 8 bits wide and wraps; every helper here is a
//! pure integer (or exactly-representable float) operation so that the
//! software model reproduces the Verilog testbench bit for bit.

/// Width of the datapath register in values (2^8).
pub const MOD256: i64 = 256;

/// Fractional bits of the fixed-point LeakyReLU slope.
pub const SLOPE_FRAC_BITS: u32 = 8;

/// Wrap an integer into [0, 255].
///
/// `((v mod 256) + 256) mod 256`: negative sums wrap around instead of
/// saturating.
#[inline]
pub fn wrap_mod256_i64(v: i64) -> i64 {
    v.rem_euclid(MOD256)
}

/// Wrap a real value into [0, 255].
///
/// The value is first rounded half-to-even, then wrapped like an integer.
/// NaN and infinities have no register image and map to 0. The result is
/// never `-0.0`.
#[inline]
pub fn wrap_mod256_f32(v: f32) -> f32 {
    if !v.is_finite() {
        return 0.0;
    }
    let r = round_ties_to_even_f32(v);
    r.rem_euclid(MOD256 as f32) + 0.0
}

/// Round f32 to nearest integer with ties-to-even.
/// This matches IEEE-754 default rounding mode.
#[inline]
pub fn round_ties_to_even_f32(x: f32) -> f32 {
    // f32::round() rounds ties away from zero, so ties are handled by hand.
    let rounded = x.round();
    let diff = x - x.floor();

    if diff == 0.5 {
        let floor_val = x.floor();
        if (floor_val as i64) & 1 == 0 {
            floor_val
        } else {
            x.ceil()
        }
    } else {
        rounded
    }
}

/// Round f64 to nearest i64 with ties-to-even (for host-side constants).
#[inline]
pub fn round_ties_to_even_host(x: f64) -> i64 {
    let rounded = x.round();
    let floor_val = x.floor();
    let diff = x - floor_val;

    if (diff - 0.5).abs() < f64::EPSILON {
        if (floor_val as i64) & 1 == 0 {
            floor_val as i64
        } else {
            x.ceil() as i64
        }
    } else {
        rounded as i64
    }
}

/// 64-bit to 32-bit shift-right with ties-to-even rounding.
///
/// Returns `round(v / 2^sh)` clamped to i32 range.
#[inline]
pub fn sra_rne_tte_s64_to_s32(v: i64, sh: u32) -> i32 {
    if sh == 0 {
        return v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    }

    let sign = v >> 63; // -1 if negative, 0 if positive
    let av = ((v ^ sign) - sign) as u64;

    let mask = (1u64 << sh) - 1;
    let r = av & mask;
    let mut q = av >> sh;

    let half = 1u64 << (sh - 1);
    if r > half {
        q += 1;
    } else if r == half {
        q += q & 1; // ties-to-even
    }

    let out = q as i64;
    let signed_out = (out ^ sign) - sign;
    signed_out.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Convert a real LeakyReLU slope to the Q0.8 multiplier used by the
/// fixed-point datapath.
#[inline]
pub fn slope_to_q8(slope: f32) -> i32 {
    let scaled = slope as f64 * (1u32 << SLOPE_FRAC_BITS) as f64;
    round_ties_to_even_host(scaled).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Apply a Q0.8 slope to a negative fixed-point value.
#[inline]
pub fn mul_slope_q8(x: i32, slope_q8: i32) -> i32 {
    sra_rne_tte_s64_to_s32(x as i64 * slope_q8 as i64, SLOPE_FRAC_BITS)
}
