//! Quantum scalar type and depth scaling.
//!
//! Every sample inside an [`Image`](crate::Image) is a [`Quantum`]: an `f32`
//! in the nominal range `[0, QUANTUM_RANGE]`. Values outside the range are
//! allowed (high dynamic range samples from float formats) and are clamped
//! only when exported to an integer representation.
//!
//! # Depth Mapping
//!
//! An external unsigned sample of `depth` bits maps linearly:
//!
//! ```text
//! [0, 2^depth - 1]  <->  [0, QUANTUM_RANGE]
//! ```
//!
//! ```rust
//! use pixmill_core::quantum::{scale_any_to_quantum, scale_quantum_to_any, QUANTUM_RANGE};
//!
//! assert_eq!(scale_any_to_quantum(255, 8), QUANTUM_RANGE);
//! assert_eq!(scale_quantum_to_any(QUANTUM_RANGE, 8), 255);
//! assert_eq!(scale_quantum_to_any(scale_any_to_quantum(128, 8), 8), 128);
//! ```

use half::f16;

/// Internal sample value.
pub type Quantum = f32;

/// Colormap index or CMYK black sample, stored parallel to the pixels.
pub type IndexPacket = Quantum;

/// Bits of precision the quantum range represents.
pub const QUANTUM_DEPTH: u32 = 16;

/// Largest nominal quantum value.
pub const QUANTUM_RANGE: Quantum = 65535.0;

/// Smallest gamma accepted before treating a divisor as zero.
pub const MAGICK_EPSILON: f64 = 1.0e-10;

/// Returns `2^depth - 1` as a float; valid for any depth up to 64.
#[inline]
pub fn max_value_for_depth(depth: u32) -> f64 {
    if depth == 0 {
        return 0.0;
    }
    2f64.powi(depth.min(64) as i32) - 1.0
}

/// Maps an unsigned sample of `depth` bits into quantum range.
#[inline]
pub fn scale_any_to_quantum(value: u64, depth: u32) -> Quantum {
    let max = max_value_for_depth(depth);
    if max <= 0.0 {
        return 0.0;
    }
    (value as f64 * QUANTUM_RANGE as f64 / max) as Quantum
}

/// Maps a quantum into an unsigned sample of `depth` bits, rounding and
/// clamping to the representable range.
#[inline]
pub fn scale_quantum_to_any(quantum: Quantum, depth: u32) -> u64 {
    let max = max_value_for_depth(depth);
    let value = quantum as f64 * max / QUANTUM_RANGE as f64;
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    if value >= max {
        return max as u64;
    }
    (value + 0.5) as u64
}

/// Maps an 8-bit sample into quantum range.
#[inline]
pub fn scale_char_to_quantum(value: u8) -> Quantum {
    scale_any_to_quantum(value as u64, 8)
}

/// Maps a quantum into an 8-bit sample.
#[inline]
pub fn scale_quantum_to_char(quantum: Quantum) -> u8 {
    scale_quantum_to_any(quantum, 8) as u8
}

/// Maps a 16-bit sample into quantum range.
#[inline]
pub fn scale_short_to_quantum(value: u16) -> Quantum {
    value as Quantum
}

/// Maps a quantum into a 16-bit sample.
#[inline]
pub fn scale_quantum_to_short(quantum: Quantum) -> u16 {
    scale_quantum_to_any(quantum, 16) as u16
}

/// Clamps a real value into `[0, QUANTUM_RANGE]`.
#[inline]
pub fn clamp_to_quantum(value: f64) -> Quantum {
    if value.is_nan() || value <= 0.0 {
        return 0.0;
    }
    if value >= QUANTUM_RANGE as f64 {
        return QUANTUM_RANGE;
    }
    value as Quantum
}

/// Decodes an IEEE half-precision sample normalized to `[0, 1]`.
#[inline]
pub fn half_to_quantum(bits: u16) -> Quantum {
    f16::from_bits(bits).to_f32() * QUANTUM_RANGE
}

/// Encodes a quantum as an IEEE half-precision sample normalized to `[0, 1]`.
#[inline]
pub fn quantum_to_half(quantum: Quantum) -> u16 {
    f16::from_f32(quantum / QUANTUM_RANGE).to_bits()
}
