//! Miscellaneous numeric helpers.

#[cfg(test)]
#[path = "misc_tests.rs"]
mod misc_tests;

/// Trait allowing floats to be used as parts of hash keys.
pub trait HashableFloat {
    /// Returns the mantissa-exponent-sign triplet for a float.
    ///
    /// Reference: <https://stackoverflow.com/questions/39638363/how-can-i-use-a-hashmap-with-f64-as-key-in-rust>
    fn integer_decode(self) -> (u64, i16, i8);
}

impl HashableFloat for f64 {
    fn integer_decode(self) -> (u64, i16, i8) {
        let bits = self.to_bits();
        let sign: i8 = if bits >> 63 == 0 { 1 } else { -1 };
        let mut exponent: i16 = ((bits >> 52) & 0x7ff) as i16;
        let mantissa = if exponent == 0 {
            (bits & 0xfffffffffffff) << 1
        } else {
            (bits & 0xfffffffffffff) | 0x10000000000000
        };

        exponent -= 1023 + 52;
        (mantissa, exponent, sign)
    }
}

/// Wraps a fractional coordinate into $`[0, 1)`$.
///
/// Values within `eps` below one are mapped onto zero so that a coordinate sitting on a cell face
/// always lands on the same side.
pub fn wrap_unit(value: f64, eps: f64) -> f64 {
    let wrapped = value.rem_euclid(1.0);
    if wrapped >= 1.0 - eps {
        0.0
    } else {
        wrapped
    }
}
