//! Router wait-timeout codec
//!
//! Routers hold a packet for a configurable number of cycles before dropping
//! it. The wait is stored as a 4-bit exponent `e` and a 4-bit mantissa `m`:
//!
//! - `e <= 4`: `value = (m + 16 - 2^(4 - e)) * 2^e`
//! - `e > 4`:  `value = (m + 16) * 2^e`
//!
//! Encoding solves the formula directly for each exponent up to 4 and falls
//! back to `e = floor(log2(value)) - 4` above that. The result is always
//! decoded again; a value which does not survive the round trip is rejected
//! with the nearest value the computed pair does represent.

use serde::{Deserialize, Serialize};

use crate::error::{NetExpError, Result};

/// Largest exponent or mantissa that fits in four bits
const FIELD_MAX: u32 = 15;

/// An encoded router timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouterTimeout {
    exponent: u8,
    mantissa: u8,
}

impl Default for RouterTimeout {
    /// 512 cycles
    fn default() -> Self {
        Self {
            exponent: 5,
            mantissa: 0,
        }
    }
}

impl RouterTimeout {
    /// Build from raw fields, which must both fit in four bits
    pub fn from_parts(exponent: u8, mantissa: u8) -> Result<Self> {
        if u32::from(exponent) > FIELD_MAX || u32::from(mantissa) > FIELD_MAX {
            return Err(NetExpError::InvalidParameter(format!(
                "timeout exponent/mantissa ({}, {}) must be in 0..=15",
                exponent, mantissa
            )));
        }
        Ok(Self { exponent, mantissa })
    }

    /// Encode `value`, failing unless it is represented exactly
    pub fn encode(value: u32) -> Result<Self> {
        let (e, m) = solve(value);
        let timeout = Self {
            exponent: e as u8,
            mantissa: m as u8,
        };

        let nearest = timeout.value();
        if nearest != value {
            return Err(NetExpError::InvalidTimeoutValue {
                requested: value,
                nearest,
            });
        }
        Ok(timeout)
    }

    /// The number of cycles this timeout represents
    pub fn value(&self) -> u32 {
        decode(self.exponent, self.mantissa)
    }

    pub fn exponent(&self) -> u8 {
        self.exponent
    }

    pub fn mantissa(&self) -> u8 {
        self.mantissa
    }
}

/// Decode an exponent/mantissa pair into a cycle count
pub fn decode(exponent: u8, mantissa: u8) -> u32 {
    let e = u32::from(exponent);
    let m = u32::from(mantissa);
    if e <= 4 {
        (m + 16 - (1 << (4 - e))) << e
    } else {
        (m + 16) << e
    }
}

/// Compute the clamped (e, m) candidate for `value`
fn solve(value: u32) -> (u32, u32) {
    let value = i64::from(value);
    let (e, m): (i64, i64) = match value {
        0 => (0, 0),
        v if v < 16 => (0, v),
        v if v < 48 => (1, v / 2 - 8),
        v if v < 112 => (2, v / 4 - 12),
        v if v < 240 => (3, v / 8 - 14),
        v if v < 512 => (4, v / 16 - 15),
        v => {
            let log2 = 63 - i64::from(v.leading_zeros());
            let e = (log2 - 4).max(0);
            (e, (v >> e) - 16)
        }
    };

    let clamp = |x: i64| x.clamp(0, i64::from(FIELD_MAX)) as u32;
    (clamp(e), clamp(m))
}
