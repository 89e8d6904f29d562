use std::time::Duration;

use crate::metric::ROUTE_COST_BROKEN;

/// Compares whether a < b mod 65536
///
/// # Arguments
///
/// * `a`: First one
/// * `b`: Second one
///
/// returns: bool
///
/// # Examples
///
/// ```
/// assert!(linkstate::util::seqno_less_than(5, 10000));
/// assert!(linkstate::util::seqno_less_than(65530, 5));
///
/// assert!(!linkstate::util::seqno_less_than(20000, 61000));
/// assert!(!linkstate::util::seqno_less_than(7, 7));
/// ```
pub fn seqno_less_than(a: u16, b: u16) -> bool {
    let x = b.wrapping_sub(a);
    0 < x && x < 32768
}

/// Signed distance from `old` to `new` mod 65536, in -32768..=32767
///
/// # Examples
///
/// ```
/// assert_eq!(linkstate::util::seqno_diff(5, 65530), 11);
/// assert_eq!(linkstate::util::seqno_diff(65530, 5), -11);
/// ```
pub fn seqno_diff(new: u16, old: u16) -> i32 {
    new.wrapping_sub(old) as i16 as i32
}

/// Shortcut for increment mod 2^16
pub fn increment(x: &mut u16) {
    *x = x.wrapping_add(1)
}

/// Adds two path costs, saturating at the broken route cost
pub fn sum_cost(cost_a: u32, cost_b: u32) -> u32 {
    cost_a.saturating_add(cost_b).min(ROUTE_COST_BROKEN)
}

fn vtime_millis(mantissa: u8, exponent: u8) -> u128 {
    ((16 + mantissa as u128) * 1000 << exponent) / 256
}

/// Decodes an RFC 3626 validity/interval byte: high nibble a, low nibble b,
/// value = (16 + a) * 2^b / 256 seconds
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// assert_eq!(linkstate::util::decode_vtime(0x48), Duration::from_secs(20));
/// assert_eq!(linkstate::util::decode_vtime(0x05), Duration::from_secs(2));
/// ```
pub fn decode_vtime(value: u8) -> Duration {
    Duration::from_millis(vtime_millis(value >> 4, value & 0x0F) as u64)
}

/// Encodes a duration as the largest representable vtime not above it,
/// clamped to the encodable range
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use linkstate::util::{decode_vtime, encode_vtime};
/// assert_eq!(encode_vtime(Duration::from_secs(20)), 0x48);
/// assert_eq!(decode_vtime(encode_vtime(Duration::from_secs(15))), Duration::from_secs(15));
/// assert_eq!(encode_vtime(Duration::ZERO), 0x00);
/// assert_eq!(encode_vtime(Duration::from_secs(100_000)), 0xFF);
/// ```
pub fn encode_vtime(interval: Duration) -> u8 {
    let millis = interval.as_millis();
    for exponent in (0..16u8).rev() {
        for mantissa in (0..16u8).rev() {
            if vtime_millis(mantissa, exponent) <= millis {
                return mantissa << 4 | exponent;
            }
        }
    }
    0
}

/// Applies a jitter of up to `pct` percent, shortening the interval
pub fn jittered(rng: &mut fastrand::Rng, relative: u64, pct: u8) -> u64 {
    if pct == 0 {
        return relative;
    }
    let jitter = relative * pct.min(100) as u64 / 100;
    relative - rng.u64(0..=jitter)
}

pub fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
