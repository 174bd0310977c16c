//! Volume conversions (§4.1): `set_volume(0..100)` exposes both a
//! logarithmic and a linear variant. `to_log` maps a linear fraction onto
//! a perceptual logarithmic scale; `to_linear` is its analytic inverse.
//! Formula per spec: `log = round(50 · log10(1 + 100·x))` where `x` is
//! the linear fraction `value / max`.

/// Converts a linear volume `value` out of `max` into the logarithmic
/// 0..100 scale the UI/peer volume slider expects.
pub fn to_log(value: u32, max: u32) -> u8 {
    if max == 0 {
        return 0;
    }
    let x = value as f64 / max as f64;
    let log = 50.0 * (1.0 + 100.0 * x).log10();
    log.round().clamp(0.0, 100.0) as u8
}

/// The analytic inverse of [`to_log`]: given a logarithmic volume
/// `log_value` (0..100), returns the linear value out of `max`.
pub fn to_linear(log_value: u32, max: u32) -> u8 {
    let exponent = log_value as f64 / 50.0;
    let x = (10f64.powf(exponent) - 1.0) / 100.0;
    (x * max as f64).round().clamp(0.0, max as f64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_linear_maps_to_zero_log() {
        assert_eq!(to_log(0, 100), 0);
    }

    #[test]
    fn full_linear_maps_close_to_one_hundred_log() {
        let log = to_log(100, 100);
        assert!((99..=100).contains(&log));
    }

    #[test]
    fn round_trip_linear_to_log_to_linear_within_one_unit() {
        for v in [0u32, 1, 10, 25, 50, 63, 80, 99, 100] {
            let log = to_log(v, 100);
            let back = to_linear(log as u32, 100);
            let diff = (back as i32 - v as i32).abs();
            assert!(diff <= 1, "v={v} log={log} back={back} diff={diff}");
        }
    }

    #[test]
    fn round_trip_log_to_linear_to_log_within_one_unit() {
        for v in [0u32, 1, 10, 25, 50, 63, 80, 99, 100] {
            let linear = to_linear(v, 100);
            let back = to_log(linear as u32, 100);
            let diff = (back as i32 - v as i32).abs();
            assert!(diff <= 1, "v={v} linear={linear} back={back} diff={diff}");
        }
    }

    #[test]
    fn monotonic_increasing() {
        let mut last = 0u8;
        for v in 0..=100u32 {
            let log = to_log(v, 100);
            assert!(log >= last);
            last = log;
        }
    }
}
