//! Fixed-point integration helpers shared by the trackers and control laws.
//!
//! Two rounding conventions are in play and both are intentional:
//! - `Integrator` divides by the tick frequency with Rust's `/` and `%`, which
//!   truncate toward zero; the remainder keeps the sign of the accumulator.
//! - `single_pole` and `shift_carry` divide by powers of two with `>>`, an
//!   arithmetic shift that floors toward negative infinity; the carried
//!   remainder is therefore always non-negative.
//!
//! Accumulators are `i64` so a large rate (e.g. a trajectory acceleration near
//! `i32::MAX`) cannot overflow; results are saturated back to `i32`.

/// Saturating narrow from `i64`.
#[inline]
pub fn saturate_i32(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

/// Clamp `v` into `[-limit, limit]`.
#[inline]
pub fn clamp_symmetric(v: i32, limit: i32) -> i32 {
    v.clamp(-limit, limit)
}

/// Accumulator/remainder pair integrating a per-second rate once per tick.
///
/// `acc += rate; tracked += acc / freq; acc %= freq` with truncating division.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Integrator {
    acc: i64,
}

impl Integrator {
    pub const fn new() -> Self {
        Self { acc: 0 }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.acc = 0;
    }

    /// Carried remainder, always in `(-freq, freq)`.
    #[inline]
    pub fn remainder(&self) -> i64 {
        self.acc
    }

    /// Add one tick's worth of `rate` to `tracked`.
    #[inline]
    pub fn step(&mut self, tracked: &mut i32, rate: i32, freq: i32) {
        let freq = i64::from(freq);
        self.acc += i64::from(rate);
        let whole = self.acc / freq;
        self.acc %= freq;
        *tracked = saturate_i32(i64::from(*tracked) + whole);
    }
}

/// One step of the shift-based single-pole low-pass:
/// `integral += input + (y << k) - y; y = integral >> k; integral -= y << k`.
///
/// The new output is `((2^k - 1) * y + input) / 2^k`, floored.
#[inline]
pub fn single_pole(integral: &mut i64, input: i64, output: i32, shift: u32) -> i32 {
    let y = i64::from(output);
    *integral += input + ((y << shift) - y);
    let next = *integral >> shift;
    *integral -= next << shift;
    saturate_i32(next)
}

/// Add `x` to `round` and return the whole multiples of `2^k` it now holds,
/// keeping the (non-negative) remainder in `round`.
#[inline]
pub fn shift_carry(round: &mut i64, x: i64, shift: u32) -> i64 {
    *round += x;
    let carry = *round >> shift;
    *round -= carry << shift;
    carry
}

/// Signed distance `a - b` on a circle of `cyc` counts, wrapped into
/// `[-cyc/2, cyc/2]`.
#[inline]
pub fn cycle_subtract(a: i32, b: i32, cyc: i32) -> i32 {
    let mut d = a - b;
    if d > (cyc >> 1) {
        d -= cyc;
    }
    if d < -(cyc >> 1) {
        d += cyc;
    }
    d
}

/// Midpoint of two angles on a circle of `cyc` counts, taking the short arc.
#[inline]
pub fn cycle_average(a: i32, b: i32, cyc: i32) -> i32 {
    let half = cyc >> 1;
    let mut avg = (a + b) >> 1;
    if (a - b).abs() > half {
        if avg >= half {
            avg -= half;
        } else {
            avg += half;
        }
    }
    avg
}

/// Euclidean modulus; always in `[0, m)`.
#[inline]
pub fn cycle_mod(a: i32, m: i32) -> i32 {
    a.rem_euclid(m)
}

/// Mean of circular samples, unwrapped around the first sample.
///
/// Samples more than half a circle away from `data[0]` are shifted by one
/// circle before summing. The mean is truncated and folded into `[0, cyc)`.
pub fn cycle_data_average(data: &[u16], cyc: i32) -> i32 {
    let Some(&first) = data.first() else {
        return 0;
    };
    let first = i32::from(first);
    let half = cyc >> 1;
    let mut sum = i64::from(first);
    for &raw in &data[1..] {
        let raw = i32::from(raw);
        let sub = raw - first;
        let unwrapped = if sub > half {
            raw - cyc
        } else if sub < -half {
            raw + cyc
        } else {
            raw
        };
        sum += i64::from(unwrapped);
    }
    let len = i64::try_from(data.len()).unwrap_or(i64::MAX);
    cycle_mod(saturate_i32(sum / len), cyc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn integrator_truncates_toward_zero_for_negative_rates() {
        let mut acc = Integrator::new();
        let mut v = 0;
        acc.step(&mut v, -30_000, 20_000);
        // floor division would give -2 with remainder +10_000
        assert_eq!(v, -1);
        assert_eq!(acc.remainder(), -10_000);
    }

    #[test]
    fn integrator_carries_fractional_rate() {
        let mut acc = Integrator::new();
        let mut v = 0;
        for _ in 0..20 {
            acc.step(&mut v, 1_000, 20_000);
        }
        assert_eq!(v, 1);
        assert_eq!(acc.remainder(), 0);
    }

    #[test]
    fn integrator_saturates_instead_of_overflowing() {
        let mut acc = Integrator::new();
        let mut v = i32::MAX - 1;
        acc.step(&mut v, i32::MAX, 1);
        assert_eq!(v, i32::MAX);
    }

    #[test]
    fn single_pole_floors_negative_inputs() {
        let mut integral = 0;
        let y = single_pole(&mut integral, -1, 0, 5);
        assert_eq!(y, -1);
        assert_eq!(integral, 31);
    }

    #[test]
    fn single_pole_converges_to_constant_input() {
        let mut integral = 0;
        let mut y = 0;
        for _ in 0..2_000 {
            y = single_pole(&mut integral, 20_000, y, 5);
        }
        assert_eq!(y, 20_000);
    }

    #[test]
    fn shift_carry_keeps_non_negative_remainder() {
        let mut round = 0;
        assert_eq!(shift_carry(&mut round, -1, 10), -1);
        assert_eq!(round, 1023);
        assert_eq!(shift_carry(&mut round, 1, 10), 1);
        assert_eq!(round, 0);
    }

    #[rstest]
    #[case(10, 16_380, 16_384, 14)]
    #[case(16_380, 10, 16_384, -14)]
    #[case(100, 50, 16_384, 50)]
    #[case(8_192, 0, 16_384, 8_192)]
    fn cycle_subtract_wraps(#[case] a: i32, #[case] b: i32, #[case] cyc: i32, #[case] want: i32) {
        assert_eq!(cycle_subtract(a, b, cyc), want);
    }

    #[rstest]
    #[case(100, 200, 150)]
    #[case(16_380, 10, 3)]
    #[case(10, 16_380, 3)]
    fn cycle_average_takes_short_arc(#[case] a: i32, #[case] b: i32, #[case] want: i32) {
        assert_eq!(cycle_average(a, b, 16_384), want);
    }

    #[test]
    fn cycle_data_average_handles_wrap() {
        let data = [16_382, 16_383, 0, 1];
        // unwrapped: 16382, 16383, 16384, 16385 -> 16383.5 -> 16383
        assert_eq!(cycle_data_average(&data, 16_384), 16_383);
    }

    #[test]
    fn cycle_data_average_folds_negative_mean() {
        let data = [0, 16_383, 16_383, 16_383];
        // unwrapped: 0, -1, -1, -1 -> -3/4 truncates to 0
        assert_eq!(cycle_data_average(&data, 16_384), 0);
        let data = [1, 16_380, 16_380, 16_380];
        // 1 - 12 = -11 -> -2 -> 16382
        assert_eq!(cycle_data_average(&data, 16_384), 16_382);
    }

    #[test]
    fn cycle_mod_is_euclidean() {
        assert_eq!(cycle_mod(-1, 200), 199);
        assert_eq!(cycle_mod(400, 200), 0);
    }
}
