/// Seedable linear congruential generator for workload variability.
///
/// Same recurrence as the classic C library `rand()`: 32-bit state, the
/// output is bits 16..31 of the state reduced to `[0, 32768)`. Only ever
/// driven from one task, so no synchronisation.
#[derive(Clone, Debug)]
pub struct Lcg {
    state: u32,
}

const MULTIPLIER: u32 = 1_103_515_245;
const INCREMENT: u32 = 12_345;

/// Exclusive upper bound of [`Lcg::next`].
pub const RAND_RANGE: u32 = 32_768;

impl Lcg {
    pub const fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn seed(&mut self, value: u32) {
        self.state = value;
    }

    pub fn next(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        (self.state / 65_536) % RAND_RANGE
    }

    /// Uniform-ish draw from `min..=max`. A reversed range yields `min`.
    pub fn in_range(&mut self, min: u32, max: u32) -> u32 {
        if max <= min {
            return min;
        }
        // Span in u64: the full u32 range has one value more than u32 holds.
        let span = u64::from(max - min) + 1;
        min + (u64::from(self.next()) % span) as u32
    }
}

impl Default for Lcg {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sequence_for_seed_one() {
        let mut rng = Lcg::new(1);
        // 1 * 1103515245 + 12345 = 1103527590; / 65536 = 16838
        assert_eq!(rng.next(), 16838);
        assert_eq!(rng.next(), 5758);
        assert_eq!(rng.next(), 10113);
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = Lcg::new(1);
        let mut b = Lcg::new(1);
        for _ in 0..256 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_reseed_restarts_stream() {
        let mut rng = Lcg::new(42);
        let first: [u32; 4] = core::array::from_fn(|_| rng.next());
        rng.seed(42);
        let again: [u32; 4] = core::array::from_fn(|_| rng.next());
        assert_eq!(first, again);
    }

    #[test]
    fn test_in_range_is_inclusive_and_bounded() {
        let mut rng = Lcg::new(7);
        let mut seen_min = false;
        let mut seen_max = false;
        for _ in 0..2000 {
            let v = rng.in_range(1, 7);
            assert!((1..=7).contains(&v));
            seen_min |= v == 1;
            seen_max |= v == 7;
        }
        assert!(seen_min && seen_max);
        assert_eq!(rng.in_range(5, 5), 5);
        assert_eq!(rng.in_range(9, 3), 9);
    }

    #[test]
    fn test_in_range_full_width() {
        let mut a = Lcg::new(3);
        let mut b = Lcg::new(3);
        for _ in 0..100 {
            assert_eq!(a.in_range(0, u32::MAX), b.next());
        }
        assert!(a.in_range(u32::MAX - 1, u32::MAX) >= u32::MAX - 1);
    }

    #[test]
    fn test_output_below_range() {
        let mut rng = Lcg::new(0xdead_beef);
        for _ in 0..1000 {
            assert!(rng.next() < RAND_RANGE);
        }
    }
}
