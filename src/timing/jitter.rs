//! Seeded jitter source
//!
//! All randomness in the timing stage comes from one ChaCha8 stream per day,
//! so a fixed seed reproduces every anchor, offset and jitter draw.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Redraw limit before falling back to a one-minute nudge
const MAX_DRAWS: usize = 32;

#[derive(Debug, Clone)]
pub struct Jitter {
    rng: ChaCha8Rng,
    min: i32,
    max: i32,
}

impl Jitter {
    pub fn new(seed: u64, min: i32, max: i32) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Per-day stream derived from a run seed
    pub fn for_day(seed: u64, day: usize, min: i32, max: i32) -> Self {
        Self::new(seed ^ ((day as u64 + 1).wrapping_mul(0xd6e8_feb8_6659_fd93)), min, max)
    }

    pub fn sample(&mut self) -> i32 {
        self.rng.gen_range(self.min..=self.max)
    }

    /// Jitter `minute`, redrawing until the result is off the quarter hour
    pub fn apply(&mut self, minute: u32) -> u32 {
        for _ in 0..MAX_DRAWS {
            let shifted = (minute as i64 + i64::from(self.sample())).max(0) as u32;
            if shifted % 15 != 0 {
                return shifted;
            }
        }
        if minute % 15 == 0 {
            minute + 1
        } else {
            minute
        }
    }

    /// Push `minute` forward by a fresh non-negative draw until `accept` holds
    pub fn push_forward(&mut self, minute: u32, accept: impl Fn(u32) -> bool) -> u32 {
        let upper = self.max.max(1) as u32;
        for _ in 0..MAX_DRAWS {
            let shifted = minute + self.rng.gen_range(0..=upper);
            if accept(shifted) {
                return shifted;
            }
        }
        let mut t = minute;
        while !accept(t) {
            t += 1;
        }
        t
    }

    /// Uniform draw in `[lo, hi]`
    pub fn offset_in(&mut self, lo: u32, hi: u32) -> u32 {
        if lo >= hi {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    /// Irregular anchor step weight
    pub fn step_weight(&mut self) -> f64 {
        self.rng.gen_range(0.7..=1.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Jitter::new(99, -7, 8);
        let mut b = Jitter::new(99, -7, 8);
        let xs: Vec<u32> = (0..50).map(|i| a.apply(600 + i * 15)).collect();
        let ys: Vec<u32> = (0..50).map(|i| b.apply(600 + i * 15)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_apply_never_returns_quarter_hour() {
        let mut jitter = Jitter::new(7, -7, 8);
        for minute in (420..1425).step_by(5) {
            let t = jitter.apply(minute);
            assert_ne!(t % 15, 0);
            assert!(t + 7 >= minute && t <= minute + 8);
        }
    }

    #[test]
    fn test_day_streams_differ() {
        let mut mon = Jitter::for_day(1, 0, -7, 8);
        let mut tue = Jitter::for_day(1, 1, -7, 8);
        let a: Vec<i32> = (0..20).map(|_| mon.sample()).collect();
        let b: Vec<i32> = (0..20).map(|_| tue.sample()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_offsets_within_range() {
        let mut jitter = Jitter::new(3, -7, 8);
        for _ in 0..100 {
            let o = jitter.offset_in(50, 90);
            assert!((50..=90).contains(&o));
        }
        assert_eq!(jitter.offset_in(60, 60), 60);
    }

    #[test]
    fn test_push_forward_resamples() {
        let mut jitter = Jitter::new(9, -7, 8);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..64 {
            let t = jitter.push_forward(600, |m| m % 15 != 0);
            assert!(t > 600 && t <= 608);
            seen.insert(t);
        }
        assert!(seen.len() > 1);

        let mut a = Jitter::new(3, -7, 8);
        let mut b = Jitter::new(3, -7, 8);
        assert_eq!(a.push_forward(615, |m| m % 15 != 0), b.push_forward(615, |m| m % 15 != 0));
    }
}
