use std::time::Duration;

use rand::Rng;

/// Uniform integer in `[min, max]`, both ends inclusive.
///
/// Bounds given in the wrong order are swapped rather than rejected.
pub fn generate_random_delay<R: Rng + ?Sized>(min: u64, max: u64, rng: &mut R) -> u64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rng.gen_range(lo..=hi)
}

/// Cooperative throttle between provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomDelay {
    pub min: Duration,
    pub max: Duration,
}

impl RandomDelay {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self::from_millis(0, 0)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let ms = generate_random_delay(
            self.min.as_millis() as u64,
            self.max.as_millis() as u64,
            rng,
        );
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let d = generate_random_delay(1_000, 5_000, &mut rng);
            assert!((1_000..=5_000).contains(&d));
        }
    }

    #[test]
    fn both_bounds_are_reachable() {
        let mut rng = StdRng::seed_from_u64(42);
        let seen: Vec<u64> = (0..500)
            .map(|_| generate_random_delay(3, 4, &mut rng))
            .collect();
        assert!(seen.contains(&3));
        assert!(seen.contains(&4));
    }

    #[test]
    fn equal_bounds_yield_that_value() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(generate_random_delay(250, 250, &mut rng), 250);
        assert_eq!(generate_random_delay(0, 0, &mut rng), 0);
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let d = generate_random_delay(10, 2, &mut rng);
            assert!((2..=10).contains(&d));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let delay = RandomDelay::from_millis(100, 900);
        let a: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(3);
            (0..5).map(|_| delay.sample(&mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(3);
            (0..5).map(|_| delay.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
        assert!(a
            .iter()
            .all(|d| *d >= Duration::from_millis(100) && *d <= Duration::from_millis(900)));
    }

    #[test]
    fn none_is_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(RandomDelay::none().sample(&mut rng), Duration::ZERO);
    }
}
