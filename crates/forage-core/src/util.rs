use std::time::Duration;

/// Pick a uniformly random duration in `[min, max]`.
///
/// Used for pacing delays between requests so traffic doesn't look
/// machine-regular. Returns `min` when the range is empty or inverted.
pub fn uniform_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span_ms = (max - min).as_millis() as u64;
    min + Duration::from_millis(rand_below(span_ms + 1))
}

// Deterministic jitter based on std — avoids pulling in the `rand` crate.
// Uses a simple xorshift seeded from the current time.
fn rand_below(bound: u64) -> u64 {
    if bound <= 1 {
        return 0;
    }
    // Seed from high-resolution clock — good enough for pacing, not crypto.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % bound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_between_stays_in_range() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(200);
        for _ in 0..100 {
            let d = uniform_between(min, max);
            assert!(d >= min);
            assert!(d <= max);
        }
    }

    #[test]
    fn uniform_between_degenerate_range_returns_min() {
        let d = Duration::from_millis(50);
        assert_eq!(uniform_between(d, d), d);
        assert_eq!(uniform_between(d, Duration::from_millis(10)), d);
    }

    #[test]
    fn rand_below_respects_bound() {
        for _ in 0..100 {
            assert!(rand_below(7) < 7);
        }
        assert_eq!(rand_below(0), 0);
        assert_eq!(rand_below(1), 0);
    }
}
