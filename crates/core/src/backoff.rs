#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStep {
    /// Sleep duration in milliseconds, jitter included.
    pub sleep_ms: u64,
    /// Base delay to feed into the next step.
    pub next_backoff_ms: u64,
}

/// Exponential backoff with additive jitter.
///
/// `jitter_seed` is reduced modulo `current_backoff_ms / 2 + 1`, so the sleep never exceeds
/// one and a half times the current base delay. The next base delay doubles up to
/// `max_backoff_ms`. All arithmetic saturates.
pub fn next_backoff(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffStep {
    if current_backoff_ms == 0 {
        return BackoffStep {
            sleep_ms: 0,
            next_backoff_ms: 0,
        };
    }

    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;
    let sleep_ms = current_backoff_ms.saturating_add(jitter);
    let next_backoff_ms = current_backoff_ms.saturating_mul(2).min(max_backoff_ms);

    BackoffStep {
        sleep_ms,
        next_backoff_ms,
    }
}

pub fn jitter_seed() -> u64 {
    rand::random::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_adds_jitter() {
        let step = next_backoff(100, 1000, 25);
        assert_eq!(step.sleep_ms, 125);
        assert_eq!(step.next_backoff_ms, 200);
    }

    #[test]
    fn jitter_is_bounded_by_half_the_base() {
        let step = next_backoff(10, 1000, 1_000_003);
        assert!(step.sleep_ms <= 15, "sleep={}", step.sleep_ms);
    }

    #[test]
    fn next_delay_is_capped() {
        let step = next_backoff(800, 1000, 0);
        assert_eq!(step.sleep_ms, 800);
        assert_eq!(step.next_backoff_ms, 1000);
    }

    #[test]
    fn zero_base_disables_sleeping() {
        let step = next_backoff(0, 1000, 77);
        assert_eq!(step, BackoffStep { sleep_ms: 0, next_backoff_ms: 0 });
    }

    #[test]
    fn saturates_near_u64_max() {
        let step = next_backoff(u64::MAX, u64::MAX, u64::MAX);
        assert_eq!(step.sleep_ms, u64::MAX);
        assert_eq!(step.next_backoff_ms, u64::MAX);
    }
}
