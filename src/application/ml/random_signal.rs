//! Placeholder signal source.
//!
//! Picks `hold`, `buy` or `sell` at random with fixed weights and never looks
//! at market data. Only selected with `SIGNAL_BACKEND=stub`, for wiring tests
//! of downstream consumers.

use crate::domain::types::Signal;
use rand::Rng;
use rand::seq::IndexedRandom;

const WEIGHTED_SIGNALS: [(Signal, f64); 3] =
    [(Signal::Hold, 0.6), (Signal::Buy, 0.2), (Signal::Sell, 0.2)];

pub fn random_signal<R: Rng + ?Sized>(rng: &mut R) -> Signal {
    WEIGHTED_SIGNALS
        .choose_weighted(rng, |(_, weight)| *weight)
        .map(|(signal, _)| *signal)
        .unwrap_or(Signal::Hold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_stub_is_deterministic_for_a_seed() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(random_signal(&mut a), random_signal(&mut b));
        }
    }

    #[test]
    fn test_stub_weights_favor_hold() {
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 5_000;
        let holds = (0..draws)
            .filter(|_| random_signal(&mut rng) == Signal::Hold)
            .count();
        let share = holds as f64 / draws as f64;
        assert!((0.55..0.65).contains(&share), "hold share {}", share);
    }
}
