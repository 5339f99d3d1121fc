//! Maps per-channel threshold exceedances to a trading signal.
//!
//! Channel priority is fixed: the buy channel wins over the sell channel.
//! The middle channel is produced by the model and thresholded like the
//! others, but no rule reads it.

use crate::domain::errors::DecisionError;
use crate::domain::types::Signal;

/// Zero-based index of the buy channel (`model_prediction_V1`).
pub const BUY_CHANNEL: usize = 0;
/// Zero-based index of the unconsulted channel (`model_prediction_V2`).
pub const UNUSED_CHANNEL: usize = 1;
/// Zero-based index of the sell channel (`model_prediction_V3`).
pub const SELL_CHANNEL: usize = 2;
/// Channels a row must carry for the policy to be defined.
pub const REQUIRED_CHANNELS: usize = 3;

/// Select the action for one row of exceed-threshold flags.
pub fn decide(exceeded: &[bool]) -> Result<Signal, DecisionError> {
    if exceeded.len() < REQUIRED_CHANNELS {
        return Err(DecisionError::MissingChannel {
            channel: exceeded.len() + 1,
            available: exceeded.len(),
        });
    }

    if exceeded[BUY_CHANNEL] {
        Ok(Signal::Buy)
    } else if exceeded[SELL_CHANNEL] {
        Ok(Signal::Sell)
    } else {
        Ok(Signal::Hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tuples() -> Vec<[bool; 3]> {
        (0..8u8)
            .map(|bits| [bits & 1 != 0, bits & 2 != 0, bits & 4 != 0])
            .collect()
    }

    #[test]
    fn test_buy_channel_wins() {
        for tuple in all_tuples().into_iter().filter(|t| t[BUY_CHANNEL]) {
            assert_eq!(decide(&tuple), Ok(Signal::Buy), "{:?}", tuple);
        }
    }

    #[test]
    fn test_sell_when_buy_not_exceeded() {
        for tuple in all_tuples()
            .into_iter()
            .filter(|t| !t[BUY_CHANNEL] && t[SELL_CHANNEL])
        {
            assert_eq!(decide(&tuple), Ok(Signal::Sell), "{:?}", tuple);
        }
    }

    #[test]
    fn test_hold_otherwise() {
        for tuple in all_tuples()
            .into_iter()
            .filter(|t| !t[BUY_CHANNEL] && !t[SELL_CHANNEL])
        {
            assert_eq!(decide(&tuple), Ok(Signal::Hold), "{:?}", tuple);
        }
    }

    #[test]
    fn test_middle_channel_is_ignored() {
        for tuple in all_tuples() {
            let mut flipped = tuple;
            flipped[UNUSED_CHANNEL] = !flipped[UNUSED_CHANNEL];
            assert_eq!(decide(&tuple), decide(&flipped), "{:?}", tuple);
        }
        assert_eq!(decide(&[false, true, false]), Ok(Signal::Hold));
    }

    #[test]
    fn test_extra_channels_do_not_matter() {
        assert_eq!(decide(&[false, false, true, true]), Ok(Signal::Sell));
    }

    #[test]
    fn test_missing_channel_is_fatal() {
        assert_eq!(
            decide(&[true, false]),
            Err(DecisionError::MissingChannel {
                channel: 3,
                available: 2
            })
        );
        assert!(decide(&[]).is_err());
    }
}
