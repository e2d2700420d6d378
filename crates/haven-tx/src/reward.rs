//! Emission schedule and amount decomposition for coinbase outputs.

use haven_types::constants::{
    CRYPTONOTE_BLOCK_GRANTED_FULL_REWARD_ZONE, DIFFICULTY_TARGET, EMISSION_SPEED_FACTOR,
    FINAL_SUBSIDY_PER_MINUTE, MONEY_SUPPLY,
};

use crate::TxError;

/// Base block reward after the big-block penalty.
///
/// The raw subsidy halves geometrically with the emitted supply down to
/// the tail-emission floor; blocks heavier than the median then forfeit
/// reward quadratically, to nothing at twice the median.
pub fn get_block_reward(
    median_weight: u64,
    current_block_weight: u64,
    already_generated_coins: u64,
    _hard_fork_version: u8,
) -> Result<u64, TxError> {
    let target_minutes = DIFFICULTY_TARGET / 60;
    let emission_speed = EMISSION_SPEED_FACTOR - (target_minutes - 1);
    let mut base_reward = (MONEY_SUPPLY - already_generated_coins) >> emission_speed;
    let tail = FINAL_SUBSIDY_PER_MINUTE * target_minutes;
    if base_reward < tail {
        base_reward = tail;
    }

    let median = median_weight.max(CRYPTONOTE_BLOCK_GRANTED_FULL_REWARD_ZONE);
    if current_block_weight <= median {
        return Ok(base_reward);
    }
    if current_block_weight > 2 * median {
        return Err(TxError::Economic(
            "block weight exceeds twice the median".into(),
        ));
    }

    // reward * (2·median·weight - median² - weight²) / median²
    let weight = current_block_weight as u128;
    let median = median as u128;
    let product = (2 * median * weight)
        .checked_sub(median * median)
        .and_then(|v| v.checked_sub(weight * weight))
        .ok_or_else(|| TxError::Economic("block weight penalty underflow".into()))?;
    let reward = base_reward as u128 * product / (median * median);
    Ok(reward as u64)
}

/// Split an amount into one chunk per decimal digit, collecting the
/// low digits below `dust_threshold` into a single dust amount. The
/// dust (if any) is emitted before the first above-threshold chunk.
pub fn decompose_amount_into_digits(amount: u64, dust_threshold: u64) -> Vec<u64> {
    let mut chunks = Vec::new();
    let mut dust: u64 = 0;
    let mut dust_handled = false;
    let mut amount = amount;
    let mut order: u64 = 1;

    while amount != 0 {
        let chunk = (amount % 10) * order;
        amount /= 10;
        order *= 10;

        if !dust_handled && dust + chunk <= dust_threshold {
            dust += chunk;
        } else {
            if !dust_handled {
                if dust != 0 {
                    chunks.push(dust);
                }
                dust_handled = true;
            }
            if chunk != 0 {
                chunks.push(chunk);
            }
        }
    }
    if !dust_handled && dust != 0 {
        chunks.push(dust);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_shrinks_with_emission() {
        let early = get_block_reward(0, 0, 0, 4).unwrap();
        let later = get_block_reward(0, 0, MONEY_SUPPLY / 2, 4).unwrap();
        assert!(early > later);
        assert!(later > 0);
    }

    #[test]
    fn tail_emission_floor() {
        let reward = get_block_reward(0, 0, MONEY_SUPPLY - 1, 4).unwrap();
        assert_eq!(
            reward,
            FINAL_SUBSIDY_PER_MINUTE * (DIFFICULTY_TARGET / 60)
        );
    }

    #[test]
    fn penalty_reduces_reward() {
        let median = CRYPTONOTE_BLOCK_GRANTED_FULL_REWARD_ZONE;
        let full = get_block_reward(median, median, 0, 4).unwrap();
        let penalized = get_block_reward(median, median + median / 2, 0, 4).unwrap();
        assert!(penalized < full);
        assert!(penalized > 0);
    }

    #[test]
    fn oversized_block_rejected() {
        let median = CRYPTONOTE_BLOCK_GRANTED_FULL_REWARD_ZONE;
        assert!(get_block_reward(median, 2 * median + 1, 0, 4).is_err());
    }

    #[test]
    fn decompose_no_dust_threshold() {
        assert_eq!(decompose_amount_into_digits(123, 0), vec![3, 20, 100]);
        assert_eq!(decompose_amount_into_digits(1_000_000, 0), vec![1_000_000]);
        assert!(decompose_amount_into_digits(0, 0).is_empty());
    }

    #[test]
    fn decompose_collects_dust() {
        // Digits 3 and 20 fall below the threshold and merge.
        assert_eq!(decompose_amount_into_digits(123, 50), vec![23, 100]);
        // Everything is dust.
        assert_eq!(decompose_amount_into_digits(123, 1000), vec![123]);
    }

    #[test]
    fn decompose_sums_back() {
        for amount in [1u64, 99, 1_234_567_890, u64::MAX / 2] {
            for threshold in [0u64, 10, 1_000_000] {
                let total: u64 = decompose_amount_into_digits(amount, threshold).iter().sum();
                assert_eq!(total, amount);
            }
        }
    }
}
