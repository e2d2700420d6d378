//! Coinbase construction and genesis-block generation.

use haven_crypto::stealth::AccountPublicAddress;
use haven_crypto::{
    derive_public_key, derive_view_tag, generate_key_derivation, Hash, KeyPair,
};
use haven_types::constants::hf::HF_VERSION_VIEW_TAGS;
use haven_types::constants::{
    BASE_REWARD_CLAMP_THRESHOLD, CRYPTONOTE_MINED_MONEY_UNLOCK_WINDOW,
    CURRENT_BLOCK_MAJOR_VERSION, CURRENT_BLOCK_MINOR_VERSION, DEFAULT_DUST_THRESHOLD,
};

use crate::builder::set_tx_out;
use crate::codec::decode_transaction;
use crate::extra::{add_extra_nonce_to_tx_extra, add_tx_pub_key_to_extra, sort_tx_extra};
use crate::reward::{decompose_amount_into_digits, get_block_reward};
use crate::types::{Block, Transaction, TxIn};
use crate::TxError;

/// Opaque proof-of-work hasher: `(block, height, threads) -> hash`.
pub type PowHashFn<'a> = dyn Fn(&Block, u64, u32) -> Result<Hash, TxError> + 'a;

/// Build the coinbase transaction for a block at `height` paying
/// `miner_address`.
#[allow(clippy::too_many_arguments)]
pub fn construct_miner_tx(
    height: u64,
    median_weight: u64,
    already_generated_coins: u64,
    current_block_weight: u64,
    fee: u64,
    miner_address: &AccountPublicAddress,
    extra_nonce: &[u8],
    max_outs: usize,
    hard_fork_version: u8,
) -> Result<Transaction, TxError> {
    if max_outs == 0 {
        return Err(TxError::Config("coinbase needs at least one output"));
    }

    let mut tx = Transaction::new();

    let tx_key = KeyPair::generate();
    add_tx_pub_key_to_extra(&mut tx.prefix.extra, &tx_key.public);
    if !extra_nonce.is_empty() {
        add_extra_nonce_to_tx_extra(&mut tx.prefix.extra, extra_nonce)?;
    }
    tx.prefix.extra = sort_tx_extra(&tx.prefix.extra)?;

    let mut block_reward = get_block_reward(
        median_weight,
        current_block_weight,
        already_generated_coins,
        hard_fork_version,
    )?;
    block_reward += fee;

    // From hard fork 2 the low digits are clamped off (back to
    // emission); from hard fork 4 a single dusty output replaces the
    // digit decomposition entirely.
    if (2..4).contains(&hard_fork_version) {
        block_reward -= block_reward % BASE_REWARD_CLAMP_THRESHOLD;
    }

    let dust_threshold = if hard_fork_version >= 2 {
        0
    } else {
        DEFAULT_DUST_THRESHOLD
    };
    let mut out_amounts = decompose_amount_into_digits(block_reward, dust_threshold);

    if height == 0 || hard_fork_version >= 4 {
        // Merge the smallest chunks until the output count fits.
        while out_amounts.len() > max_outs {
            let merged = out_amounts.remove(0);
            out_amounts[0] += merged;
        }
    } else if out_amounts.len() > max_outs {
        return Err(TxError::Config("coinbase output limit exceeded"));
    }

    let use_view_tags = hard_fork_version >= HF_VERSION_VIEW_TAGS;
    let unlock_time = height + CRYPTONOTE_MINED_MONEY_UNLOCK_WINDOW;

    let mut summary_amounts: u64 = 0;
    for (no, &amount) in out_amounts.iter().enumerate() {
        let derivation =
            generate_key_derivation(&miner_address.view_public_key, &tx_key.secret)?;
        let out_key =
            derive_public_key(&derivation, no as u64, &miner_address.spend_public_key)?;
        let view_tag = use_view_tags.then(|| derive_view_tag(&derivation, no as u64));

        summary_amounts += amount;
        tx.prefix.vout.push(set_tx_out(
            amount,
            "XHV",
            unlock_time,
            false,
            out_key,
            view_tag,
        ));
    }
    if summary_amounts != block_reward {
        return Err(TxError::Economic(format!(
            "coinbase outputs sum to {summary_amounts}, reward is {block_reward}"
        )));
    }

    tx.prefix.version = if hard_fork_version >= 4 { 2 } else { 1 };
    tx.prefix.unlock_time = unlock_time;
    tx.prefix.vin.push(TxIn::Gen { height });

    tx.invalidate_hashes();
    Ok(tx)
}

/// 256-bit proof-of-work check: `hash · difficulty` must not overflow
/// 2^256.
pub fn check_hash(hash: &Hash, difficulty: u64) -> bool {
    let mut carry: u128 = 0;
    for word in hash.chunks(8) {
        let w = u64::from_le_bytes(word.try_into().expect("hash splits into 8-byte words"));
        let product = w as u128 * difficulty as u128 + carry;
        carry = product >> 64;
    }
    carry == 0
}

/// Scan nonces (starting from the block's current one) until the PoW
/// hash meets `difficulty`. The thread count is passed through to the
/// hasher untouched.
pub fn find_nonce_for_given_block(
    pow_hash: &PowHashFn,
    block: &mut Block,
    difficulty: u64,
    height: u64,
    threads: u32,
) -> Result<(), TxError> {
    loop {
        let hash = pow_hash(block, height, threads)?;
        if check_hash(&hash, difficulty) {
            block.invalidate_hashes();
            return Ok(());
        }
        block.header.nonce = match block.header.nonce.checked_add(1) {
            Some(n) => n,
            None => return Err(TxError::Economic("nonce space exhausted".into())),
        };
    }
}

/// Construct the genesis block from its hex-encoded coinbase.
pub fn generate_genesis_block(
    genesis_tx_hex: &str,
    nonce: u32,
    pow_hash: &PowHashFn,
) -> Result<Block, TxError> {
    let tx_blob = hex::decode(genesis_tx_hex)
        .map_err(|e| TxError::Format(format!("genesis coinbase hex: {e}")))?;
    let miner_tx = decode_transaction(&tx_blob)?;

    let mut block = Block {
        miner_tx,
        ..Default::default()
    };
    block.header.major_version = CURRENT_BLOCK_MAJOR_VERSION;
    block.header.minor_version = CURRENT_BLOCK_MINOR_VERSION;
    block.header.timestamp = 0;
    block.header.nonce = nonce;

    find_nonce_for_given_block(pow_hash, &mut block, 1, 0, 1)?;
    block.invalidate_hashes();
    Ok(block)
}
