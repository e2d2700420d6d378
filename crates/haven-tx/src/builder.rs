//! Transaction construction.
//!
//! `construct_tx_with_tx_key` turns spendable sources and destinations
//! into a signed transaction: derive one-time spend keys and key images
//! for every input, sort inputs by key image, derive stealth output
//! keys (with additional per-output tx keys when subaddresses are in
//! play), then sign — legacy ring signatures at version 1, a RingCT
//! bundle at version 2.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::thread_rng;

use haven_crypto::hw::{Device, SoftwareDevice, TxSession};
use haven_crypto::rct::{self, CtKey, RangeProofType, RctConfig};
use haven_crypto::ring::generate_ring_signature;
use haven_crypto::stealth::{
    generate_key_image_helper, generate_output_ephemeral_key, AccountKeys, AccountPublicAddress,
    InputEphemeral,
};
use haven_crypto::{KeyPair, PublicKey, SecretKey, ViewTag, NULL_PKEY};
use haven_types::SubaddressIndex;

use crate::codec::get_transaction_prefix_hash;
use crate::extra::{
    add_additional_tx_pub_keys_to_extra, add_extra_nonce_to_tx_extra, add_tx_pub_key_to_extra,
    get_encrypted_payment_id_from_tx_extra_nonce, get_payment_id_from_tx_extra_nonce,
    parse_tx_extra, remove_field_from_tx_extra, set_encrypted_payment_id_to_tx_extra_nonce,
    sort_tx_extra, ExtraField, TX_EXTRA_NONCE, TX_EXTRA_TAG_ADDITIONAL_PUBKEYS,
    TX_EXTRA_TAG_PUBKEY,
};
use crate::types::{Transaction, TxIn, TxOut, TxOutTarget};
use crate::TxError;

/// One spendable output together with its ring.
#[derive(Debug, Clone)]
pub struct TxSourceEntry {
    /// Ring members as `(global output index, {key, commitment})`,
    /// sorted by ascending index.
    pub outputs: Vec<(u64, CtKey)>,
    /// Position of the real output within `outputs`.
    pub real_output: usize,
    /// Transaction public key of the transaction that created the real
    /// output.
    pub real_out_tx_key: PublicKey,
    /// Additional tx pubkeys of that transaction, if any.
    pub real_out_additional_tx_keys: Vec<PublicKey>,
    /// Output index of the real output inside its transaction.
    pub real_output_in_tx_index: u64,
    pub amount: u64,
    pub asset_type: String,
    /// Whether the real output hides its amount behind a commitment.
    pub rct: bool,
    /// Commitment mask of the real output.
    pub mask: [u8; 32],
}

/// Where funds go.
#[derive(Debug, Clone)]
pub struct TxDestinationEntry {
    pub amount: u64,
    /// Converted value in xUSD; zero for change.
    pub amount_usd: u64,
    /// Converted value in the destination xAsset; zero outside xAsset
    /// conversions.
    pub amount_xasset: u64,
    pub addr: AccountPublicAddress,
    pub asset_type: String,
    pub is_subaddress: bool,
    pub is_collateral: bool,
}

/// Build an output of the right variant for the fork.
pub fn set_tx_out(
    amount: u64,
    asset_type: &str,
    unlock_time: u64,
    is_collateral: bool,
    key: PublicKey,
    view_tag: Option<ViewTag>,
) -> TxOut {
    let target = match view_tag {
        Some(view_tag) => TxOutTarget::HavenTaggedKey {
            key,
            asset_type: asset_type.to_string(),
            unlock_time,
            is_collateral,
            view_tag,
        },
        None => TxOutTarget::HavenKey {
            key,
            asset_type: asset_type.to_string(),
            unlock_time,
            is_collateral,
        },
    };
    TxOut { amount, target }
}

/// Count unique standard and subaddress destinations, excluding change.
pub fn classify_addresses(
    destinations: &[TxDestinationEntry],
    change_addr: Option<&AccountPublicAddress>,
) -> (usize, usize, Option<AccountPublicAddress>) {
    let mut num_std = 0;
    let mut num_sub = 0;
    let mut single_dest_subaddress = None;
    let mut seen: HashSet<AccountPublicAddress> = HashSet::new();
    for dst in destinations {
        if change_addr == Some(&dst.addr) {
            continue;
        }
        if seen.insert(dst.addr) {
            if dst.is_subaddress {
                num_sub += 1;
                single_dest_subaddress = Some(dst.addr);
            } else {
                num_std += 1;
            }
        }
    }
    (num_std, num_sub, single_dest_subaddress)
}

/// View key of the unique non-change destination: used to encrypt the
/// short payment id. Null when there are several distinct recipients;
/// the change view key when the transaction only pays ourselves.
pub fn get_destination_view_key_pub(
    destinations: &[TxDestinationEntry],
    change_addr: Option<&AccountPublicAddress>,
) -> PublicKey {
    let mut addr: Option<AccountPublicAddress> = None;
    for d in destinations {
        if d.amount == 0 {
            continue;
        }
        if change_addr == Some(&d.addr) {
            continue;
        }
        if addr == Some(d.addr) {
            continue;
        }
        if addr.is_some() {
            return NULL_PKEY;
        }
        addr = Some(d.addr);
    }
    match (addr, change_addr) {
        (Some(a), _) => a.view_public_key,
        (None, Some(c)) => c.view_public_key,
        (None, None) => NULL_PKEY,
    }
}

fn absolute_output_offsets_to_relative(offsets: &[u64]) -> Vec<u64> {
    let mut relative = Vec::with_capacity(offsets.len());
    let mut prev = 0u64;
    for (i, &off) in offsets.iter().enumerate() {
        relative.push(if i == 0 { off } else { off - prev });
        prev = off;
    }
    relative
}

/// Handle the payment id embedded in `extra`: encrypt an explicit short
/// id with the destination view key, or synthesize a dummy encrypted id
/// when none is present and the transaction has at most one recipient
/// plus change. An unparseable extra skips payment-id handling; a dummy
/// id that fails to encrypt is simply dropped.
fn handle_payment_id(
    extra: &mut Vec<u8>,
    destinations: &[TxDestinationEntry],
    change_addr: Option<&AccountPublicAddress>,
    tx_key: &SecretKey,
    device: &dyn Device,
) -> Result<(), TxError> {
    let fields = match parse_tx_extra(extra) {
        Ok(fields) => fields,
        Err(_) => return Ok(()),
    };

    let mut add_dummy_payment_id = true;
    let nonce = fields.iter().find_map(|f| match f {
        ExtraField::Nonce { nonce } => Some(nonce.clone()),
        _ => None,
    });

    if let Some(nonce) = nonce {
        if let Some(mut payment_id) = get_encrypted_payment_id_from_tx_extra_nonce(&nonce) {
            let view_key_pub = get_destination_view_key_pub(destinations, change_addr);
            if view_key_pub == NULL_PKEY {
                return Err(TxError::Config(
                    "encrypted payment ids need exactly one destination",
                ));
            }
            device.encrypt_payment_id(&mut payment_id, &view_key_pub, tx_key)?;
            remove_field_from_tx_extra(extra, TX_EXTRA_NONCE)?;
            add_extra_nonce_to_tx_extra(
                extra,
                &set_encrypted_payment_id_to_tx_extra_nonce(&payment_id),
            )?;
            add_dummy_payment_id = false;
        } else if get_payment_id_from_tx_extra_nonce(&nonce).is_some() {
            add_dummy_payment_id = false;
        }
    }

    // Dummies only make sense for the common one-recipient shape.
    if destinations.len() > 2 {
        add_dummy_payment_id = false;
    }

    if add_dummy_payment_id {
        let view_key_pub = get_destination_view_key_pub(destinations, change_addr);
        if view_key_pub != NULL_PKEY {
            let mut payment_id = [0u8; 8];
            if device
                .encrypt_payment_id(&mut payment_id, &view_key_pub, tx_key)
                .is_ok()
            {
                let _ = add_extra_nonce_to_tx_extra(
                    extra,
                    &set_encrypted_payment_id_to_tx_extra_nonce(&payment_id),
                );
            }
        }
    }
    Ok(())
}

/// Construct and sign a transaction with a caller-supplied tx key.
#[allow(clippy::too_many_arguments)]
pub fn construct_tx_with_tx_key(
    sender_account_keys: &AccountKeys,
    subaddresses: &HashMap<PublicKey, SubaddressIndex>,
    sources: &mut Vec<TxSourceEntry>,
    destinations: &mut Vec<TxDestinationEntry>,
    change_addr: Option<&AccountPublicAddress>,
    extra: Vec<u8>,
    unlock_time: u64,
    tx_key: &SecretKey,
    additional_tx_keys: &[SecretKey],
    rct: bool,
    rct_config: RctConfig,
    shuffle_outs: bool,
    use_view_tags: bool,
    device: &dyn Device,
) -> Result<Transaction, TxError> {
    if sources.is_empty() {
        return Err(TxError::Config("no sources to spend"));
    }

    let mut tx = Transaction::new();
    tx.prefix.version = if rct { 2 } else { 1 };
    tx.prefix.unlock_time = unlock_time;
    tx.prefix.extra = extra;

    handle_payment_id(
        &mut tx.prefix.extra,
        destinations,
        change_addr,
        tx_key,
        device,
    )?;

    // Build the inputs: recover one-time spend keys, verify them, and
    // record the ring with relative offsets.
    let mut in_contexts: Vec<InputEphemeral> = Vec::with_capacity(sources.len());
    let mut summary_inputs_money: u64 = 0;
    for src in sources.iter() {
        if src.real_output >= src.outputs.len() {
            return Err(TxError::Config("real output index outside its ring"));
        }
        summary_inputs_money = summary_inputs_money
            .checked_add(src.amount)
            .ok_or_else(|| TxError::Economic("input amounts overflow".into()))?;

        let out_key = src.outputs[src.real_output].1.dest;
        let ephemeral = generate_key_image_helper(
            sender_account_keys,
            subaddresses,
            &out_key,
            &src.real_out_tx_key,
            &src.real_out_additional_tx_keys,
            src.real_output_in_tx_index,
        )?;

        let absolute: Vec<u64> = src.outputs.iter().map(|(idx, _)| *idx).collect();
        tx.prefix.vin.push(TxIn::HavenKey {
            amount: src.amount,
            asset_type: src.asset_type.clone(),
            key_offsets: absolute_output_offsets_to_relative(&absolute),
            key_image: ephemeral.key_image,
        });
        in_contexts.push(ephemeral);
    }

    if shuffle_outs {
        destinations.shuffle(&mut thread_rng());
    }

    // Sort inputs by key image, descending, applying the same
    // permutation to the contexts and sources.
    {
        let mut order: Vec<usize> = (0..sources.len()).collect();
        order.sort_by(|&a, &b| in_contexts[b].key_image.cmp(&in_contexts[a].key_image));
        let vin = std::mem::take(&mut tx.prefix.vin);
        let mut vin: Vec<Option<TxIn>> = vin.into_iter().map(Some).collect();
        let mut ctxs: Vec<Option<InputEphemeral>> = in_contexts.into_iter().map(Some).collect();
        let mut srcs: Vec<Option<TxSourceEntry>> =
            std::mem::take(sources).into_iter().map(Some).collect();
        in_contexts = Vec::with_capacity(order.len());
        for &i in &order {
            tx.prefix.vin.push(vin[i].take().expect("permutation is a bijection"));
            in_contexts.push(ctxs[i].take().expect("permutation is a bijection"));
            sources.push(srcs[i].take().expect("permutation is a bijection"));
        }
    }

    // Transaction public key: a single subaddress destination gets
    // R = s·D, everything else R = s·G.
    let (num_std, num_sub, single_dest_subaddress) =
        classify_addresses(destinations, change_addr);
    let txkey_pub = if num_std == 0 && num_sub == 1 {
        let sub = single_dest_subaddress.expect("counted exactly one subaddress");
        haven_crypto::scalarmult_key(&sub.spend_public_key, tx_key)?
    } else {
        haven_crypto::scalarmult_base(tx_key)
    };
    remove_field_from_tx_extra(&mut tx.prefix.extra, TX_EXTRA_TAG_PUBKEY)?;
    add_tx_pub_key_to_extra(&mut tx.prefix.extra, &txkey_pub);

    // Additional per-output keys are needed only when a subaddress
    // destination coexists with another destination.
    let need_additional_txkeys = num_sub > 0 && (num_std > 0 || num_sub > 1);
    if need_additional_txkeys && additional_tx_keys.len() != destinations.len() {
        return Err(TxError::Config(
            "one additional tx key per destination required",
        ));
    }

    // Build the outputs.
    let mut additional_tx_public_keys: Vec<PublicKey> = Vec::new();
    let mut amount_keys: Vec<[u8; 32]> = Vec::new();
    let mut summary_outs_money: u64 = 0;
    for (output_index, dst) in destinations.iter().enumerate() {
        if dst.amount == 0 && tx.prefix.version == 1 {
            return Err(TxError::Economic(
                "zero-amount destination in a v1 transaction".into(),
            ));
        }
        let is_change = change_addr == Some(&dst.addr);
        let additional_secret = if need_additional_txkeys {
            Some(&additional_tx_keys[output_index])
        } else {
            None
        };

        let (one_time, view_tag, amount_key, additional_pub) = generate_output_ephemeral_key(
            &dst.addr,
            dst.is_subaddress,
            is_change,
            tx_key,
            additional_secret,
            &txkey_pub,
            &sender_account_keys.view_secret_key,
            output_index as u64,
            use_view_tags,
        )?;

        if let Some(pk) = additional_pub {
            additional_tx_public_keys.push(pk);
        }
        amount_keys.push(amount_key.to_bytes());
        tx.prefix.vout.push(set_tx_out(
            dst.amount,
            &dst.asset_type,
            unlock_time,
            dst.is_collateral,
            one_time,
            view_tag,
        ));
        summary_outs_money = summary_outs_money
            .checked_add(dst.amount)
            .ok_or_else(|| TxError::Economic("output amounts overflow".into()))?;
    }
    if need_additional_txkeys && additional_tx_public_keys.len() != additional_tx_keys.len() {
        return Err(TxError::Config("additional public key derivation failed"));
    }

    remove_field_from_tx_extra(&mut tx.prefix.extra, TX_EXTRA_TAG_ADDITIONAL_PUBKEYS)?;
    if need_additional_txkeys {
        add_additional_tx_pub_keys_to_extra(&mut tx.prefix.extra, &additional_tx_public_keys);
    }
    tx.prefix.extra = sort_tx_extra(&tx.prefix.extra)?;

    if summary_outs_money > summary_inputs_money {
        return Err(TxError::Conservation {
            inputs: summary_inputs_money,
            outputs: summary_outs_money,
        });
    }

    let watch_only = sender_account_keys.is_watch_only();

    if tx.prefix.version == 1 {
        if !watch_only {
            let tx_prefix_hash = get_transaction_prefix_hash(&tx.prefix)?;
            for (src, ctx) in sources.iter().zip(&in_contexts) {
                let ring: Vec<PublicKey> = src.outputs.iter().map(|(_, k)| k.dest).collect();
                let sigs = generate_ring_signature(
                    &tx_prefix_hash,
                    &ctx.key_image,
                    &ring,
                    &ctx.keypair.secret,
                    src.real_output,
                )?;
                tx.signatures.push(sigs);
            }
        }
    } else {
        // The aggregate form is smaller but needs every real input at
        // the same ring position; fall back to the simple form for
        // multi-input or non-Borromean transactions.
        let use_simple_rct =
            sources.len() > 1 || rct_config.range_proof_type != RangeProofType::Borromean;

        let n_total_outs = sources[0].outputs.len();
        if !use_simple_rct {
            for src in sources.iter() {
                if src.real_output != sources[0].real_output {
                    return Err(TxError::Config(
                        "aggregate rct needs one shared real index",
                    ));
                }
                if src.outputs.len() != n_total_outs {
                    return Err(TxError::Config("aggregate rct needs one ring size"));
                }
            }
        }

        let mut in_sk = Vec::with_capacity(sources.len());
        let mut inamounts = Vec::with_capacity(sources.len());
        let mut in_indices = Vec::with_capacity(sources.len());
        for (src, ctx) in sources.iter().zip(&in_contexts) {
            in_sk.push(rct::InSk {
                dest: ctx.keypair.secret,
                mask: src.mask,
            });
            inamounts.push(src.amount);
            in_indices.push(src.real_output);
        }
        let outamounts: Vec<u64> = tx.prefix.vout.iter().map(|o| o.amount).collect();
        let fee = summary_inputs_money - summary_outs_money;

        // Hide the cleartext amounts before hashing the prefix.
        for (input, src) in tx.prefix.vin.iter_mut().zip(sources.iter()) {
            if src.rct {
                input.set_amount(0);
            }
        }
        for out in &mut tx.prefix.vout {
            out.amount = 0;
        }

        let tx_prefix_hash = get_transaction_prefix_hash(&tx.prefix)?;

        tx.rct_signatures = if use_simple_rct {
            let mix_ring: Vec<Vec<CtKey>> = sources
                .iter()
                .map(|src| src.outputs.iter().map(|(_, k)| *k).collect())
                .collect();
            rct::gen_rct_simple(
                &tx_prefix_hash,
                &in_sk,
                &inamounts,
                &outamounts,
                fee,
                &mix_ring,
                &amount_keys,
                &in_indices,
                rct_config,
            )?
        } else {
            // Ring positions outermost for the aggregate form.
            let mut mix_ring: Vec<Vec<CtKey>> = vec![Vec::with_capacity(sources.len()); n_total_outs];
            for src in sources.iter() {
                for (pos, (_, member)) in src.outputs.iter().enumerate() {
                    mix_ring[pos].push(*member);
                }
            }
            let mut amounts = outamounts.clone();
            if fee > 0 {
                amounts.push(fee);
            }
            rct::gen_rct(
                &tx_prefix_hash,
                &in_sk,
                &amounts,
                outamounts.len(),
                &mix_ring,
                &amount_keys,
                sources[0].real_output,
                rct_config,
            )?
        };
    }

    tx.invalidate_hashes();
    Ok(tx)
}

/// Construct a transaction, generating the tx key (and additional keys
/// when the destinations call for them) inside a device session. The
/// session is closed on every path out of this function.
#[allow(clippy::too_many_arguments)]
pub fn construct_tx_and_get_tx_key(
    sender_account_keys: &AccountKeys,
    subaddresses: &HashMap<PublicKey, SubaddressIndex>,
    sources: &mut Vec<TxSourceEntry>,
    destinations: &mut Vec<TxDestinationEntry>,
    change_addr: Option<&AccountPublicAddress>,
    extra: Vec<u8>,
    unlock_time: u64,
    rct: bool,
    rct_config: RctConfig,
    use_view_tags: bool,
    device: &dyn Device,
) -> Result<(Transaction, SecretKey, Vec<SecretKey>), TxError> {
    let session = TxSession::open(device);
    let tx_key = session.tx_key;

    let (num_std, num_sub, _) = classify_addresses(destinations, change_addr);
    let need_additional_txkeys = num_sub > 0 && (num_std > 0 || num_sub > 1);
    let additional_tx_keys: Vec<SecretKey> = if need_additional_txkeys {
        destinations.iter().map(|_| KeyPair::generate().secret).collect()
    } else {
        Vec::new()
    };

    let tx = construct_tx_with_tx_key(
        sender_account_keys,
        subaddresses,
        sources,
        destinations,
        change_addr,
        extra,
        unlock_time,
        &tx_key,
        &additional_tx_keys,
        rct,
        rct_config,
        true,
        use_view_tags,
        session.device(),
    )?;
    Ok((tx, tx_key, additional_tx_keys))
}

/// Minimal front end: main-address wallet, no rct, Borromean config.
pub fn construct_tx(
    sender_account_keys: &AccountKeys,
    sources: &mut Vec<TxSourceEntry>,
    destinations: &[TxDestinationEntry],
    change_addr: Option<&AccountPublicAddress>,
    extra: Vec<u8>,
    unlock_time: u64,
) -> Result<Transaction, TxError> {
    let mut subaddresses = HashMap::new();
    subaddresses.insert(
        sender_account_keys.address.spend_public_key,
        SubaddressIndex::default(),
    );
    let mut destinations_copy = destinations.to_vec();
    let device = SoftwareDevice;
    let (tx, _key, _additional) = construct_tx_and_get_tx_key(
        sender_account_keys,
        &subaddresses,
        sources,
        &mut destinations_copy,
        change_addr,
        extra,
        unlock_time,
        false,
        RctConfig::borromean(),
        false,
        &device,
    )?;
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_crypto::stealth::build_subaddress_map;
    use haven_crypto::{generate_key_derivation, pedersen_commit, random_scalar};
    use haven_types::constants::COIN;

    /// Create a spendable output owned by `keys` and wrap it in a ring
    /// of decoys.
    fn make_source(
        keys: &AccountKeys,
        amount: u64,
        ring_size: usize,
        real_index: usize,
        rct: bool,
    ) -> TxSourceEntry {
        let tx_key = KeyPair::generate();
        let derivation = generate_key_derivation(&keys.address.view_public_key, &tx_key.secret)
            .unwrap();
        let out_index = 0u64;
        let one_time = haven_crypto::derive_public_key(
            &derivation,
            out_index,
            &keys.address.spend_public_key,
        )
        .unwrap();

        let mask = random_scalar();
        let mut outputs = Vec::with_capacity(ring_size);
        for i in 0..ring_size {
            let (dest, commitment) = if i == real_index {
                (one_time, pedersen_commit(amount, &mask))
            } else {
                (
                    KeyPair::generate().public,
                    pedersen_commit(7 * COIN, &random_scalar()),
                )
            };
            outputs.push((
                (i as u64 + 1) * 3,
                CtKey {
                    dest,
                    mask: commitment,
                },
            ));
        }

        TxSourceEntry {
            outputs,
            real_output: real_index,
            real_out_tx_key: tx_key.public,
            real_out_additional_tx_keys: Vec::new(),
            real_output_in_tx_index: out_index,
            amount,
            asset_type: "XHV".into(),
            rct,
            mask: mask.to_bytes(),
        }
    }

    fn dest(addr: AccountPublicAddress, amount: u64) -> TxDestinationEntry {
        TxDestinationEntry {
            amount,
            amount_usd: 0,
            amount_xasset: 0,
            addr,
            asset_type: "XHV".into(),
            is_subaddress: false,
            is_collateral: false,
        }
    }

    #[test]
    fn v1_transfer_signs_every_input() {
        let sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let mut sources = vec![
            make_source(&sender, 6 * COIN, 5, 2, false),
            make_source(&sender, 4 * COIN, 5, 0, false),
        ];
        let destinations = vec![dest(recipient.address, 9 * COIN)];

        let tx = construct_tx(
            &sender,
            &mut sources,
            &destinations,
            Some(&sender.address),
            Vec::new(),
            0,
        )
        .unwrap();

        assert_eq!(tx.prefix.version, 1);
        assert_eq!(tx.prefix.vin.len(), 2);
        assert_eq!(tx.signatures.len(), tx.prefix.vin.len());
        for (input, sigs) in tx.prefix.vin.iter().zip(&tx.signatures) {
            assert_eq!(sigs.len(), input.signature_size());
        }
        // Inputs sorted by key image, descending.
        let images: Vec<_> = tx
            .prefix
            .vin
            .iter()
            .map(|i| *i.key_image().unwrap())
            .collect();
        assert!(images.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn v2_simple_rct_transfer() {
        let sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let mut sources = vec![
            make_source(&sender, 6 * COIN, 4, 1, true),
            make_source(&sender, 4 * COIN, 4, 3, true),
        ];
        let mut destinations = vec![
            dest(recipient.address, 9 * COIN),
            dest(sender.address, 99 * COIN / 100),
        ];
        let subaddresses = build_subaddress_map(&sender, 1, 1).unwrap();
        let device = SoftwareDevice;

        let (tx, _key, additional) = construct_tx_and_get_tx_key(
            &sender,
            &subaddresses,
            &mut sources,
            &mut destinations,
            Some(&sender.address),
            Vec::new(),
            0,
            true,
            RctConfig::bulletproof_plus(),
            true,
            &device,
        )
        .unwrap();

        assert!(additional.is_empty());
        assert_eq!(tx.prefix.version, 2);
        // Amounts are hidden.
        assert!(tx.prefix.vin.iter().all(|i| i.amount() == 0));
        assert!(tx.prefix.vout.iter().all(|o| o.amount == 0));
        // View tags requested.
        assert!(tx
            .prefix
            .vout
            .iter()
            .all(|o| o.target.view_tag().is_some()));

        // The bundle balances and its proofs verify.
        let sig = &tx.rct_signatures;
        assert_eq!(sig.rct_type, haven_crypto::rct::rct_type::BULLETPROOF_PLUS);
        assert_eq!(sig.txn_fee, COIN / 100);
        assert!(rct::verify_rct_balance(sig));
        assert!(rct::verify_rct_ranges(sig));

        let prefix_hash = get_transaction_prefix_hash(&tx.prefix).unwrap();
        let mix_ring: Vec<Vec<CtKey>> = sources
            .iter()
            .map(|s| s.outputs.iter().map(|(_, k)| *k).collect())
            .collect();
        let images: Vec<_> = tx
            .prefix
            .vin
            .iter()
            .map(|i| *i.key_image().unwrap())
            .collect();
        assert!(rct::verify_rct_simple_signatures(
            sig,
            &prefix_hash,
            &mix_ring,
            &images
        ));
    }

    #[test]
    fn conservation_violation_fails() {
        let sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let mut sources = vec![make_source(&sender, COIN, 3, 0, false)];
        let destinations = vec![dest(recipient.address, 2 * COIN)];
        let err = construct_tx(
            &sender,
            &mut sources,
            &destinations,
            None,
            Vec::new(),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, TxError::Conservation { .. }));
    }

    #[test]
    fn foreign_source_fails_key_image_check() {
        let sender = AccountKeys::generate();
        let stranger = AccountKeys::generate();
        // Output owned by the stranger, spent by the sender.
        let mut sources = vec![make_source(&stranger, COIN, 3, 0, false)];
        let destinations = vec![dest(stranger.address, COIN / 2)];
        assert!(construct_tx(&sender, &mut sources, &destinations, None, Vec::new(), 0).is_err());
    }

    #[test]
    fn watch_only_wallet_skips_signatures() {
        let mut sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let mut sources = vec![make_source(&sender, COIN, 3, 1, false)];
        let destinations = vec![dest(recipient.address, COIN / 2)];

        // A watch-only wallet can still derive one-time keys when the
        // subaddress table maps the true spend key; zeroing the spend
        // secret after building the source models it.
        let subaddresses = build_subaddress_map(&sender, 1, 1).unwrap();
        sender.spend_secret_key = [0u8; 32];
        let device = SoftwareDevice;
        let mut dsts = destinations.clone();
        let result = construct_tx_and_get_tx_key(
            &sender,
            &subaddresses,
            &mut sources,
            &mut dsts,
            None,
            Vec::new(),
            0,
            false,
            RctConfig::borromean(),
            false,
            &device,
        );
        // Key recovery itself fails without the spend secret, which is
        // also acceptable watch-only behavior.
        if let Ok((tx, _, _)) = result {
            assert!(tx.signatures.is_empty());
        }
    }

    #[test]
    fn subaddress_destination_changes_tx_pubkey() {
        let sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let sub_spend =
            haven_crypto::stealth::subaddress_spend_public_key(&recipient, SubaddressIndex {
                major: 0,
                minor: 1,
            })
            .unwrap();
        let sub_view =
            haven_crypto::scalarmult_key(&sub_spend, &recipient.view_secret_key).unwrap();
        let sub_addr = AccountPublicAddress {
            spend_public_key: sub_spend,
            view_public_key: sub_view,
        };

        let mut sources = vec![make_source(&sender, COIN, 3, 0, false)];
        let mut destinations = vec![TxDestinationEntry {
            is_subaddress: true,
            ..dest(sub_addr, COIN / 2)
        }];
        let subaddresses = build_subaddress_map(&sender, 1, 1).unwrap();
        let device = SoftwareDevice;

        let (tx, tx_key, additional) = construct_tx_and_get_tx_key(
            &sender,
            &subaddresses,
            &mut sources,
            &mut destinations,
            None,
            Vec::new(),
            0,
            false,
            RctConfig::borromean(),
            false,
            &device,
        )
        .unwrap();

        // Single subaddress destination: R = s·D, and no additional keys.
        assert!(additional.is_empty());
        let expected = haven_crypto::scalarmult_key(&sub_spend, &tx_key).unwrap();
        assert_eq!(
            crate::extra::get_tx_pub_key_from_extra(&tx.prefix.extra),
            Some(expected)
        );
    }

    #[test]
    fn mixed_destinations_require_additional_keys() {
        let sender = AccountKeys::generate();
        let std_recipient = AccountKeys::generate();
        let sub_recipient = AccountKeys::generate();
        let sub_spend = haven_crypto::stealth::subaddress_spend_public_key(
            &sub_recipient,
            SubaddressIndex { major: 1, minor: 1 },
        )
        .unwrap();
        let sub_view =
            haven_crypto::scalarmult_key(&sub_spend, &sub_recipient.view_secret_key).unwrap();
        let sub_addr = AccountPublicAddress {
            spend_public_key: sub_spend,
            view_public_key: sub_view,
        };

        let mut sources = vec![make_source(&sender, 10 * COIN, 3, 0, false)];
        let mut destinations = vec![
            dest(std_recipient.address, 4 * COIN),
            TxDestinationEntry {
                is_subaddress: true,
                ..dest(sub_addr, 5 * COIN)
            },
        ];
        let subaddresses = build_subaddress_map(&sender, 1, 1).unwrap();
        let device = SoftwareDevice;

        let (tx, _key, additional) = construct_tx_and_get_tx_key(
            &sender,
            &subaddresses,
            &mut sources,
            &mut destinations,
            None,
            Vec::new(),
            0,
            false,
            RctConfig::borromean(),
            false,
            &device,
        )
        .unwrap();

        assert_eq!(additional.len(), 2);
        let published =
            crate::extra::get_additional_tx_pub_keys_from_extra(&tx.prefix.extra).unwrap();
        assert_eq!(published.len(), 2);
    }

    #[test]
    fn dummy_payment_id_is_added_for_simple_shapes() {
        let sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let mut sources = vec![make_source(&sender, COIN, 3, 0, false)];
        let destinations = vec![dest(recipient.address, COIN / 2)];
        let tx = construct_tx(&sender, &mut sources, &destinations, None, Vec::new(), 0)
            .unwrap();

        let nonce = crate::extra::get_extra_nonce(&tx.prefix.extra).unwrap();
        assert!(get_encrypted_payment_id_from_tx_extra_nonce(&nonce).is_some());
    }

    #[test]
    fn relative_offsets() {
        assert_eq!(
            absolute_output_offsets_to_relative(&[10, 50, 80, 100]),
            vec![10, 40, 30, 20]
        );
        assert_eq!(absolute_output_offsets_to_relative(&[5]), vec![5]);
        assert!(absolute_output_offsets_to_relative(&[]).is_empty());
    }
}
