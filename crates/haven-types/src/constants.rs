//! Consensus constants and the hard-fork schedule.

/// Atomic units per coin (10^12).
pub const COIN: u64 = 1_000_000_000_000;

/// Total emission cap before the tail subsidy takes over.
pub const MONEY_SUPPLY: u64 = u64::MAX;

/// Right-shift applied to the remaining supply to obtain the base reward.
pub const EMISSION_SPEED_FACTOR: u64 = 20;

/// Tail-emission floor per minute of chain time.
pub const FINAL_SUBSIDY_PER_MINUTE: u64 = 300_000_000_000;

/// Target seconds between blocks.
pub const DIFFICULTY_TARGET: u64 = 120;

/// Coinbase outputs stay locked for this many blocks.
pub const CRYPTONOTE_MINED_MONEY_UNLOCK_WINDOW: u64 = 60;

/// Hard cap on the number of transactions referenced by one block.
pub const CRYPTONOTE_MAX_TX_PER_BLOCK: usize = 0x1000_0000;

/// Miner rewards are clamped down to a multiple of this between hf 2 and 4.
pub const BASE_REWARD_CLAMP_THRESHOLD: u64 = 100_000_000;

/// Amounts below this are decomposed separately as dust in v1 coinbases.
pub const DEFAULT_DUST_THRESHOLD: u64 = 2_000_000_000;

/// Reference median used by the block-weight penalty before enough
/// blocks exist.
pub const CRYPTONOTE_BLOCK_GRANTED_FULL_REWARD_ZONE: u64 = 300_000;

/// A pricing record may be used by a transaction for this many blocks
/// after the record's height.
pub const PRICING_RECORD_VALID_BLOCKS: u64 = 10;

/// Current block header versions used for the genesis block.
pub const CURRENT_BLOCK_MAJOR_VERSION: u8 = 1;
pub const CURRENT_BLOCK_MINOR_VERSION: u8 = 0;

// --- Transaction format versions ------------------------------------------

/// First version carrying pricing-record height / burnt / minted fields.
pub const OFFSHORE_TRANSACTION_VERSION: u64 = 3;

/// First version with per-output unlock times (and no prefix unlock time).
pub const POU_TRANSACTION_VERSION: u64 = 5;

/// First version with conversion collateral indices.
pub const COLLATERAL_TRANSACTION_VERSION: u64 = 6;

/// First version serializing the unified haven input/output variants.
pub const HAVEN_TYPES_TRANSACTION_VERSION: u64 = 7;

/// Highest version this node understands.
pub const CURRENT_TRANSACTION_VERSION: u64 = 7;

/// `offshore_data` is carried on the wire only for versions in this range.
pub const OFFSHORE_DATA_LAST_VERSION: u64 = 5;

// --- Hard forks ------------------------------------------------------------

/// Network upgrade heights relevant to the transaction core. Only the
/// ordering is consensus-critical to this crate.
pub mod hf {
    /// Miner transactions become version 2 and outputs merge into one.
    pub const HF_VERSION_DYNAMIC_FEE: u8 = 4;

    /// Per-output unlock times; directional MA/spot rate selection.
    pub const HF_PER_OUTPUT_UNLOCK_VERSION: u8 = 16;

    /// xAsset conversion fees drop to 0.5%.
    pub const HF_VERSION_XASSET_FEES_V2: u8 = 17;

    /// Conversions require XHV collateral; conversion fees become 1.5%.
    pub const HF_VERSION_USE_COLLATERAL: u8 = 18;

    /// Outputs carry a one-byte view tag.
    pub const HF_VERSION_VIEW_TAGS: u8 = 21;
}
