//! The closed set of asset tags recognized by consensus.
//!
//! Every transaction input and output carries exactly one of these
//! tags. The ordering is fixed; validation rejects anything else.

/// All supported asset tags, in catalog order.
pub const ASSET_TYPES: [&str; 14] = [
    "XHV", "XAG", "XAU", "XAUD", "XBTC", "XCAD", "XCHF", "XCNY", "XEUR", "XGBP", "XJPY", "XNOK",
    "XNZD", "XUSD",
];

/// The native coin.
pub const XHV: &str = "XHV";

/// The stable quote asset all xAsset conversions route through.
pub const XUSD: &str = "XUSD";

/// Whether `tag` names an asset this chain recognizes.
pub fn is_supported_asset(tag: &str) -> bool {
    ASSET_TYPES.contains(&tag)
}

/// Whether `tag` is an xAsset, i.e. supported but neither XHV nor XUSD.
pub fn is_xasset(tag: &str) -> bool {
    is_supported_asset(tag) && tag != XHV && tag != XUSD
}
