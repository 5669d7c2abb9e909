//! Content fingerprints for datasets and cache entries.
//!
//! - `dataset_hash`: exact identity of an aligned price table (dates, labels,
//!   price bits), recorded in cache sidecars and run manifests.
//! - `cache_key`: identity of an acquisition request, used as the cache file
//!   name so different universes, ranges or alignments never collide.

use chrono::NaiveDate;

use crate::data::{AlignmentPolicy, AssetSpec};
use crate::series::PriceTable;

/// Hex length of short fingerprints used in file names and run ids.
pub const SHORT_HASH_LEN: usize = 16;

/// First [`SHORT_HASH_LEN`] hex characters of the BLAKE3 hash of `bytes`.
pub fn short_hash(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex.as_str()[..SHORT_HASH_LEN].to_string()
}

/// Full BLAKE3 hex digest of a price table.
///
/// Prices are hashed by bit pattern, so any change in any value, label or
/// date produces a different digest.
pub fn dataset_hash(table: &PriceTable) -> String {
    let mut hasher = blake3::Hasher::new();
    for label in table.assets() {
        hasher.update(label.as_bytes());
        hasher.update(&[0]);
    }
    for date in table.dates() {
        hasher.update(date.to_string().as_bytes());
    }
    for label in table.assets() {
        if let Some(col) = table.column(label) {
            for p in col {
                hasher.update(&p.to_bits().to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Cache key for an acquisition request.
///
/// Asset order matters: the cached table keeps its columns in request order.
/// The provider name keeps synthetic and downloaded tables apart.
pub fn cache_key(
    provider: &str,
    assets: &[AssetSpec],
    start: NaiveDate,
    end: NaiveDate,
    policy: AlignmentPolicy,
) -> String {
    let mut canonical = format!("{provider};");
    for a in assets {
        canonical.push_str(&a.label);
        canonical.push('=');
        canonical.push_str(&a.symbol);
        canonical.push(';');
    }
    canonical.push_str(&format!("{start}..{end};{policy}"));
    short_hash(canonical.as_bytes())
}
