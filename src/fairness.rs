//! Provably-fair crash point derivation.
//!
//! Each round commits to `sha256(server_seed)` before any bet is taken
//! and reveals `server_seed` when it crashes, so every client can
//! recompute the crash point from `(server_seed, client_seed, nonce)`
//! and check it against the commitment. The derivation is pure and
//! total: any seed pair and nonce yields a multiplier in
//! [1.00, max_multiplier].

use crate::config::FairnessConfig;
use crate::history::RoundHistoryEntry;
use crate::round::Multiplier;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Bits of HMAC output consumed for the uniform draw.
const DRAW_BITS: u32 = 52;

/// Public commitment published in `new-game` before bets open.
pub fn hash_server_seed(server_seed: &[u8; 32]) -> String {
    hex::encode(Sha256::digest(server_seed))
}

/// Derive the crash point for a round.
///
/// `h = HMAC-SHA256(server_seed, "{client_seed}:{nonce}")`; the first 52
/// bits of `h` make a uniform draw in [0, 1) which the inverse-CDF of
/// the payout curve maps to a heavy-tailed multiplier.
pub fn compute_crash_point(
    server_seed: &[u8; 32],
    client_seed: &str,
    nonce: u64,
    params: &FairnessConfig,
) -> Multiplier {
    let mut mac = HmacSha256::new_from_slice(server_seed).expect("hmac accepts any key length");
    mac.update(client_seed.as_bytes());
    mac.update(b":");
    mac.update(nonce.to_string().as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let draw = u64::from_be_bytes(prefix) >> (64 - DRAW_BITS);
    let r = draw as f64 / (1u64 << DRAW_BITS) as f64;

    crash_point_from_unit(r, params)
}

/// Map a uniform draw in [0, 1) to a crash multiplier.
fn crash_point_from_unit(r: f64, params: &FairnessConfig) -> Multiplier {
    if r < params.house_edge {
        return Multiplier::ONE;
    }
    let hundredths = (100.0 * (1.0 - params.house_edge) / (1.0 - r)).floor() as u64;
    Multiplier::from_hundredths(hundredths.clamp(100, params.max_multiplier_hundredths))
}

/// Audit a finished round: the revealed seed must match the published
/// commitment and re-derive the recorded crash point.
pub fn verify(entry: &RoundHistoryEntry, params: &FairnessConfig) -> bool {
    let Ok(seed_bytes) = hex::decode(&entry.server_seed) else {
        return false;
    };
    let Ok(server_seed) = <[u8; 32]>::try_from(seed_bytes.as_slice()) else {
        return false;
    };
    if hash_server_seed(&server_seed) != entry.server_seed_hash {
        return false;
    }
    compute_crash_point(&server_seed, &entry.client_seed, entry.nonce, params) == entry.crash_point
}
