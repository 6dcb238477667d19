use braid_types::identity::PublicIdentity;
use braid_types::primitives::Address;

use crate::hash::{blake3_hash, keccak256};

/// Derive the account address of a validator identity.
///
/// Ethereum keys use the Ethereum rule, `keccak256(x ‖ y)[12..]`. Every
/// other scheme uses `BLAKE3(tagged key)[0..20]`, so equal key bytes under
/// different schemes never collide.
pub fn address_of(identity: &PublicIdentity) -> Address {
    let mut address = [0u8; 20];
    match identity {
        PublicIdentity::Ethereum(key) => {
            let hash = keccak256(&key[1..]);
            address.copy_from_slice(&hash[12..]);
        }
        other => {
            let hash = blake3_hash(&other.to_bytes());
            address.copy_from_slice(&hash[..20]);
        }
    }
    address
}
