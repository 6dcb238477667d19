//! Validator identities over several signature schemes.
//!
//! [`PrivateIdentity`] is a closed variant: every operation matches all
//! schemes exhaustively. Public keys and signatures are the tagged types
//! from `braid_types::identity`, so any consumer can decode them without
//! knowing the originating scheme.
//!
//! | Scheme    | Message signed       | Signature          |
//! |-----------|----------------------|--------------------|
//! | Ed25519   | raw message          | 64 bytes           |
//! | Secp256k1 | `sha256(message)`    | 64 bytes compact   |
//! | Ethereum  | `keccak256(message)` | 65 bytes `r‖s‖v`   |
//! | BLS       | raw message, G2 sig  | 96 bytes           |

use std::fmt;

use braid_types::error::BraidError;
use braid_types::identity::{IdentitySignature, PublicIdentity, SchemeTag};
use ed25519_dalek::{Signer, Verifier};
use rand::RngCore;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use zeroize::Zeroize;

use crate::hash::{blake3_hash_domain, keccak256, sha256};

/// Domain separation tag for BLS signatures (basic suite).
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

const SECP_SEED_CONTEXT: &str = "braid 2024 secp256k1 key from seed";

/// A validator's secret key under one of the supported schemes.
pub enum PrivateIdentity {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256k1(secp256k1::SecretKey),
    Ethereum(secp256k1::SecretKey),
    Bls(blst::min_pk::SecretKey),
}

impl PrivateIdentity {
    /// Generate a fresh random identity.
    pub fn generate(scheme: SchemeTag) -> Result<Self, BraidError> {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let identity = Self::from_seed(scheme, &seed);
        seed.zeroize();
        identity
    }

    /// Derive an identity deterministically from a 32-byte seed.
    pub fn from_seed(scheme: SchemeTag, seed: &[u8; 32]) -> Result<Self, BraidError> {
        Ok(match scheme {
            SchemeTag::Ed25519 => Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(seed)),
            SchemeTag::Secp256k1 => Self::Secp256k1(secp_key_from_seed(seed)?),
            SchemeTag::Ethereum => Self::Ethereum(secp_key_from_seed(seed)?),
            SchemeTag::Bls => Self::Bls(
                blst::min_pk::SecretKey::key_gen(seed, &[]).map_err(|e| {
                    BraidError::InvalidKeyMaterial {
                        reason: format!("bls key generation: {:?}", e),
                    }
                })?,
            ),
        })
    }

    pub fn scheme(&self) -> SchemeTag {
        match self {
            Self::Ed25519(_) => SchemeTag::Ed25519,
            Self::Secp256k1(_) => SchemeTag::Secp256k1,
            Self::Ethereum(_) => SchemeTag::Ethereum,
            Self::Bls(_) => SchemeTag::Bls,
        }
    }

    /// Canonical encoding: scheme tag followed by the 32 secret bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(33);
        out.push(self.scheme().as_byte());
        match self {
            Self::Ed25519(sk) => out.extend_from_slice(&sk.to_bytes()),
            Self::Secp256k1(sk) | Self::Ethereum(sk) => out.extend_from_slice(&sk.secret_bytes()),
            Self::Bls(sk) => out.extend_from_slice(&sk.to_bytes()),
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BraidError> {
        let (tag, secret) = bytes.split_first().ok_or(BraidError::InvalidKeyMaterial {
            reason: "empty private key".to_string(),
        })?;
        let scheme = SchemeTag::from_byte(*tag)?;
        let invalid = |reason: String| BraidError::InvalidKeyMaterial { reason };
        Ok(match scheme {
            SchemeTag::Ed25519 => {
                let seed: [u8; 32] = secret
                    .try_into()
                    .map_err(|_| invalid(format!("ed25519 secret is {} bytes", secret.len())))?;
                Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed))
            }
            SchemeTag::Secp256k1 => Self::Secp256k1(
                secp256k1::SecretKey::from_slice(secret).map_err(|e| invalid(e.to_string()))?,
            ),
            SchemeTag::Ethereum => Self::Ethereum(
                secp256k1::SecretKey::from_slice(secret).map_err(|e| invalid(e.to_string()))?,
            ),
            SchemeTag::Bls => Self::Bls(
                blst::min_pk::SecretKey::from_bytes(secret)
                    .map_err(|e| invalid(format!("bls secret: {:?}", e)))?,
            ),
        })
    }

    /// The public counterpart.
    pub fn public_key(&self) -> PublicIdentity {
        match self {
            Self::Ed25519(sk) => PublicIdentity::Ed25519(sk.verifying_key().to_bytes()),
            Self::Secp256k1(sk) => {
                let secp = Secp256k1::signing_only();
                PublicIdentity::Secp256k1(sk.public_key(&secp).serialize())
            }
            Self::Ethereum(sk) => {
                let secp = Secp256k1::signing_only();
                PublicIdentity::Ethereum(sk.public_key(&secp).serialize_uncompressed())
            }
            Self::Bls(sk) => PublicIdentity::Bls(sk.sk_to_pk().to_bytes()),
        }
    }

    pub fn sign(&self, message: &[u8]) -> IdentitySignature {
        match self {
            Self::Ed25519(sk) => IdentitySignature::Ed25519(sk.sign(message).to_bytes()),
            Self::Secp256k1(sk) => {
                let secp = Secp256k1::signing_only();
                let msg = Message::from_digest(sha256(message));
                IdentitySignature::Secp256k1(secp.sign_ecdsa(&msg, sk).serialize_compact())
            }
            Self::Ethereum(sk) => {
                let secp = Secp256k1::signing_only();
                let msg = Message::from_digest(keccak256(message));
                let (rec_id, compact) = secp
                    .sign_ecdsa_recoverable(&msg, sk)
                    .serialize_compact();
                let mut sig = [0u8; 65];
                sig[..64].copy_from_slice(&compact);
                sig[64] = rec_id.to_i32() as u8;
                IdentitySignature::Ethereum(sig)
            }
            Self::Bls(sk) => IdentitySignature::Bls(sk.sign(message, BLS_DST, &[]).to_bytes()),
        }
    }
}

impl PartialEq for PrivateIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PrivateIdentity {}

impl fmt::Debug for PrivateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateIdentity({}, {:?})", self.scheme(), self.public_key())
    }
}

fn secp_key_from_seed(seed: &[u8; 32]) -> Result<secp256k1::SecretKey, BraidError> {
    // An out-of-range scalar is astronomically unlikely; re-hash until valid.
    let mut material = blake3_hash_domain(SECP_SEED_CONTEXT, seed);
    for _ in 0..16 {
        if let Ok(sk) = secp256k1::SecretKey::from_slice(&material) {
            material.zeroize();
            return Ok(sk);
        }
        material = blake3_hash_domain(SECP_SEED_CONTEXT, &material);
    }
    Err(BraidError::InvalidKeyMaterial {
        reason: "could not derive a secp256k1 scalar from seed".to_string(),
    })
}

/// Check that a public key is a valid point for its scheme.
pub fn validate_public(identity: &PublicIdentity) -> Result<(), BraidError> {
    let invalid = |reason: String| BraidError::InvalidKeyMaterial { reason };
    match identity {
        PublicIdentity::Ed25519(key) => {
            ed25519_dalek::VerifyingKey::from_bytes(key).map_err(|e| invalid(e.to_string()))?;
        }
        PublicIdentity::Secp256k1(key) => {
            secp256k1::PublicKey::from_slice(key).map_err(|e| invalid(e.to_string()))?;
        }
        PublicIdentity::Ethereum(key) => {
            if key[0] != 0x04 {
                return Err(invalid("ethereum key must be uncompressed".to_string()));
            }
            secp256k1::PublicKey::from_slice(key).map_err(|e| invalid(e.to_string()))?;
        }
        PublicIdentity::Bls(key) => {
            blst::min_pk::PublicKey::key_validate(key)
                .map_err(|e| invalid(format!("bls public key: {:?}", e)))?;
        }
    }
    Ok(())
}

/// Verify `signature` over `message` under `identity`.
pub fn verify(
    identity: &PublicIdentity,
    message: &[u8],
    signature: &IdentitySignature,
) -> Result<(), BraidError> {
    if identity.scheme() != signature.scheme() {
        return Err(BraidError::SchemeMismatch {
            key: identity.scheme().to_string(),
            signature: signature.scheme().to_string(),
        });
    }
    let bad = |reason: String| BraidError::InvalidSignature { reason };
    match (identity, signature) {
        (PublicIdentity::Ed25519(key), IdentitySignature::Ed25519(sig)) => {
            let vk = ed25519_dalek::VerifyingKey::from_bytes(key)
                .map_err(|e| BraidError::InvalidKeyMaterial {
                    reason: e.to_string(),
                })?;
            vk.verify(message, &ed25519_dalek::Signature::from_bytes(sig))
                .map_err(|e| bad(e.to_string()))
        }
        (PublicIdentity::Secp256k1(key), IdentitySignature::Secp256k1(sig)) => {
            let secp = Secp256k1::verification_only();
            let pk = secp256k1::PublicKey::from_slice(key).map_err(|e| {
                BraidError::InvalidKeyMaterial {
                    reason: e.to_string(),
                }
            })?;
            let sig = secp256k1::ecdsa::Signature::from_compact(sig)
                .map_err(|e| bad(e.to_string()))?;
            let msg = Message::from_digest(sha256(message));
            secp.verify_ecdsa(&msg, &sig, &pk)
                .map_err(|e| bad(e.to_string()))
        }
        (PublicIdentity::Ethereum(key), IdentitySignature::Ethereum(sig)) => {
            let recovered = recover_ethereum(message, sig)?;
            if recovered == *key {
                Ok(())
            } else {
                Err(bad("recovered key does not match signer".to_string()))
            }
        }
        (PublicIdentity::Bls(key), IdentitySignature::Bls(sig)) => {
            let pk = blst::min_pk::PublicKey::key_validate(key).map_err(|e| {
                BraidError::InvalidKeyMaterial {
                    reason: format!("bls public key: {:?}", e),
                }
            })?;
            let sig = blst::min_pk::Signature::from_bytes(sig)
                .map_err(|e| bad(format!("bls signature: {:?}", e)))?;
            match sig.verify(true, message, BLS_DST, &[], &pk, false) {
                blst::BLST_ERROR::BLST_SUCCESS => Ok(()),
                err => Err(bad(format!("bls verification: {:?}", err))),
            }
        }
        _ => Err(BraidError::SchemeMismatch {
            key: identity.scheme().to_string(),
            signature: signature.scheme().to_string(),
        }),
    }
}

/// Recover the uncompressed public key from an Ethereum-style signature.
///
/// Accepts a recovery byte of 0/1 or 27/28.
pub fn recover_ethereum(message: &[u8], sig: &[u8; 65]) -> Result<[u8; 65], BraidError> {
    let bad = |reason: String| BraidError::InvalidSignature { reason };
    let rec_id = match sig[64] {
        27 | 28 => sig[64] - 27,
        v @ (0 | 1) => v,
        v => return Err(bad(format!("invalid recovery id {}", v))),
    };
    let rid = RecoveryId::from_i32(rec_id as i32).map_err(|e| bad(e.to_string()))?;
    let rec_sig =
        RecoverableSignature::from_compact(&sig[..64], rid).map_err(|e| bad(e.to_string()))?;
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest(keccak256(message));
    let pk = secp
        .recover_ecdsa(&msg, &rec_sig)
        .map_err(|e| bad(e.to_string()))?;
    Ok(pk.serialize_uncompressed())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const ALL: [SchemeTag; 4] = [
        SchemeTag::Ed25519,
        SchemeTag::Secp256k1,
        SchemeTag::Ethereum,
        SchemeTag::Bls,
    ];

    #[test]
    fn test_sign_verify_every_scheme() {
        for scheme in ALL {
            let id = PrivateIdentity::generate(scheme).unwrap();
            let public = id.public_key();
            assert_eq!(public.scheme(), scheme);
            validate_public(&public).unwrap();
            let sig = id.sign(b"hello braid");
            assert_eq!(sig.scheme(), scheme);
            assert!(verify(&public, b"hello braid", &sig).is_ok(), "{}", scheme);
            assert!(verify(&public, b"wrong message", &sig).is_err(), "{}", scheme);
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        for scheme in ALL {
            let a = PrivateIdentity::from_seed(scheme, &[1u8; 32]).unwrap();
            let b = PrivateIdentity::from_seed(scheme, &[2u8; 32]).unwrap();
            let sig = a.sign(b"msg");
            assert!(verify(&b.public_key(), b"msg", &sig).is_err(), "{}", scheme);
        }
    }

    #[test]
    fn test_from_seed_deterministic() {
        for scheme in ALL {
            let a = PrivateIdentity::from_seed(scheme, &[42u8; 32]).unwrap();
            let b = PrivateIdentity::from_seed(scheme, &[42u8; 32]).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.public_key(), b.public_key());
        }
    }

    #[test]
    fn test_private_bytes_roundtrip() {
        for scheme in ALL {
            let id = PrivateIdentity::from_seed(scheme, &[9u8; 32]).unwrap();
            let bytes = id.to_bytes();
            assert_eq!(bytes[0], scheme.as_byte());
            let back = PrivateIdentity::from_bytes(&bytes).unwrap();
            assert_eq!(back, id);
        }
    }

    #[test]
    fn test_scheme_mismatch() {
        let ed = PrivateIdentity::from_seed(SchemeTag::Ed25519, &[3u8; 32]).unwrap();
        let bls = PrivateIdentity::from_seed(SchemeTag::Bls, &[3u8; 32]).unwrap();
        let sig = bls.sign(b"msg");
        assert!(matches!(
            verify(&ed.public_key(), b"msg", &sig),
            Err(BraidError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_ethereum_recovery_accepts_legacy_v() {
        let id = PrivateIdentity::from_seed(SchemeTag::Ethereum, &[5u8; 32]).unwrap();
        let IdentitySignature::Ethereum(mut sig) = id.sign(b"msg") else {
            panic!("expected ethereum signature");
        };
        sig[64] += 27;
        let PublicIdentity::Ethereum(key) = id.public_key() else {
            panic!("expected ethereum key");
        };
        assert_eq!(recover_ethereum(b"msg", &sig).unwrap(), key);
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(validate_public(&PublicIdentity::Secp256k1([0u8; 33])).is_err());
        assert!(validate_public(&PublicIdentity::Ethereum([0u8; 65])).is_err());
        assert!(validate_public(&PublicIdentity::Bls([0u8; 48])).is_err());
    }

    proptest! {
        #[test]
        fn prop_signature_binds_message(
            seed in prop::array::uniform32(any::<u8>()),
            message in prop::collection::vec(any::<u8>(), 0..256),
            scheme_index in 0usize..4,
        ) {
            let id = PrivateIdentity::from_seed(ALL[scheme_index], &seed).unwrap();
            let sig = id.sign(&message);
            prop_assert!(verify(&id.public_key(), &message, &sig).is_ok());

            let mut tampered = message.clone();
            tampered.push(0x01);
            prop_assert!(verify(&id.public_key(), &tampered, &sig).is_err());
        }
    }
}
