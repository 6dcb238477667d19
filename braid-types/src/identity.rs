//! Public halves of validator identities.
//!
//! A validator key belongs to exactly one signature scheme. Every encoding
//! starts with a one-byte scheme tag, so a stored key or signature can be
//! decoded without knowing where it came from. Signing and verification live
//! in `braid-crypto`; this module only carries the bytes.

use std::fmt;
use std::io::{Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BraidError;

/// Ed25519 public key length.
pub const ED25519_PUBKEY_LEN: usize = 32;
/// Compressed secp256k1 public key length.
pub const SECP256K1_PUBKEY_LEN: usize = 33;
/// Uncompressed (0x04-prefixed) secp256k1 key used by the Ethereum scheme.
pub const ETHEREUM_PUBKEY_LEN: usize = 65;
/// Compressed BLS12-381 G1 public key length.
pub const BLS_PUBKEY_LEN: usize = 48;

/// Ed25519 signature length.
pub const ED25519_SIG_LEN: usize = 64;
/// Compact secp256k1 signature length.
pub const SECP256K1_SIG_LEN: usize = 64;
/// Recoverable secp256k1 signature length (r ‖ s ‖ v).
pub const ETHEREUM_SIG_LEN: usize = 65;
/// Compressed BLS12-381 G2 signature length.
pub const BLS_SIG_LEN: usize = 96;

/// One-byte scheme tag prefixed to every encoded key and signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SchemeTag {
    Ed25519 = 0x01,
    Secp256k1 = 0x02,
    Ethereum = 0x03,
    Bls = 0x04,
}

impl SchemeTag {
    /// Decode a tag byte.
    pub fn from_byte(byte: u8) -> Result<Self, BraidError> {
        match byte {
            0x01 => Ok(SchemeTag::Ed25519),
            0x02 => Ok(SchemeTag::Secp256k1),
            0x03 => Ok(SchemeTag::Ethereum),
            0x04 => Ok(SchemeTag::Bls),
            other => Err(BraidError::UnknownScheme(other)),
        }
    }

    /// Parse a scheme from its configuration name.
    pub fn from_name(name: &str) -> Result<Self, BraidError> {
        match name.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(SchemeTag::Ed25519),
            "secp256k1" => Ok(SchemeTag::Secp256k1),
            "ethereum" => Ok(SchemeTag::Ethereum),
            "bls" => Ok(SchemeTag::Bls),
            _ => Err(BraidError::InvalidKeyMaterial {
                reason: format!("unknown signature scheme '{}'", name),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchemeTag::Ed25519 => "ed25519",
            SchemeTag::Secp256k1 => "secp256k1",
            SchemeTag::Ethereum => "ethereum",
            SchemeTag::Bls => "bls",
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for SchemeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Public counterpart of a validator identity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PublicIdentity {
    Ed25519([u8; ED25519_PUBKEY_LEN]),
    Secp256k1([u8; SECP256K1_PUBKEY_LEN]),
    Ethereum([u8; ETHEREUM_PUBKEY_LEN]),
    Bls([u8; BLS_PUBKEY_LEN]),
}

impl PublicIdentity {
    pub fn scheme(&self) -> SchemeTag {
        match self {
            PublicIdentity::Ed25519(_) => SchemeTag::Ed25519,
            PublicIdentity::Secp256k1(_) => SchemeTag::Secp256k1,
            PublicIdentity::Ethereum(_) => SchemeTag::Ethereum,
            PublicIdentity::Bls(_) => SchemeTag::Bls,
        }
    }

    /// Raw key bytes without the scheme tag.
    pub fn key_bytes(&self) -> &[u8] {
        match self {
            PublicIdentity::Ed25519(k) => k,
            PublicIdentity::Secp256k1(k) => k,
            PublicIdentity::Ethereum(k) => k,
            PublicIdentity::Bls(k) => k,
        }
    }

    /// Canonical encoding: scheme tag followed by the raw key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let key = self.key_bytes();
        let mut out = Vec::with_capacity(1 + key.len());
        out.push(self.scheme().as_byte());
        out.extend_from_slice(key);
        out
    }

    /// Decode a tagged encoding. Only checks lengths; curve membership is
    /// checked by `braid_crypto::identity::validate_public`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BraidError> {
        let (tag, key) = bytes.split_first().ok_or(BraidError::InvalidKeyMaterial {
            reason: "empty public key".to_string(),
        })?;
        let scheme = SchemeTag::from_byte(*tag)?;
        let wrong_len = |expected: usize| BraidError::InvalidKeyMaterial {
            reason: format!(
                "{} public key must be {} bytes, got {}",
                scheme,
                expected,
                key.len()
            ),
        };
        Ok(match scheme {
            SchemeTag::Ed25519 => {
                PublicIdentity::Ed25519(key.try_into().map_err(|_| wrong_len(ED25519_PUBKEY_LEN))?)
            }
            SchemeTag::Secp256k1 => PublicIdentity::Secp256k1(
                key.try_into()
                    .map_err(|_| wrong_len(SECP256K1_PUBKEY_LEN))?,
            ),
            SchemeTag::Ethereum => PublicIdentity::Ethereum(
                key.try_into().map_err(|_| wrong_len(ETHEREUM_PUBKEY_LEN))?,
            ),
            SchemeTag::Bls => {
                PublicIdentity::Bls(key.try_into().map_err(|_| wrong_len(BLS_PUBKEY_LEN))?)
            }
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, BraidError> {
        let bytes =
            hex::decode(s.trim_start_matches("0x")).map_err(|e| BraidError::InvalidKeyMaterial {
                reason: format!("public key is not hex: {}", e),
            })?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PublicIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicIdentity({}:{})", self.scheme(), hex::encode(self.key_bytes()))
    }
}

/// A signature produced by one of the identity schemes.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentitySignature {
    Ed25519([u8; ED25519_SIG_LEN]),
    Secp256k1([u8; SECP256K1_SIG_LEN]),
    Ethereum([u8; ETHEREUM_SIG_LEN]),
    Bls([u8; BLS_SIG_LEN]),
}

impl IdentitySignature {
    pub fn scheme(&self) -> SchemeTag {
        match self {
            IdentitySignature::Ed25519(_) => SchemeTag::Ed25519,
            IdentitySignature::Secp256k1(_) => SchemeTag::Secp256k1,
            IdentitySignature::Ethereum(_) => SchemeTag::Ethereum,
            IdentitySignature::Bls(_) => SchemeTag::Bls,
        }
    }

    pub fn sig_bytes(&self) -> &[u8] {
        match self {
            IdentitySignature::Ed25519(s) => s,
            IdentitySignature::Secp256k1(s) => s,
            IdentitySignature::Ethereum(s) => s,
            IdentitySignature::Bls(s) => s,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let sig = self.sig_bytes();
        let mut out = Vec::with_capacity(1 + sig.len());
        out.push(self.scheme().as_byte());
        out.extend_from_slice(sig);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BraidError> {
        let (tag, sig) = bytes.split_first().ok_or(BraidError::InvalidSignature {
            reason: "empty signature".to_string(),
        })?;
        let scheme = SchemeTag::from_byte(*tag)?;
        let wrong_len = || BraidError::InvalidSignature {
            reason: format!("bad {} signature length {}", scheme, sig.len()),
        };
        Ok(match scheme {
            SchemeTag::Ed25519 => IdentitySignature::Ed25519(sig.try_into().map_err(|_| wrong_len())?),
            SchemeTag::Secp256k1 => {
                IdentitySignature::Secp256k1(sig.try_into().map_err(|_| wrong_len())?)
            }
            SchemeTag::Ethereum => {
                IdentitySignature::Ethereum(sig.try_into().map_err(|_| wrong_len())?)
            }
            SchemeTag::Bls => IdentitySignature::Bls(sig.try_into().map_err(|_| wrong_len())?),
        })
    }

    /// Placeholder used while computing signing bytes of an unsigned value.
    pub fn empty(scheme: SchemeTag) -> Self {
        match scheme {
            SchemeTag::Ed25519 => IdentitySignature::Ed25519([0u8; ED25519_SIG_LEN]),
            SchemeTag::Secp256k1 => IdentitySignature::Secp256k1([0u8; SECP256K1_SIG_LEN]),
            SchemeTag::Ethereum => IdentitySignature::Ethereum([0u8; ETHEREUM_SIG_LEN]),
            SchemeTag::Bls => IdentitySignature::Bls([0u8; BLS_SIG_LEN]),
        }
    }
}

impl fmt::Debug for IdentitySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentitySignature({}:{})", self.scheme(), hex::encode(self.sig_bytes()))
    }
}

// Borsh and serde both go through the tagged byte encoding so that the
// on-disk and JSON forms match what `from_bytes` accepts.

impl BorshSerialize for PublicIdentity {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        BorshSerialize::serialize(&self.to_bytes(), writer)
    }
}

impl BorshDeserialize for PublicIdentity {
    fn deserialize_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let bytes = Vec::<u8>::deserialize_reader(reader)?;
        PublicIdentity::from_bytes(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl BorshSerialize for IdentitySignature {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        BorshSerialize::serialize(&self.to_bytes(), writer)
    }
}

impl BorshDeserialize for IdentitySignature {
    fn deserialize_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let bytes = Vec::<u8>::deserialize_reader(reader)?;
        IdentitySignature::from_bytes(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl Serialize for PublicIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        PublicIdentity::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for IdentitySignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for IdentitySignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        IdentitySignature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_encoding_roundtrip() {
        let keys = vec![
            PublicIdentity::Ed25519([1u8; ED25519_PUBKEY_LEN]),
            PublicIdentity::Secp256k1([2u8; SECP256K1_PUBKEY_LEN]),
            PublicIdentity::Ethereum([3u8; ETHEREUM_PUBKEY_LEN]),
            PublicIdentity::Bls([4u8; BLS_PUBKEY_LEN]),
        ];
        for key in keys {
            let bytes = key.to_bytes();
            assert_eq!(bytes[0], key.scheme().as_byte());
            assert_eq!(PublicIdentity::from_bytes(&bytes).unwrap(), key);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut bytes = vec![0x09];
        bytes.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            PublicIdentity::from_bytes(&bytes),
            Err(BraidError::UnknownScheme(0x09))
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut bytes = vec![SchemeTag::Bls.as_byte()];
        bytes.extend_from_slice(&[0u8; 32]);
        assert!(PublicIdentity::from_bytes(&bytes).is_err());
        assert!(PublicIdentity::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_borsh_uses_tagged_bytes() {
        let key = PublicIdentity::Secp256k1([7u8; SECP256K1_PUBKEY_LEN]);
        let encoded = borsh::to_vec(&key).unwrap();
        // u32 length prefix, then tag.
        assert_eq!(encoded[4], SchemeTag::Secp256k1.as_byte());
        let decoded = PublicIdentity::try_from_slice(&encoded).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_serde_hex() {
        let sig = IdentitySignature::Ed25519([9u8; ED25519_SIG_LEN]);
        let json = serde_json::to_string(&sig).unwrap();
        assert!(json.starts_with("\"01"));
        let back: IdentitySignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn test_serde_public_identity_from_json_string() {
        let key = PublicIdentity::Bls([4u8; BLS_PUBKEY_LEN]);
        let json = serde_json::to_string(&key).unwrap();
        let back: PublicIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<PublicIdentity>("42").is_err());
        assert!(serde_json::from_str::<IdentitySignature>("\"zz\"").is_err());
    }

    #[test]
    fn test_scheme_names() {
        for tag in [
            SchemeTag::Ed25519,
            SchemeTag::Secp256k1,
            SchemeTag::Ethereum,
            SchemeTag::Bls,
        ] {
            assert_eq!(SchemeTag::from_name(tag.name()).unwrap(), tag);
        }
        assert!(SchemeTag::from_name("rsa").is_err());
    }
}
