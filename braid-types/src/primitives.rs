/// 32-byte hash (BLAKE3 unless stated otherwise).
pub type Hash = [u8; 32];

/// 20-byte account address.
pub type Address = [u8; 20];

/// Transaction hash.
pub type TxHash = Hash;

/// Amount of tokens in base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Block height.
pub type Height = u64;

/// The all-zero hash.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Serde helper serializing integers as decimal strings.
///
/// Genesis and epoch documents carry large integers as strings so that
/// JSON consumers without 128-bit integers can read them.
pub mod serde_decimal {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Display,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let s = String::deserialize(deserializer)?;
        s.trim()
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("invalid decimal '{}': {}", s, e)))
    }
}

/// Serde helper serializing byte arrays and vectors as hex strings.
pub mod serde_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(value.as_ref()))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let len = bytes.len();
        T::try_from(bytes)
            .map_err(|_| serde::de::Error::custom(format!("unexpected byte length {}", len)))
    }
}
