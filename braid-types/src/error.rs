use thiserror::Error;

/// Errors shared by the primitive layers of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BraidError {
    // ─── Identity Errors ─────────────────────────────────────────────────────
    #[error("unknown signature scheme tag: {0:#04x}")]
    UnknownScheme(u8),

    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial { reason: String },

    #[error("invalid signature: {reason}")]
    InvalidSignature { reason: String },

    #[error("signature scheme mismatch: key is {key}, signature is {signature}")]
    SchemeMismatch { key: String, signature: String },

    // ─── Payload Errors ──────────────────────────────────────────────────────
    #[error("empty transaction payload")]
    EmptyPayload,

    #[error("unknown function selector: {0:#04x}")]
    UnknownFunction(u8),

    #[error("malformed call data for {function}: {reason}")]
    MalformedCall { function: String, reason: String },

    // ─── Serialization Errors ────────────────────────────────────────────────
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("deserialization error: {reason}")]
    DeserializationError { reason: String },
}
