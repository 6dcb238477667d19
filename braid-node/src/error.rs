use thiserror::Error;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("genesis error: {reason}")]
    GenesisError { reason: String },

    #[error("identity error: {0}")]
    IdentityError(#[from] braid_types::error::BraidError),

    #[error("storage error: {0}")]
    StorageError(#[from] braid_storage::StorageError),

    #[error("bridge error: {0}")]
    BridgeError(#[from] braid_bridge::BridgeError),

    #[error("weave error: {0}")]
    WeaveError(#[from] braid_weave::WeaveError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = NodeError::ConfigError {
            reason: "missing field".to_string(),
        };
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_genesis_error_display() {
        let err = NodeError::GenesisError {
            reason: "no validators".to_string(),
        };
        assert_eq!(err.to_string(), "genesis error: no validators");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let node_err: NodeError = io_err.into();
        assert!(matches!(node_err, NodeError::IoError(_)));
    }

    #[test]
    fn test_weave_error_from() {
        let node_err: NodeError = braid_weave::WeaveError::MempoolFull.into();
        assert!(node_err.to_string().contains("mempool is full"));
    }
}
