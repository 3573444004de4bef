use thiserror::Error;

/// Errors from the snapshot persistence layer.
///
/// These never cross a store's operation boundary: load failures hydrate an
/// empty store, persist failures are logged by the writer task. They exist so
/// the snapshot helpers can propagate with `?` internally.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(error.to_string().contains("snapshot I/O error"));
    }
}
