/// Category tag attached to the principal error types so the surrounding
/// workflow can decide between retrying, recreating resources and aborting
/// without matching on connector-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input (job name, table identifier, empty mapping). Not retryable.
    Validation,
    /// A required resource (slot, publication, metadata row) is missing.
    Precondition,
    /// Connection resets, timeouts and other I/O the caller may retry.
    Transient,
    /// Decode failures and row-count mismatches. Fatal to the batch.
    Data,
    /// The operation was cancelled through the shutdown channel.
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Precondition.is_retryable());
        assert!(!ErrorKind::Data.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }
}
