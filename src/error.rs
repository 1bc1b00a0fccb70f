use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the collision kernel, the association graph and the MC moves.
///
/// Construction problems surface as `InvalidParam`. Corrupted bonding state surfaces as
/// `InvariantViolation` and is never repaired in place: the call that observed it returns
/// the error and the run stops there.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical or geometric issue (e.g., coincident centers at a contact).
    #[error("numerical error: {0}")]
    MathError(String),

    /// The bonding relation is inconsistent (asymmetric partners, odd dimer count, degree overflow).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A rejection sampler ran out of attempts.
    #[error("sampling failed after {attempts} attempts: {what}")]
    SamplingFailed { what: &'static str, attempts: usize },

    /// Malformed TOML configuration.
    #[error(transparent)]
    Config(#[from] toml::de::Error),

    /// Propagated I/O errors (configuration files).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_informative() {
        let e = Error::InvalidParam("well diameter must exceed core diameter".to_string());
        let msg = format!("{e}");
        assert!(msg.contains("invalid parameter"));
        assert!(msg.contains("well diameter"));
    }

    #[test]
    fn sampling_failure_reports_attempts() {
        let e = Error::SamplingFailed {
            what: "shell insertion",
            attempts: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("shell insertion"));
    }
}
