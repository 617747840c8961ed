use thiserror::Error;

/// The error type for `oncoseg` operations.
///
/// Configuration problems are reported synchronously by the `init()` and
/// `update_weights()` entry points; numeric divergence is reported by the
/// training step driver once a combined loss turns non-finite.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OncoSegError {
    /// A configuration value is out of its valid range or logically inconsistent.
    #[error("Invalid loss configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// A weight vector does not have the length required by its owner.
    #[error("Weight length mismatch for {context}: expected {expected}, got {actual}")]
    WeightLengthMismatch {
        /// What the weights were meant for (e.g. "boundary class weights").
        context: String,
        /// The required length.
        expected: usize,
        /// The supplied length.
        actual: usize,
    },

    /// An input tensor has a shape the operation cannot consume.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// The aggregated loss of a step is NaN or infinite.
    #[error("Numeric divergence: aggregated loss is {loss}")]
    NumericDivergence {
        /// The offending loss value.
        loss: f64,
    },
}

/// A specialized `Result` type for `oncoseg` operations.
pub type OncoSegResult<T> = Result<T, OncoSegError>;

/// Returns the value unchanged when it is finite, otherwise a
/// [`OncoSegError::NumericDivergence`].
pub fn ensure_finite(loss: f64) -> OncoSegResult<f64> {
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(OncoSegError::NumericDivergence { loss })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_finite() {
        assert_eq!(ensure_finite(1.5), Ok(1.5));
        assert!(matches!(
            ensure_finite(f64::NAN),
            Err(OncoSegError::NumericDivergence { .. })
        ));
        assert!(matches!(
            ensure_finite(f64::INFINITY),
            Err(OncoSegError::NumericDivergence { loss }) if loss.is_infinite()
        ));
    }

    #[test]
    fn test_weight_mismatch_message() {
        let err = OncoSegError::WeightLengthMismatch {
            context: "boundary class weights".to_string(),
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Weight length mismatch for boundary class weights: expected 4, got 3"
        );
    }
}
