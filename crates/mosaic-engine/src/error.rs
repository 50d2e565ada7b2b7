use mosaic_comm::CommError;
use mosaic_logic::Operator;
use thiserror::Error;

/// Fatal verification failures.
///
/// The checker has no soft-failure path: every error propagates to the
/// caller of [`crate::ModelChecker::verify`] immediately and no partial
/// result is returned.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The formula contains an operator outside the checker's basis.
    /// Drivers must normalize formulas first (`mosaic_logic::normalize`).
    #[error("unsupported operator {0:?}; normalize the formula first")]
    UnsupportedOperator(Operator),

    /// A communication-layer failure (protocol violation or transport
    /// loss) surfaced during a propagation phase.
    #[error(transparent)]
    Comm(#[from] CommError),
}
