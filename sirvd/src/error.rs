use thiserror::Error;

/// Errors raised by model construction, state validation and integration.
///
/// Every variant is fatal to the call that produced it; nothing in the crate
/// retries or degrades a result on its own.
#[derive(Error, Debug)]
pub enum SirvdError {
    /// Malformed parameter set (negative rates, wrong dimensions, ...).
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Initial fractions not finite, outside [0, 1], or of the wrong length.
    #[error("invalid initial state: {0}")]
    InvalidInitialState(String),

    /// Observation instants that are empty, unordered or outside the run.
    #[error("invalid observation instants: {0}")]
    InvalidObservations(String),

    /// Solver options that cannot drive an integration.
    #[error("invalid solver options: {0}")]
    InvalidOptions(String),

    /// The adaptive stepper could not make progress within tolerance.
    #[error("integration failed at t={t:.6e} with step h={h:.3e}: {reason}")]
    IntegrationFailure { t: f64, h: f64, reason: String },

    #[error("group index {group} out of range (n_groups={n_groups})")]
    GroupOutOfRange { group: usize, n_groups: usize },
}

impl SirvdError {
    pub fn params(message: impl Into<String>) -> Self {
        SirvdError::InvalidParameters(message.into())
    }

    pub fn initial_state(message: impl Into<String>) -> Self {
        SirvdError::InvalidInitialState(message.into())
    }

    pub fn observations(message: impl Into<String>) -> Self {
        SirvdError::InvalidObservations(message.into())
    }

    pub fn options(message: impl Into<String>) -> Self {
        SirvdError::InvalidOptions(message.into())
    }

    pub fn integration(t: f64, h: f64, reason: impl Into<String>) -> Self {
        SirvdError::IntegrationFailure {
            t,
            h,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SirvdError>;

/// Fails with `err` unless `cond` holds. Mirrors `anyhow::ensure!` for the
/// typed error.
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

pub(crate) use ensure;
