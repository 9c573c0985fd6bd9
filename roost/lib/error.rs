use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a roost-related operation.
pub type RoostResult<T> = Result<T, RoostError>;

/// An error that occurred during a server supervision operation.
#[derive(Debug, Error)]
pub enum RoostError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred when console output persistently exceeded the
    /// configured rate limits.
    #[error("console is outputting too much data")]
    TooMuchConsoleData,

    /// An error that occurred when a console line matcher pattern failed to
    /// compile.
    #[error("invalid console line matcher {0:?}: {1}")]
    InvalidOutputMatcher(String, #[source] regex::Error),

    /// An error that occurred when an unrecognized process state string was
    /// encountered.
    #[error("unknown process state: {0}")]
    UnknownProcessState(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RoostError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> RoostError {
        RoostError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `RoostResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> RoostResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
