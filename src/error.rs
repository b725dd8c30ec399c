use std::convert::Infallible;

use thiserror::Error;

/// A primitive was evaluated outside of its domain in the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum DomainError {
    #[error("log is undefined for non-positive input {0}")]
    LogNonPositive(f64),
    #[error("log is undefined for NaN")]
    LogNan,
    #[error("inverse is undefined for zero")]
    InvZero,
}

impl From<Infallible> for DomainError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Failure of [`crate::numeric::derivative_check`].
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("argument {arg} of f({args:?}) did not receive a derivative")]
    MissingDerivative { args: Vec<f64>, arg: usize },

    #[error(
        "derivative check at arguments f({args:?}) received derivative f'={analytic} for argument {arg}, \
         but was expecting derivative f'={numeric} from central difference"
    )]
    Mismatch {
        args: Vec<f64>,
        arg: usize,
        analytic: f64,
        numeric: f64,
    },
}
