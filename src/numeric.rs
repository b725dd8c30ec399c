//! Numerical differentiation, used to cross-check the derivatives computed by
//! backpropagation.

use std::convert::Infallible;

use approx::relative_eq;
use log::trace;

use crate::{
    error::{CheckError, DomainError},
    tape::{Scalar, Tape},
};

pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Tolerance of [`derivative_check`], both absolute and relative.
pub const CHECK_TOLERANCE: f64 = 1e-2;

/// Estimate the derivative of `f` with respect to `args[arg]` with the central
/// difference `(f(x + epsilon) - f(x - epsilon)) / (2 * epsilon)`.
pub fn central_difference<F>(mut f: F, args: &[f64], arg: usize, epsilon: f64) -> f64
where
    F: FnMut(&[f64]) -> f64,
{
    match try_central_difference(|x| Ok::<_, Infallible>(f(x)), args, arg, epsilon) {
        Ok(d) => d,
        Err(never) => match never {},
    }
}

/// [`central_difference`] for a fallible function. The first error is returned.
pub fn try_central_difference<F, E>(
    mut f: F,
    args: &[f64],
    arg: usize,
    epsilon: f64,
) -> Result<f64, E>
where
    F: FnMut(&[f64]) -> Result<f64, E>,
{
    let mut shifted = args.to_vec();
    shifted[arg] = args[arg] + epsilon;
    let plus = f(&shifted)?;
    shifted[arg] = args[arg] - epsilon;
    let minus = f(&shifted)?;
    Ok((plus - minus) / (2. * epsilon))
}

/// Check that backpropagation through `f` agrees with the central difference
/// for every argument.
///
/// `f` is evaluated on a fresh tape each time, with one leaf per argument.
pub fn derivative_check<F>(f: F, args: &[f64]) -> Result<(), CheckError>
where
    F: for<'t> Fn(&[Scalar<'t>]) -> Result<Scalar<'t>, DomainError>,
{
    let tape = Tape::new();
    let scalars: Vec<_> = args.iter().map(|&x| tape.leaf(x)).collect();
    f(&scalars)?.backward();

    let eval = |xs: &[f64]| -> Result<f64, DomainError> {
        let tape = Tape::new();
        let scalars: Vec<_> = xs.iter().map(|&x| tape.leaf(x)).collect();
        let out = f(&scalars)?.data();
        Ok(out)
    };

    for (arg, scalar) in scalars.iter().enumerate() {
        let numeric = try_central_difference(&eval, args, arg, DEFAULT_EPSILON)?;
        let Some(analytic) = scalar.derivative() else {
            return Err(CheckError::MissingDerivative {
                args: args.to_vec(),
                arg,
            });
        };
        trace!("f({args:?}): argument {arg} analytic {analytic}, numeric {numeric}");
        if !relative_eq!(
            analytic,
            numeric,
            epsilon = CHECK_TOLERANCE,
            max_relative = CHECK_TOLERANCE
        ) {
            return Err(CheckError::Mismatch {
                args: args.to_vec(),
                arg,
                analytic,
                numeric,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_central_difference() {
        let d = central_difference(|x| x[0] * x[0] * x[1], &[3., 2.], 0, DEFAULT_EPSILON);
        assert_abs_diff_eq!(d, 12., epsilon = 1e-4);
        let d = central_difference(|x| x[0] * x[0] * x[1], &[3., 2.], 1, DEFAULT_EPSILON);
        assert_abs_diff_eq!(d, 9., epsilon = 1e-4);
    }

    #[test]
    fn test_try_central_difference_error() {
        let res = try_central_difference(
            |x| if x[0] > 0. { Ok(x[0]) } else { Err("negative") },
            &[0.],
            0,
            DEFAULT_EPSILON,
        );
        assert_eq!(res, Err("negative"));
    }

    #[test]
    fn test_check_passes() {
        derivative_check(|x| Ok(x[0] * x[1] + x[0].exp()), &[1.5, -2.]).unwrap();
    }

    #[test]
    fn test_check_reports_domain_error() {
        let res = derivative_check(|x| x[0].log(), &[-1.]);
        assert!(matches!(
            res,
            Err(CheckError::Domain(DomainError::LogNonPositive(_)))
        ));
    }

    #[test]
    fn test_check_reports_missing_derivative() {
        let res = derivative_check(|x| Ok(x[0] * 2.), &[1., 2.]);
        assert!(matches!(
            res,
            Err(CheckError::MissingDerivative { arg: 1, .. })
        ));
    }
}
