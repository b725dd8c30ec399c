//! Operator overloads and named methods on [`Scalar`]. Every one of them goes
//! through [`Tape::apply`], mixing in raw `f64` operands as constants.

use std::convert::Infallible;

use crate::{
    error::DomainError,
    ops::{Add, Eq, Exp, Inv, Log, Lt, Mul, Neg, ReLU, Sigmoid},
    tape::{Operand, Scalar, Tape},
};

fn total<T>(res: Result<T, Infallible>) -> T {
    match res {
        Ok(v) => v,
        Err(never) => match never {},
    }
}

fn add<'a>(tape: &'a Tape, lhs: Operand<'a>, rhs: Operand<'a>) -> Scalar<'a> {
    total(tape.apply(Add, &[lhs, rhs]))
}

fn sub<'a>(tape: &'a Tape, lhs: Operand<'a>, rhs: Operand<'a>) -> Scalar<'a> {
    let neg = total(tape.apply(Neg, &[rhs]));
    total(tape.apply(Add, &[lhs, neg.into()]))
}

fn mul<'a>(tape: &'a Tape, lhs: Operand<'a>, rhs: Operand<'a>) -> Scalar<'a> {
    total(tape.apply(Mul, &[lhs, rhs]))
}

fn div<'a>(
    tape: &'a Tape,
    lhs: Operand<'a>,
    rhs: Operand<'a>,
) -> Result<Scalar<'a>, DomainError> {
    let inv = tape.apply(Inv, &[rhs])?;
    Ok(total(tape.apply(Mul, &[lhs, inv.into()])))
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $imp:ident, $output:ty) => {
        impl<'a> std::ops::$trait for Scalar<'a> {
            type Output = $output;
            fn $method(self, rhs: Self) -> Self::Output {
                $imp(self.tape, self.into(), rhs.into())
            }
        }

        impl<'a> std::ops::$trait<f64> for Scalar<'a> {
            type Output = $output;
            fn $method(self, rhs: f64) -> Self::Output {
                $imp(self.tape, self.into(), rhs.into())
            }
        }

        impl<'a> std::ops::$trait<Scalar<'a>> for f64 {
            type Output = $output;
            fn $method(self, rhs: Scalar<'a>) -> Self::Output {
                $imp(rhs.tape, self.into(), rhs.into())
            }
        }
    };
}

impl_binary_op!(Add, add, add, Scalar<'a>);
impl_binary_op!(Sub, sub, sub, Scalar<'a>);
impl_binary_op!(Mul, mul, mul, Scalar<'a>);
// Division can hit the inverse of zero, hence the `Result`.
impl_binary_op!(Div, div, div, Result<Scalar<'a>, DomainError>);

impl<'a> std::ops::Neg for Scalar<'a> {
    type Output = Scalar<'a>;
    fn neg(self) -> Self::Output {
        total(self.tape.apply(Neg, &[self.into()]))
    }
}

impl<'a> Scalar<'a> {
    pub fn log(self) -> Result<Self, DomainError> {
        self.tape.apply(Log, &[self.into()])
    }

    pub fn inv(self) -> Result<Self, DomainError> {
        self.tape.apply(Inv, &[self.into()])
    }

    pub fn exp(self) -> Self {
        total(self.tape.apply(Exp, &[self.into()]))
    }

    pub fn sigmoid(self) -> Self {
        total(self.tape.apply(Sigmoid, &[self.into()]))
    }

    pub fn relu(self) -> Self {
        total(self.tape.apply(ReLU, &[self.into()]))
    }

    /// `1.0` if `self < rhs`, `0.0` otherwise. Its derivative is zero.
    pub fn lt(self, rhs: impl Into<Operand<'a>>) -> Self {
        total(self.tape.apply(Lt, &[self.into(), rhs.into()]))
    }

    /// `1.0` if `self > rhs`, `0.0` otherwise. Its derivative is zero.
    pub fn gt(self, rhs: impl Into<Operand<'a>>) -> Self {
        total(self.tape.apply(Lt, &[rhs.into(), self.into()]))
    }

    /// Differentiable equality: `1.0` if both sides are equal, `0.0` otherwise,
    /// recorded on the tape like any other operation. Use [`Scalar::data`] for
    /// plain numeric comparison.
    pub fn equals(self, rhs: impl Into<Operand<'a>>) -> Self {
        total(self.tape.apply(Eq, &[self.into(), rhs.into()]))
    }
}
