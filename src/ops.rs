//! The library of primitive differentiable operations.
//!
//! Each operation is a stateless unit struct implementing [`ScalarFunction`].
//! Use them through [`crate::Tape::apply`] or the sugar on [`crate::Scalar`].

use std::convert::Infallible;

use crate::{
    error::DomainError,
    scalar_fn::{Context, ScalarFunction},
};

#[derive(Clone, Copy, Debug)]
pub struct Add;

impl ScalarFunction for Add {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "add"
    }
    fn arity(&self) -> usize {
        2
    }
    fn forward(&self, _ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        Ok(inputs[0] + inputs[1])
    }
    fn backward(&self, _ctx: &Context, d_output: f64) -> Vec<f64> {
        vec![d_output, d_output]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Mul;

impl ScalarFunction for Mul {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "mul"
    }
    fn arity(&self) -> usize {
        2
    }
    fn forward(&self, ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        ctx.save_for_backward(&inputs[..2]);
        Ok(inputs[0] * inputs[1])
    }
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64> {
        let &[a, b] = ctx.saved_values() else {
            unreachable!("mul saves both operands")
        };
        vec![d_output * b, d_output * a]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Inv;

impl ScalarFunction for Inv {
    type Error = DomainError;
    fn name(&self) -> &'static str {
        "inv"
    }
    fn arity(&self) -> usize {
        1
    }
    fn forward(&self, ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        let a = inputs[0];
        if a == 0. {
            return Err(DomainError::InvZero);
        }
        ctx.save_for_backward(&[a]);
        Ok(a.recip())
    }
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64> {
        let a = ctx.saved_values()[0];
        vec![-d_output / (a * a)]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Neg;

impl ScalarFunction for Neg {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "neg"
    }
    fn arity(&self) -> usize {
        1
    }
    fn forward(&self, _ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        Ok(-inputs[0])
    }
    fn backward(&self, _ctx: &Context, d_output: f64) -> Vec<f64> {
        vec![-d_output]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Log;

impl ScalarFunction for Log {
    type Error = DomainError;
    fn name(&self) -> &'static str {
        "log"
    }
    fn arity(&self) -> usize {
        1
    }
    fn forward(&self, ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        let a = inputs[0];
        if a.is_nan() {
            return Err(DomainError::LogNan);
        }
        if a <= 0. {
            return Err(DomainError::LogNonPositive(a));
        }
        ctx.save_for_backward(&[a]);
        Ok(a.ln())
    }
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64> {
        vec![d_output / ctx.saved_values()[0]]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Exp;

impl ScalarFunction for Exp {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "exp"
    }
    fn arity(&self) -> usize {
        1
    }
    fn forward(&self, ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        let out = inputs[0].exp();
        ctx.save_for_backward(&[out]);
        Ok(out)
    }
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64> {
        vec![d_output * ctx.saved_values()[0]]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Sigmoid;

pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let ex = x.exp();
        ex / (1. + ex)
    }
}

impl ScalarFunction for Sigmoid {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "sigmoid"
    }
    fn arity(&self) -> usize {
        1
    }
    fn forward(&self, ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        let out = sigmoid(inputs[0]);
        ctx.save_for_backward(&[out]);
        Ok(out)
    }
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64> {
        let s = ctx.saved_values()[0];
        vec![d_output * s * (1. - s)]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReLU;

impl ScalarFunction for ReLU {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "relu"
    }
    fn arity(&self) -> usize {
        1
    }
    fn forward(&self, ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        let a = inputs[0];
        ctx.save_for_backward(&[a]);
        Ok(if a > 0. { a } else { 0. })
    }
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64> {
        if ctx.saved_values()[0] > 0. {
            vec![d_output]
        } else {
            vec![0.]
        }
    }
}

/// `1.0` if the first operand is less than the second, `0.0` otherwise.
/// The derivative is zero almost everywhere.
#[derive(Clone, Copy, Debug)]
pub struct Lt;

impl ScalarFunction for Lt {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "lt"
    }
    fn arity(&self) -> usize {
        2
    }
    fn forward(&self, _ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        Ok(if inputs[0] < inputs[1] { 1. } else { 0. })
    }
    fn backward(&self, _ctx: &Context, _d_output: f64) -> Vec<f64> {
        vec![0., 0.]
    }
}

/// `1.0` if both operands are equal, `0.0` otherwise.
#[derive(Clone, Copy, Debug)]
pub struct Eq;

impl ScalarFunction for Eq {
    type Error = Infallible;
    fn name(&self) -> &'static str {
        "eq"
    }
    fn arity(&self) -> usize {
        2
    }
    fn forward(&self, _ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
        Ok(if inputs[0] == inputs[1] { 1. } else { 0. })
    }
    fn backward(&self, _ctx: &Context, _d_output: f64) -> Vec<f64> {
        vec![0., 0.]
    }
}
