/// Scratch space shared between the forward and the backward formula of one
/// application of a primitive.
#[derive(Clone, Debug, Default)]
pub struct Context {
    saved_values: Vec<f64>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store values needed by the backward formula.
    pub fn save_for_backward(&mut self, values: &[f64]) {
        self.saved_values.extend_from_slice(values);
    }

    pub fn saved_values(&self) -> &[f64] {
        &self.saved_values
    }
}

/// A trait that represents a differentiable primitive operation on scalars.
/// It needs to implement the value transformation and the local derivative,
/// which is how a unit of derivative on the output distributes onto each operand.
///
/// Implementations must not traverse the graph or accumulate derivatives;
/// they are pure local formulas invoked through [`crate::Tape::apply`].
pub trait ScalarFunction: 'static {
    /// The error returned when the inputs are outside of the domain.
    /// Use [`std::convert::Infallible`] for total functions.
    type Error;

    fn name(&self) -> &'static str;

    /// Number of operands `forward` takes.
    fn arity(&self) -> usize;

    fn forward(&self, ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error>;

    /// Returns one partial derivative per operand, in the order of `forward`'s inputs.
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64>;
}

/// The type-erased part of [`ScalarFunction`] kept in the graph after the forward pass.
pub trait Backward {
    fn name(&self) -> &'static str;
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64>;
}

impl<F: ScalarFunction> Backward for F {
    fn name(&self) -> &'static str {
        ScalarFunction::name(self)
    }
    fn backward(&self, ctx: &Context, d_output: f64) -> Vec<f64> {
        ScalarFunction::backward(self, ctx, d_output)
    }
}

impl std::fmt::Debug for dyn Backward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[test]
fn test_context_saves_in_order() {
    let mut ctx = Context::new();
    ctx.save_for_backward(&[1., 2.]);
    ctx.save_for_backward(&[3.]);
    assert_eq!(ctx.saved_values(), &[1., 2., 3.]);
}
