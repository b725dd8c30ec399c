//! Implementation of shared memory arena for the values, aka a tape.
//! See https://rufflewind.com/2016-12-30/reverse-mode-automatic-differentiation
//!
//! A [`Tape`] owns every node of a computation graph. [`Scalar`] is a cheap,
//! copyable handle to one node. Nodes are append-only: once pushed, their data
//! and history never change, and only the derivative of a leaf is written back
//! by a backward pass.
//!
//! The tape keeps its nodes in a `RefCell`, so it is neither `Sync` nor safe to
//! drive from several threads; build one tape per thread.

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    sync::atomic::{AtomicU64, Ordering},
};

use log::trace;

use crate::{
    backprop::{backpropagate, topological_sort},
    scalar_fn::{Backward, Context, ScalarFunction},
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a value. Ids only grow, so an operand
/// always has a smaller id than any value computed from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(u64);

impl ValueId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default, Debug)]
pub struct Tape {
    nodes: RefCell<Vec<TapeNode>>,
}

#[derive(Debug)]
pub(crate) struct TapeNode {
    pub(crate) id: ValueId,
    pub(crate) name: String,
    pub(crate) data: f64,
    pub(crate) derivative: Option<f64>,
    pub(crate) history: Option<History>,
}

/// How a value was produced: the primitive, what its forward formula saved,
/// and the operands in call order.
#[derive(Debug)]
pub(crate) struct History {
    pub(crate) last_fn: Box<dyn Backward>,
    pub(crate) ctx: Context,
    pub(crate) inputs: Vec<u32>,
}

#[derive(Copy, Clone)]
pub struct Scalar<'a> {
    pub(crate) tape: &'a Tape,
    pub(crate) idx: u32,
}

/// An argument to [`Tape::apply`]: either a value on the tape or a raw number
/// that will be recorded as a constant.
#[derive(Copy, Clone, Debug)]
pub enum Operand<'a> {
    Scalar(Scalar<'a>),
    Const(f64),
}

impl<'a> From<Scalar<'a>> for Operand<'a> {
    fn from(value: Scalar<'a>) -> Self {
        Self::Scalar(value)
    }
}

impl<'a> From<f64> for Operand<'a> {
    fn from(value: f64) -> Self {
        Self::Const(value)
    }
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a named leaf value.
    pub fn term<'a>(&'a self, name: impl Into<String>, init: f64) -> Scalar<'a> {
        self.push(Some(name.into()), init, None)
    }

    /// Create a leaf value named after its id.
    pub fn leaf<'a>(&'a self, init: f64) -> Scalar<'a> {
        self.push(None, init, None)
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    fn push<'a>(
        &'a self,
        name: Option<String>,
        data: f64,
        history: Option<History>,
    ) -> Scalar<'a> {
        let id = ValueId::next();
        let mut nodes = self.nodes.borrow_mut();
        let idx = nodes.len();
        nodes.push(TapeNode {
            id,
            name: name.unwrap_or_else(|| id.to_string()),
            data,
            derivative: None,
            history,
        });
        Scalar {
            tape: self,
            idx: idx as u32,
        }
    }

    /// Invoke a primitive and record the result with its history.
    ///
    /// Raw numbers among the operands become fresh constants first. Errors from
    /// the forward formula are returned as is and nothing is recorded for the result.
    ///
    /// # Panics
    ///
    /// Panics if the number of operands differs from the arity of `f`, or if an
    /// operand belongs to another tape.
    pub fn apply<'a, F: ScalarFunction>(
        &'a self,
        f: F,
        operands: &[Operand<'a>],
    ) -> Result<Scalar<'a>, F::Error> {
        assert_eq!(
            operands.len(),
            f.arity(),
            "{} takes {} operands, got {}",
            ScalarFunction::name(&f),
            f.arity(),
            operands.len()
        );
        let inputs: Vec<Scalar<'a>> = operands
            .iter()
            .map(|operand| match *operand {
                Operand::Scalar(scalar) => {
                    assert!(
                        std::ptr::eq(scalar.tape, self),
                        "operand {} belongs to another tape",
                        scalar.id()
                    );
                    scalar
                }
                Operand::Const(value) => self.leaf(value),
            })
            .collect();
        let values: Vec<f64> = inputs.iter().map(Scalar::data).collect();

        let mut ctx = Context::new();
        let data = f.forward(&mut ctx, &values)?;
        let op_name = ScalarFunction::name(&f);

        #[cfg(feature = "expr_name")]
        let name = Some(format!(
            "{op_name}({})",
            inputs
                .iter()
                .map(Scalar::name)
                .collect::<Vec<_>>()
                .join(", ")
        ));
        #[cfg(not(feature = "expr_name"))]
        let name = None;

        let result = self.push(
            name,
            data,
            Some(History {
                last_fn: Box::new(f),
                ctx,
                inputs: inputs.iter().map(|input| input.idx).collect(),
            }),
        );
        trace!("{} = {op_name}{values:?} -> {data}", result.id());
        Ok(result)
    }
}

impl<'a> Scalar<'a> {
    fn with_node<R>(&self, f: impl FnOnce(&TapeNode) -> R) -> R {
        f(&self.tape.nodes.borrow()[self.idx as usize])
    }

    pub fn tape(&self) -> &'a Tape {
        self.tape
    }

    pub fn data(&self) -> f64 {
        self.with_node(|node| node.data)
    }

    /// The derivative deposited by backward passes, if any reached this value.
    pub fn derivative(&self) -> Option<f64> {
        self.with_node(|node| node.derivative)
    }

    pub fn id(&self) -> ValueId {
        self.with_node(|node| node.id)
    }

    pub fn name(&self) -> String {
        self.with_node(|node| node.name.clone())
    }

    /// True if this value was created directly rather than by a primitive.
    pub fn is_leaf(&self) -> bool {
        self.with_node(|node| node.history.is_none())
    }

    /// Constants and leaves are the same thing on a tape.
    pub fn is_constant(&self) -> bool {
        self.is_leaf()
    }

    /// Add `x` to the derivative of this value.
    ///
    /// # Panics
    ///
    /// Panics if this value is not a leaf.
    pub fn accumulate_derivative(&self, x: f64) {
        let mut nodes = self.tape.nodes.borrow_mut();
        let node = &mut nodes[self.idx as usize];
        assert!(
            node.history.is_none(),
            "Only leaf variables can have derivatives, but {} was computed by {:?}",
            node.id,
            node.history.as_ref().map(|h| h.last_fn.name())
        );
        *node.derivative.get_or_insert(0.) += x;
    }

    /// The operands this value was computed from. Empty for leaves.
    pub fn parents(&self) -> Vec<Scalar<'a>> {
        self.with_node(|node| {
            node.history
                .as_ref()
                .map(|h| {
                    h.inputs
                        .iter()
                        .map(|&idx| Scalar {
                            tape: self.tape,
                            idx,
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Distribute `d_output` onto the operands of this value with the local
    /// derivative of the operation that produced it.
    ///
    /// # Panics
    ///
    /// Panics on leaves, or if the backward formula does not return exactly
    /// one partial derivative per operand.
    pub fn chain_rule(&self, d_output: f64) -> Vec<(Scalar<'a>, f64)> {
        self.with_node(|node| {
            let Some(h) = &node.history else {
                panic!("chain rule applied to leaf {}", node.id);
            };
            let d_inputs = h.last_fn.backward(&h.ctx, d_output);
            assert_eq!(
                d_inputs.len(),
                h.inputs.len(),
                "{} returned {} partial derivatives for {} operands",
                h.last_fn.name(),
                d_inputs.len(),
                h.inputs.len()
            );
            h.inputs
                .iter()
                .zip(d_inputs)
                .map(|(&idx, d_input)| {
                    (
                        Scalar {
                            tape: self.tape,
                            idx,
                        },
                        d_input,
                    )
                })
                .collect()
        })
    }

    /// The entry point to backpropagation, with the derivative of the output
    /// with respect to itself as the seed.
    pub fn backward(&self) {
        self.backward_with(1.);
    }

    /// Backpropagate `d_output` and accumulate derivatives on every reachable leaf.
    pub fn backward_with(&self, d_output: f64) {
        backpropagate(*self, d_output);
    }

    /// Ids of every value reachable from this one, each before all of its operands.
    pub fn topological_order(&self) -> Vec<ValueId> {
        topological_sort(*self).iter().map(Scalar::id).collect()
    }
}

impl<'a> Debug for Scalar<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_node(|node| {
            f.debug_struct("Scalar")
                .field("id", &node.id)
                .field("name", &node.name)
                .field("data", &node.data)
                .field("derivative", &node.derivative)
                .field("last_fn", &node.history.as_ref().map(|h| h.last_fn.name()))
                .finish()
        })
    }
}

impl<'a> Display for Scalar<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scalar({})", self.data())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops::{Add, Log, Mul};
    use crate::DomainError;

    #[test]
    fn test_ids_grow() {
        let tape = Tape::new();
        let a = tape.leaf(1.);
        let b = tape.leaf(2.);
        let c = tape.apply(Mul, &[a.into(), b.into()]).unwrap();
        assert!(a.id() < b.id());
        assert!(b.id() < c.id());
        assert_eq!(c.data(), 2.);
    }

    #[test]
    fn test_apply_coerces_constants() {
        let tape = Tape::new();
        let a = tape.term("a", 2.);
        let c = tape.apply(Add, &[a.into(), 5.0.into()]).unwrap();
        assert_eq!(c.data(), 7.);
        assert_eq!(tape.len(), 3);
        let parents = c.parents();
        assert_eq!(parents.len(), 2);
        assert_eq!(parents[0].id(), a.id());
        assert!(parents[1].is_constant());
        assert_eq!(parents[1].data(), 5.);
        assert!(parents[1].id() < c.id());
    }

    #[test]
    fn test_leaf_predicates() {
        let tape = Tape::new();
        let a = tape.term("a", 2.);
        let b = tape.apply(Mul, &[a.into(), a.into()]).unwrap();
        assert!(a.is_leaf());
        assert!(a.is_constant());
        assert!(!b.is_leaf());
        assert!(!b.is_constant());
        assert_eq!(a.name(), "a");
        assert!(a.parents().is_empty());
    }

    #[test]
    fn test_forward_error_propagates() {
        let tape = Tape::new();
        let a = tape.leaf(-3.);
        let res = tape.apply(Log, &[a.into()]);
        assert_eq!(res.unwrap_err(), DomainError::LogNonPositive(-3.));
        assert_eq!(tape.len(), 1);
    }

    #[test]
    fn test_accumulate_adds_up() {
        let tape = Tape::new();
        let a = tape.leaf(1.);
        assert_eq!(a.derivative(), None);
        a.accumulate_derivative(1.5);
        a.accumulate_derivative(2.);
        assert_eq!(a.derivative(), Some(3.5));
    }

    #[test]
    #[should_panic(expected = "Only leaf variables can have derivatives")]
    fn test_accumulate_on_non_leaf() {
        let tape = Tape::new();
        let a = tape.leaf(1.);
        let b = tape.apply(Mul, &[a.into(), 2.0.into()]).unwrap();
        b.accumulate_derivative(1.);
    }

    #[test]
    #[should_panic(expected = "belongs to another tape")]
    fn test_mixing_tapes() {
        let tape1 = Tape::new();
        let tape2 = Tape::new();
        let a = tape1.leaf(1.);
        let b = tape2.leaf(1.);
        let _ = tape1.apply(Add, &[a.into(), b.into()]);
    }

    #[test]
    fn test_chain_rule_pairs_operands() {
        let tape = Tape::new();
        let a = tape.leaf(2.);
        let b = tape.leaf(3.);
        let c = tape.apply(Mul, &[a.into(), b.into()]).unwrap();
        let pairs: Vec<_> = c
            .chain_rule(2.)
            .into_iter()
            .map(|(s, d)| (s.id(), d))
            .collect();
        assert_eq!(pairs, vec![(a.id(), 6.), (b.id(), 4.)]);
    }

    #[test]
    #[should_panic(expected = "add takes 2 operands, got 3")]
    fn test_apply_too_many_operands() {
        let tape = Tape::new();
        let a = tape.leaf(1.);
        let _ = tape.apply(Add, &[a.into(), a.into(), a.into()]);
    }

    #[test]
    #[should_panic(expected = "add takes 2 operands, got 1")]
    fn test_apply_too_few_operands() {
        let tape = Tape::new();
        let a = tape.leaf(1.);
        let _ = tape.apply(Add, &[a.into()]);
    }

    #[test]
    fn test_arity_checked_before_coercion() {
        let tape = Tape::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = tape.apply(Mul, &[1.0.into()]);
        }));
        assert!(res.is_err());
        assert!(tape.is_empty());
    }

    /// Claims two operands but hands back a single partial derivative.
    struct ShortBackward;

    impl ScalarFunction for ShortBackward {
        type Error = std::convert::Infallible;
        fn name(&self) -> &'static str {
            "short"
        }
        fn arity(&self) -> usize {
            2
        }
        fn forward(&self, _ctx: &mut Context, inputs: &[f64]) -> Result<f64, Self::Error> {
            Ok(inputs[0] + inputs[1])
        }
        fn backward(&self, _ctx: &Context, d_output: f64) -> Vec<f64> {
            vec![d_output]
        }
    }

    #[test]
    #[should_panic(expected = "short returned 1 partial derivatives for 2 operands")]
    fn test_backward_arity_mismatch() {
        let tape = Tape::new();
        let a = tape.leaf(1.);
        let b = tape.leaf(2.);
        let c = tape.apply(ShortBackward, &[a.into(), b.into()]).unwrap();
        c.backward();
    }

    #[test]
    fn test_display() {
        let tape = Tape::new();
        assert_eq!(tape.leaf(1.5).to_string(), "Scalar(1.5)");
    }
}
