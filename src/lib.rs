//! Reverse-mode automatic differentiation of scalar expressions.
//!
//! Values live on a [`Tape`]. Every operation on a [`Scalar`] records how the
//! result was produced, and [`Scalar::backward`] walks that record back to the
//! leaves, depositing the derivative of the output with respect to each of them.
//!
//! ```
//! use scalograd::Tape;
//!
//! let tape = Tape::new();
//! let a = tape.term("a", 2.);
//! let b = tape.term("b", 3.);
//! let c = a * b + a;
//! c.backward();
//! assert_eq!(a.derivative(), Some(4.));
//! assert_eq!(b.derivative(), Some(2.));
//! ```

mod arith;
mod backprop;
mod dot;
pub mod error;
pub mod numeric;
pub mod ops;
mod scalar_fn;
pub mod tape;

pub use dot::DotBuilder;
pub use error::{CheckError, DomainError};
pub use scalar_fn::{Backward, Context, ScalarFunction};
pub use tape::{Operand, Scalar, Tape, ValueId};
