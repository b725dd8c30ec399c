//! Compares the logistic function spelled out with exp and division against the
//! sigmoid primitive, value and derivative, on a range of inputs.

use scalograd::{DomainError, Scalar, Tape};

fn main() -> Result<(), DomainError> {
    println!("x, value, derivative, sigmoid derivative");
    for i in -40..=40 {
        let xval = i as f64 / 20. * std::f64::consts::PI;
        let tape = Tape::new();
        let x = tape.term("x", xval);
        let all = build_model(x)?;
        all.backward();
        let spelled = x.derivative().unwrap_or_default();

        let tape = Tape::new();
        let x = tape.term("x", xval);
        x.sigmoid().backward();
        let primitive = x.derivative().unwrap_or_default();

        println!("{xval}, {}, {spelled}, {primitive}", all.data());
    }
    Ok(())
}

fn build_model(x: Scalar) -> Result<Scalar, DomainError> {
    1. / (1. + (-x).exp())
}
