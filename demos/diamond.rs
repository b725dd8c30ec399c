//! Dependency graph in diamond shape. It uses the same term twice, so the derivative should add up.

use scalograd::Tape;

fn main() -> std::io::Result<()> {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let a2 = -a;
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a2 + b;
    let ac = a2 + c;
    let abac = ab * ac;

    abac.backward();
    println!("abac: {}", abac.data());
    println!("a: {:?}", a.derivative());
    println!("b: {:?}", b.derivative());
    println!("c: {:?}", c.derivative());
    abac.dot_builder()
        .show_values(true)
        .highlights(a.id())
        .dot(&mut std::io::stdout())
}
