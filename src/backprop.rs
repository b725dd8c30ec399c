use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
};

use log::{debug, trace};

use crate::tape::{Scalar, ValueId};

/// Every value reachable from `root`, each placed before all of its operands.
///
/// Operands always have smaller ids than their consumers, so sorting the
/// reachable set by descending id is a valid order.
pub(crate) fn topological_sort(root: Scalar<'_>) -> Vec<Scalar<'_>> {
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    let mut order = vec![];
    while let Some(var) = stack.pop() {
        if !visited.insert(var.id()) {
            continue;
        }
        order.push(var);
        stack.extend(var.parents());
    }
    order.sort_by_cached_key(|var| Reverse(var.id()));
    order
}

/// Run backpropagation from `root` and deposit the derivatives on the leaves.
///
/// The pending derivatives are kept in a ledger keyed by id. Values are popped
/// in topological order, so every consumer of a value has already added its
/// contribution by the time the value is expanded.
pub(crate) fn backpropagate(root: Scalar<'_>, d_output: f64) {
    let order = topological_sort(root);
    debug!(
        "backpropagate from {} with seed {d_output} over {} values",
        root.id(),
        order.len()
    );

    let mut ledger: HashMap<ValueId, f64> = HashMap::from([(root.id(), d_output)]);
    for var in order {
        let Some(d) = ledger.remove(&var.id()) else {
            continue;
        };
        trace!("expand {} with derivative {d}", var.id());
        if var.is_leaf() {
            var.accumulate_derivative(d);
            continue;
        }
        for (input, d_input) in var.chain_rule(d) {
            *ledger.entry(input.id()).or_insert(0.) += d_input;
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        ops::{Add, Mul},
        Tape,
    };

    #[test]
    fn test_order_root_first() {
        let tape = Tape::new();
        let a = tape.term("a", 1.);
        let b = tape.term("b", 3.);
        let c = tape.term("c", 5.);
        let ab = tape.apply(Add, &[a.into(), b.into()]).unwrap();
        let ac = tape.apply(Add, &[a.into(), c.into()]).unwrap();
        let abac = tape.apply(Mul, &[ab.into(), ac.into()]).unwrap();

        let order = abac.topological_order();
        assert_eq!(
            order,
            vec![abac.id(), ac.id(), ab.id(), c.id(), b.id(), a.id()]
        );
        assert_eq!(order, abac.topological_order());
    }

    #[test]
    fn test_shared_operand_visited_once() {
        let tape = Tape::new();
        let x = tape.leaf(3.);
        let y = tape.apply(Mul, &[x.into(), x.into()]).unwrap();
        assert_eq!(y.topological_order(), vec![y.id(), x.id()]);
    }

    #[test]
    fn test_seed_scales_derivatives() {
        let tape = Tape::new();
        let x = tape.leaf(3.);
        let y = tape.apply(Mul, &[x.into(), 2.0.into()]).unwrap();
        y.backward_with(5.);
        assert_eq!(x.derivative(), Some(10.));
    }

    #[test]
    fn test_leaf_root() {
        let tape = Tape::new();
        let x = tape.leaf(3.);
        x.backward();
        assert_eq!(x.derivative(), Some(1.));
    }

    #[test]
    fn test_unreachable_leaf_untouched() {
        let tape = Tape::new();
        let x = tape.leaf(3.);
        let unused = tape.leaf(4.);
        let y = tape.apply(Add, &[x.into(), x.into()]).unwrap();
        y.backward();
        assert_eq!(x.derivative(), Some(2.));
        assert_eq!(unused.derivative(), None);
    }
}
