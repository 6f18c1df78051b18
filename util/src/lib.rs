/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

pub fn prefix_sum(counts: impl IntoIterator<Item = usize>, x0: usize) -> impl Iterator<Item = usize> {
    counts.into_iter().scan(x0, |sum, x| {
        let current = *sum;
        *sum += x;
        Some(current)
    })
}

/// Global DOFs of the elements of a chain of `num_elements` two-node elements with
/// `dofs_per_node` DOFs per node, with node-major DOF numbering.
pub fn chain_element_dofs(num_elements: usize, dofs_per_node: usize) -> Vec<Vec<usize>> {
    (0..num_elements)
        .map(|e| (e * dofs_per_node..(e + 2) * dofs_per_node).collect())
        .collect()
}
