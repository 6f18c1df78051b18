use adform::dual::Dual;
use adform::interpolate::{InterpolationError, InterpolatorBuilder, SparseInterpolator};
use adform::layout::VariableTable;
use adform::proptest::{any_sparse_interpolator, dof_vector, sparse_interpolator};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;

fn example_interpolator() -> SparseInterpolator<f64> {
    // W = [ 1  0  2 ]
    //     [ 0  0  0 ]
    //     [ 0 -1  3 ]
    SparseInterpolator::from_compressed(3, vec![0, 2, 2, 4], vec![0, 2, 1, 2], vec![1.0, 2.0, -1.0, 3.0]).unwrap()
}

#[test]
fn compressed_rows_and_dense_conversion() {
    let w = example_interpolator();
    assert_eq!(w.num_samples(), 3);
    assert_eq!(w.num_dofs(), 3);
    assert_eq!(w.nnz(), 4);
    assert_eq!(w.row(0), (&[0, 2][..], &[1.0, 2.0][..]));
    assert_eq!(w.row(1), (&[][..], &[][..]));

    let dense = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, -1.0, 3.0]);
    assert_eq!(w.to_dense(), dense);
    assert_eq!(SparseInterpolator::from_dense(&dense), w);
}

#[test]
fn invalid_compressed_data_is_rejected() {
    assert_eq!(
        SparseInterpolator::from_compressed(2, vec![0, 1], vec![0, 1], vec![1.0]),
        Err(InterpolationError::LengthMismatch { columns: 2, values: 1 })
    );
    assert_eq!(
        SparseInterpolator::from_compressed(2, vec![0, 2, 1], vec![0, 1], vec![1.0, 1.0]),
        Err(InterpolationError::InvalidOffsets)
    );
    assert_eq!(
        SparseInterpolator::from_compressed(2, vec![1, 2], vec![0, 1], vec![1.0, 1.0]),
        Err(InterpolationError::InvalidOffsets)
    );
    assert_eq!(
        SparseInterpolator::from_compressed(2, vec![0, 1, 2], vec![0, 2], vec![1.0, 1.0]),
        Err(InterpolationError::ColumnOutOfBounds {
            row: 1,
            column: 2,
            num_dofs: 2
        })
    );
}

#[test]
fn apply_and_apply_transpose() {
    let w = example_interpolator();
    assert_eq!(w.apply(&[1.0, 2.0, 3.0]), vec![7.0, 0.0, 7.0]);
    assert_eq!(w.apply_transpose(&[1.0, 5.0, 2.0]), vec![1.0, -2.0, 8.0]);

    // The output is overwritten rather than accumulated into
    let mut dofs = vec![100.0; 3];
    w.apply_transpose_into(&mut dofs, &[1.0, 5.0, 2.0]);
    assert_eq!(dofs, vec![1.0, -2.0, 8.0]);
}

#[test]
fn apply_propagates_dual_derivatives() {
    let w = example_interpolator();
    let dofs = [Dual::new(1.0, 0.0), Dual::new(2.0, 1.0), Dual::new(3.0, 0.0)];
    let samples = w.apply(&dofs);
    // Seeding DOF 1 recovers column 1 of W
    let derivatives: Vec<_> = samples.iter().map(|s| s.derivative).collect();
    assert_eq!(derivatives, vec![0.0, 0.0, -1.0]);
}

#[test]
fn identity_interpolator() {
    let w = SparseInterpolator::<f64>::identity(4);
    assert_eq!(w.to_dense(), DMatrix::identity(4, 4));
    assert_eq!(w.apply(&[1.0, 2.0, 3.0, 4.0]), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn transpose_lists_samples_in_increasing_order() {
    let w = example_interpolator();
    let wt = w.transpose();
    assert_eq!(wt.num_samples(), 3);
    assert_eq!(wt.num_dofs(), 3);
    assert_eq!(wt.row(0), (&[0][..], &[1.0][..]));
    assert_eq!(wt.row(1), (&[2][..], &[-1.0][..]));
    assert_eq!(wt.row(2), (&[0, 2][..], &[2.0, 3.0][..]));

    // Reusing storage of a previous, differently shaped transpose
    let mut output = SparseInterpolator::identity(7);
    w.transpose_into(&mut output);
    assert_eq!(output, wt);
}

#[test]
fn builder_places_blocks_at_field_offsets() {
    let mut table = VariableTable::new();
    let u = table.add_variable("u", 0, &[]).unwrap();
    let grad_u = table.add_variable("grad_u", 0, &[2]).unwrap();
    let p = table.add_variable("p", 1, &[]).unwrap();
    table.finalize();

    let value_block = DMatrix::from_row_slice(1, 2, &[0.5, 0.5]);
    let gradient_block = DMatrix::from_row_slice(2, 2, &[-1.0, 1.0, 0.0, 0.0]);
    let w = InterpolatorBuilder::new(&table, &[2, 1])
        .unwrap()
        .with_block(u, value_block)
        .unwrap()
        .with_block(grad_u, gradient_block)
        .unwrap()
        .with_identity(p)
        .unwrap()
        .build()
        .unwrap();

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 3, &[
        0.5, 0.5, 0.0,
        -1.0, 1.0, 0.0,
        0.0, 0.0, 0.0,
        0.0, 0.0, 1.0,
    ]);
    assert_eq!(w.num_samples(), table.sample_count());
    assert_eq!(w.to_dense(), expected);
    // Zero weights are not stored
    assert_eq!(w.nnz(), 5);
}

#[test]
fn builder_errors() {
    let mut unfinalized = VariableTable::new();
    unfinalized.add_variable("u", 0, &[]).unwrap();
    assert_eq!(
        InterpolatorBuilder::<f64>::new(&unfinalized, &[1]).unwrap_err(),
        InterpolationError::LayoutNotFinalized
    );

    let mut table = VariableTable::new();
    let u = table.add_variable("u", 0, &[2]).unwrap();
    let v = table.add_variable("v", 1, &[]).unwrap();
    table.finalize();

    assert_eq!(
        InterpolatorBuilder::<f64>::new(&table, &[2]).unwrap_err(),
        InterpolationError::FieldOutOfBounds {
            name: "v".to_string(),
            field: 1,
            num_fields: 1
        }
    );

    let builder = InterpolatorBuilder::<f64>::new(&table, &[2, 3]).unwrap();
    assert_eq!(
        builder.clone().with_block(v, DMatrix::zeros(1, 2)).unwrap_err(),
        InterpolationError::BlockShape {
            name: "v".to_string(),
            expected: (1, 3),
            actual: (1, 2)
        }
    );
    assert_eq!(
        builder
            .clone()
            .with_identity(u)
            .unwrap()
            .with_identity(u)
            .unwrap_err(),
        InterpolationError::DuplicateBlock("u".to_string())
    );
    assert_eq!(
        builder.with_identity(u).unwrap().build().unwrap_err(),
        InterpolationError::MissingBlock("v".to_string())
    );
}

proptest! {
    #[test]
    fn apply_transpose_is_adjoint_of_apply(
        (w, u, s) in (1..6usize, 1..6usize)
            .prop_flat_map(|(m, n)| (sparse_interpolator(m, n, 0.5), dof_vector(n), dof_vector(m)))
    ) {
        // <W u, s> = <u, W^T s>
        let wu = DVector::from_vec(w.apply(u.as_slice()));
        let wts = DVector::from_vec(w.apply_transpose(s.as_slice()));
        let lhs = wu.dot(&DVector::from_vec(s));
        let rhs = DVector::from_vec(u).dot(&wts);
        prop_assert!((lhs - rhs).abs() <= 1e-10 * (1.0 + lhs.abs()));
    }

    #[test]
    fn transpose_matches_dense_transpose(w in any_sparse_interpolator(6, 6)) {
        let wt = w.transpose();
        assert_matrix_eq!(wt.to_dense(), w.to_dense().transpose());
        prop_assert_eq!(wt.transpose(), w);
    }

    #[test]
    fn apply_matches_dense_product(
        (w, u) in (0..6usize, 0..6usize).prop_flat_map(|(m, n)| (sparse_interpolator(m, n, 0.3), dof_vector(n)))
    ) {
        let expected = w.to_dense() * DVector::from_column_slice(&u);
        let samples = DVector::from_vec(w.apply(u.as_slice()));
        assert_matrix_eq!(samples, expected, comp = abs, tol = 1e-12);
    }
}
