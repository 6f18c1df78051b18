//! Strategies for property-based testing of layouts, interpolators and DOF vectors.
use crate::interpolate::SparseInterpolator;
use crate::layout::{VariableId, VariableTable};
use ::proptest::collection::vec;
use ::proptest::prelude::*;

/// Extents of a single variable with rank at most `max_rank`.
pub fn extents(max_rank: usize, max_extent: usize) -> impl Strategy<Value = Vec<usize>> {
    vec(1..=max_extent, 0..=max_rank)
}

/// A finalized table with between one and `max_variables` variables named `v0`, `v1`, ...
pub fn variable_table(
    max_variables: usize,
    max_rank: usize,
    max_extent: usize,
) -> impl Strategy<Value = VariableTable> {
    vec(extents(max_rank, max_extent), 1..=max_variables.max(1)).prop_map(|all_extents| {
        let mut table = VariableTable::new();
        for (i, extents) in all_extents.iter().enumerate() {
            table
                .add_variable(format!("v{}", i), 0, extents)
                .expect("Generated variables are always valid");
        }
        table.finalize();
        table
    })
}

/// A table together with one of its variables and an in-range multi-index for that variable.
pub fn table_with_multi_index(
    max_variables: usize,
    max_rank: usize,
    max_extent: usize,
) -> impl Strategy<Value = (VariableTable, VariableId, Vec<usize>)> {
    variable_table(max_variables, max_rank, max_extent)
        .prop_flat_map(|table| {
            let ids: Vec<_> = table.variable_ids().collect();
            (Just(table), ::proptest::sample::select(ids))
        })
        .prop_flat_map(|(table, id)| {
            let multi_index: Vec<_> = table.extents(id).iter().map(|&extent| 0..extent).collect();
            (Just(table), Just(id), multi_index)
        })
}

/// An interpolator with the given shape, where each weight is present with probability
/// `density`.
pub fn sparse_interpolator(
    num_samples: usize,
    num_dofs: usize,
    density: f64,
) -> impl Strategy<Value = SparseInterpolator<f64>> {
    let entry = ::proptest::option::weighted(density, -2.0..2.0f64);
    vec(entry, num_samples * num_dofs).prop_map(move |entries| {
        let mut row_offsets = vec![0];
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for row in entries.chunks(num_dofs.max(1)).take(num_samples) {
            for (j, entry) in row.iter().enumerate() {
                if let Some(value) = entry {
                    columns.push(j);
                    values.push(*value);
                }
            }
            row_offsets.push(columns.len());
        }
        row_offsets.resize(num_samples + 1, columns.len());
        SparseInterpolator::from_compressed(num_dofs, row_offsets, columns, values)
            .expect("Generated interpolator is always valid")
    })
}

/// An interpolator with arbitrary shape up to the given bounds.
pub fn any_sparse_interpolator(
    max_samples: usize,
    max_dofs: usize,
) -> impl Strategy<Value = SparseInterpolator<f64>> {
    (0..=max_samples, 0..=max_dofs).prop_flat_map(|(num_samples, num_dofs)| sparse_interpolator(num_samples, num_dofs, 0.5))
}

/// A vector of the given length with entries in `[-10, 10)`.
pub fn dof_vector(len: usize) -> impl Strategy<Value = Vec<f64>> {
    vec(-10.0..10.0f64, len)
}
