//! Structural helpers for CSR matrices.
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Extracts the diagonal of a square matrix. Missing entries are zero.
pub fn diagonal(matrix: &CsrMatrix<f64>) -> DVector<f64> {
    assert_eq!(matrix.nrows(), matrix.ncols(), "diagonal requires a square matrix");
    let mut diagonal = DVector::zeros(matrix.nrows());
    for (i, row) in matrix.row_iter().enumerate() {
        diagonal[i] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .filter(|(&j, _)| j == i)
            .map(|(_, v)| v)
            .sum();
    }
    diagonal
}

/// Builds a square diagonal matrix. Explicit zeros are kept so the pattern is the full diagonal.
pub fn csr_from_diagonal(diagonal: &DVector<f64>) -> CsrMatrix<f64> {
    let n = diagonal.len();
    let offsets = (0..=n).collect();
    let indices = (0..n).collect();
    CsrMatrix::try_from_csr_data(n, n, offsets, indices, diagonal.as_slice().to_vec())
        .expect("Must succeed since diagonal CSR data is valid by construction")
}

/// Multiplies row `i` of `matrix` by `factors[i]`, i.e. computes `diag(factors) * matrix` in place.
pub fn scale_rows(matrix: &mut CsrMatrix<f64>, factors: &DVector<f64>) {
    assert_eq!(matrix.nrows(), factors.len(), "one factor per row is required");
    for (mut row, &factor) in matrix.row_iter_mut().zip(factors.iter()) {
        for value in row.values_mut() {
            *value *= factor;
        }
    }
}

/// Collapses a square matrix to the diagonal matrix holding its row sums.
pub fn row_sum_diagonal(matrix: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    let sums = DVector::from_iterator(matrix.nrows(), matrix.row_iter().map(|row| row.values().iter().sum()));
    csr_from_diagonal(&sums)
}

/// Appends `scale * block` to `target` with its upper-left corner at `(row_offset, col_offset)`.
pub fn push_block(target: &mut CooMatrix<f64>, block: &CsrMatrix<f64>, row_offset: usize, col_offset: usize, scale: f64) {
    for (i, j, &v) in block.triplet_iter() {
        target.push(row_offset + i, col_offset + j, scale * v);
    }
}

/// Selects the given rows of a dense vector.
pub fn gather(vector: &DVector<f64>, indices: &[usize]) -> DVector<f64> {
    DVector::from_iterator(indices.len(), indices.iter().map(|&i| vector[i]))
}

/// Writes `values[k]` to `vector[indices[k]]`.
pub fn scatter(vector: &mut DVector<f64>, indices: &[usize], values: &DVector<f64>) {
    assert_eq!(indices.len(), values.len());
    for (&i, &v) in indices.iter().zip(values.iter()) {
        vector[i] = v;
    }
}

/// Number of stored entries per column whose value is nonzero.
pub fn count_nonzeros_per_column(matrix: &CsrMatrix<f64>) -> Vec<usize> {
    let mut counts = vec![0; matrix.ncols()];
    for (_, j, &v) in matrix.triplet_iter() {
        if v != 0.0 {
            counts[j] += 1;
        }
    }
    counts
}
