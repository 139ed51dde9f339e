use nalgebra_sparse::{CooMatrix, CsrMatrix};
use weakfem_sparse::sparse::{push_block, row_sum_diagonal};

/// Accumulates variable blocks of a square global matrix.
///
/// Block `(i, j)` covers rows `i * block_size..` and columns `j * block_size..`. Contributions to
/// the same block are summed when the accumulator is converted to CSR.
#[derive(Debug)]
pub(crate) struct BlockAccumulator {
    block_size: usize,
    coo: CooMatrix<f64>,
}

impl BlockAccumulator {
    pub fn new(n_blocks: usize, block_size: usize) -> Self {
        let n = n_blocks * block_size;
        Self {
            block_size,
            coo: CooMatrix::new(n, n),
        }
    }

    /// Adds `block` at `(row_block, col_block)`, and its transpose at `(col_block, row_block)` if
    /// `mirror` is set.
    pub fn add(&mut self, row_block: usize, col_block: usize, block: &CsrMatrix<f64>, lumped: bool, mirror: bool) {
        let lumped_block;
        let block = if lumped {
            lumped_block = row_sum_diagonal(block);
            &lumped_block
        } else {
            block
        };
        let n = self.block_size;
        push_block(&mut self.coo, block, row_block * n, col_block * n, 1.0);
        if mirror {
            for (i, j, &v) in block.triplet_iter() {
                self.coo.push(col_block * n + j, row_block * n + i, v);
            }
        }
    }

    pub fn into_csr(self) -> CsrMatrix<f64> {
        CsrMatrix::from(&self.coo)
    }
}
