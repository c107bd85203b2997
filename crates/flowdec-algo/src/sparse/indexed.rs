//! Sparse matrices addressed by string keys.
//!
//! Rows and columns are identified by labels (XNEC ids, injection ids, PST
//! ids, flow column labels) through a [`MatrixIndex`]. A matrix is built in
//! triplet form with [`IndexedTriplets::add_item`], then frozen into
//! compressed sparse column form for multiplication:
//!
//! ```text
//! IndexedTriplets ──to_compressed()──▶ IndexedCsc ──multiply()──▶ IndexedCsc
//!      (append)                          (frozen)
//! ```
//!
//! Values whose magnitude does not exceed the matrix epsilon, and NaNs, are
//! never stored. [`NO_FILTERING_EPSILON`] keeps every finite value,
//! explicit zeros included.

use flowdec_core::{FlowDecompositionError, FlowDecompositionResult};
use hashbrown::HashMap;
use sprs::{CsMat, TriMat};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Epsilon that disables magnitude filtering.
pub const NO_FILTERING_EPSILON: f64 = -1.0;

/// Nested `row -> column -> value` view of a matrix.
pub type MatrixMap = BTreeMap<String, BTreeMap<String, f64>>;

/// Ordered labels with their positions.
#[derive(Debug, Clone, Default)]
pub struct MatrixIndex {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

impl MatrixIndex {
    /// Build an index from labels. Duplicates keep their first position.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = MatrixIndex::default();
        for label in labels {
            let label = label.into();
            if !index.positions.contains_key(&label) {
                index.positions.insert(label.clone(), index.labels.len());
                index.labels.push(label);
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    pub fn label(&self, position: usize) -> Option<&str> {
        self.labels.get(position).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.positions.contains_key(label)
    }
}

impl PartialEq for MatrixIndex {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

/// Matrix under construction, in triplet form.
#[derive(Debug)]
pub struct IndexedTriplets {
    rows: Arc<MatrixIndex>,
    cols: Arc<MatrixIndex>,
    triplets: TriMat<f64>,
    epsilon: f64,
}

impl IndexedTriplets {
    pub fn new(rows: Arc<MatrixIndex>, cols: Arc<MatrixIndex>, epsilon: f64) -> Self {
        let triplets = TriMat::new((rows.len(), cols.len()));
        Self {
            rows,
            cols,
            triplets,
            epsilon,
        }
    }

    /// Matrix that keeps every non-NaN value.
    pub fn unfiltered(rows: Arc<MatrixIndex>, cols: Arc<MatrixIndex>) -> Self {
        Self::new(rows, cols, NO_FILTERING_EPSILON)
    }

    /// Record `value` at `(row, col)`.
    ///
    /// Both keys must belong to the indexes; a miss is an error even when the
    /// value itself would be filtered out. Repeated insertions at the same
    /// position are summed on compression.
    pub fn add_item(&mut self, row: &str, col: &str, value: f64) -> FlowDecompositionResult<()> {
        let i = self
            .rows
            .position(row)
            .ok_or_else(|| index_miss("row", row))?;
        let j = self
            .cols
            .position(col)
            .ok_or_else(|| index_miss("column", col))?;
        if value.is_nan() || value.abs() <= self.epsilon {
            return Ok(());
        }
        self.triplets.add_triplet(i, j, value);
        Ok(())
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.triplets.nnz()
    }

    pub fn rows(&self) -> &Arc<MatrixIndex> {
        &self.rows
    }

    pub fn cols(&self) -> &Arc<MatrixIndex> {
        &self.cols
    }

    /// Freeze into compressed sparse column form.
    pub fn to_compressed(self) -> IndexedCsc {
        IndexedCsc {
            matrix: self.triplets.to_csc(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub fn to_map(&self, fill_zeros: bool) -> MatrixMap {
        IndexedCsc {
            matrix: self.triplets.to_csc(),
            rows: Arc::clone(&self.rows),
            cols: Arc::clone(&self.cols),
        }
        .to_map(fill_zeros)
    }
}

/// Frozen matrix in compressed sparse column form.
#[derive(Debug, Clone)]
pub struct IndexedCsc {
    rows: Arc<MatrixIndex>,
    cols: Arc<MatrixIndex>,
    matrix: CsMat<f64>,
}

impl IndexedCsc {
    /// `self × other`. The column index of `self` must equal the row index of
    /// `other`; the product takes its rows from `self` and its columns from
    /// `other`.
    pub fn multiply(&self, other: &IndexedCsc) -> FlowDecompositionResult<IndexedCsc> {
        if *self.cols != *other.rows {
            return Err(FlowDecompositionError::Validation(format!(
                "cannot multiply: left columns ({} keys) differ from right rows ({} keys)",
                self.cols.len(),
                other.rows.len()
            )));
        }
        let product: CsMat<f64> = &self.matrix * &other.matrix;
        Ok(IndexedCsc {
            rows: Arc::clone(&self.rows),
            cols: Arc::clone(&other.cols),
            matrix: product.to_csc(),
        })
    }

    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let i = self.rows.position(row)?;
        let j = self.cols.position(col)?;
        Some(self.matrix.get(i, j).copied().unwrap_or(0.0))
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn rows(&self) -> &Arc<MatrixIndex> {
        &self.rows
    }

    pub fn cols(&self) -> &Arc<MatrixIndex> {
        &self.cols
    }

    /// Nested view of the matrix. With `fill_zeros`, every `(row, col)` pair
    /// is present; otherwise only stored entries appear.
    pub fn to_map(&self, fill_zeros: bool) -> MatrixMap {
        let mut map = MatrixMap::new();
        if fill_zeros {
            for row in self.rows.labels() {
                let columns = map.entry(row.clone()).or_default();
                for col in self.cols.labels() {
                    columns.insert(col.clone(), 0.0);
                }
            }
        }
        for (&value, (i, j)) in self.matrix.iter() {
            if let (Some(row), Some(col)) = (self.rows.label(i), self.cols.label(j)) {
                *map.entry(row.to_string())
                    .or_default()
                    .entry(col.to_string())
                    .or_insert(0.0) += value;
            }
        }
        map
    }
}

fn index_miss(axis: &'static str, key: &str) -> FlowDecompositionError {
    FlowDecompositionError::IndexMiss {
        axis,
        key: key.to_string(),
    }
}
