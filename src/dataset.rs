//! In-memory tabular data and the regression problem definition.
//!
//! [`Dataset`] stores named `f64` columns (column-major). Column names are
//! hashed with FNV-1a so that variable nodes can reference inputs by a stable
//! 64-bit identity. [`Problem`] fixes the inputs, the target and the
//! training/test row ranges, and carries the [`PrimitiveSet`] used to build
//! trees.

use crate::error::{Error, Result};
use crate::tree::PrimitiveSet;
use fnv::FnvHasher;
use std::hash::Hasher;
use std::ops::Range;

/// Stable hash of a variable name.
pub fn variable_hash(name: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(name.as_bytes());
    hasher.finish()
}

/// A named dataset column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    /// Column name.
    pub name: String,
    /// [`variable_hash`] of the name.
    pub hash: u64,
    /// Column index in the dataset.
    pub index: usize,
}

/// Column-major numeric matrix with named columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    variables: Vec<Variable>,
    columns: Vec<Vec<f64>>,
    rows: usize,
}

impl Dataset {
    /// Builds a dataset from `(name, column)` pairs.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDataset`] if there are no columns, if column
    /// lengths differ, or if two columns share a name.
    ///
    /// ```
    /// use u_symreg::dataset::Dataset;
    ///
    /// let ds = Dataset::new(vec![
    ///     ("x".to_string(), vec![1.0, 2.0]),
    ///     ("y".to_string(), vec![2.0, 4.0]),
    /// ]).unwrap();
    /// assert_eq!(ds.rows(), 2);
    /// assert_eq!(ds.values_by_name("y"), Some(&[2.0, 4.0][..]));
    /// ```
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let Some((_, first)) = columns.first() else {
            return Err(Error::InvalidDataset("no columns".into()));
        };
        let rows = first.len();

        let mut variables = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (index, (name, column)) in columns.into_iter().enumerate() {
            if column.len() != rows {
                return Err(Error::InvalidDataset(format!(
                    "column `{name}` has {} rows, expected {rows}",
                    column.len()
                )));
            }
            if variables.iter().any(|v: &Variable| v.name == name) {
                return Err(Error::InvalidDataset(format!("duplicate column `{name}`")));
            }
            variables.push(Variable {
                hash: variable_hash(&name),
                name,
                index,
            });
            values.push(column);
        }

        Ok(Self {
            variables,
            columns: values,
            rows,
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    /// All columns as variables, in column order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Looks up a variable by hash.
    pub fn variable_by_hash(&self, hash: u64) -> Option<&Variable> {
        self.variables.iter().find(|v| v.hash == hash)
    }

    /// Column values for a variable hash.
    pub fn values(&self, hash: u64) -> Option<&[f64]> {
        self.variable_by_hash(hash)
            .map(|v| self.columns[v.index].as_slice())
    }

    /// Column values for a variable name.
    pub fn values_by_name(&self, name: &str) -> Option<&[f64]> {
        self.variable(name).map(|v| self.columns[v.index].as_slice())
    }

    /// Checks that `range` lies inside the dataset.
    ///
    /// # Errors
    /// Returns [`Error::RangeOutOfBounds`] otherwise.
    pub fn check_range(&self, range: &Range<usize>) -> Result<()> {
        if range.start > range.end || range.end > self.rows {
            return Err(Error::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                rows: self.rows,
            });
        }
        Ok(())
    }
}

/// A regression task over a [`Dataset`].
#[derive(Debug, Clone)]
pub struct Problem {
    dataset: Dataset,
    inputs: Vec<Variable>,
    target: Variable,
    training_range: Range<usize>,
    test_range: Range<usize>,
    explicit_test_range: bool,
    primitive_set: PrimitiveSet,
}

impl Problem {
    /// Creates a problem predicting `target` from every other column.
    ///
    /// The training range defaults to the first two thirds of the rows (at
    /// least one) and the test range to the remainder, which is empty for a
    /// single-row dataset. The two ranges never share a row.
    ///
    /// # Errors
    /// Returns [`Error::UnknownVariableName`] if `target` is not a column and
    /// [`Error::InvalidDataset`] if the dataset has no rows.
    pub fn new(dataset: Dataset, target: &str) -> Result<Self> {
        let target = dataset
            .variable(target)
            .cloned()
            .ok_or_else(|| Error::UnknownVariableName(target.to_string()))?;
        let inputs = dataset
            .variables()
            .iter()
            .filter(|v| v.hash != target.hash)
            .cloned()
            .collect();

        let rows = dataset.rows();
        if rows == 0 {
            return Err(Error::InvalidDataset("no rows".into()));
        }
        let training_range = 0..(2 * rows / 3).max(1);
        let test_range = infer_test_range(&training_range, rows);

        Ok(Self {
            dataset,
            inputs,
            target,
            training_range,
            test_range,
            explicit_test_range: false,
            primitive_set: PrimitiveSet::arithmetic(),
        })
    }

    /// Restricts the inputs to the named columns.
    ///
    /// # Errors
    /// Returns [`Error::UnknownVariableName`] for a name that is not a column.
    pub fn with_inputs(mut self, names: &[&str]) -> Result<Self> {
        self.inputs = names
            .iter()
            .map(|name| {
                self.dataset
                    .variable(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownVariableName((*name).to_string()))
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Sets the training range.
    ///
    /// A test range that was never set explicitly is re-derived from the rows
    /// outside `range`.
    ///
    /// # Errors
    /// Returns [`Error::RangeOutOfBounds`] if the range is empty or outside the
    /// dataset, and [`Error::OverlappingRanges`] if it shares rows with an
    /// explicitly set test range.
    pub fn with_training_range(mut self, range: Range<usize>) -> Result<Self> {
        self.dataset.check_range(&range)?;
        if range.is_empty() {
            return Err(Error::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                rows: self.dataset.rows(),
            });
        }
        if !self.explicit_test_range {
            self.test_range = infer_test_range(&range, self.dataset.rows());
        }
        check_disjoint(&range, &self.test_range)?;
        self.training_range = range;
        Ok(self)
    }

    /// Sets the test range. An empty range disables testing.
    ///
    /// # Errors
    /// Returns [`Error::RangeOutOfBounds`] if the range is outside the dataset
    /// and [`Error::OverlappingRanges`] if it shares rows with the training
    /// range.
    pub fn with_test_range(mut self, range: Range<usize>) -> Result<Self> {
        self.dataset.check_range(&range)?;
        check_disjoint(&self.training_range, &range)?;
        self.test_range = range;
        self.explicit_test_range = true;
        Ok(self)
    }

    /// Replaces the primitive set.
    pub fn with_primitive_set(mut self, primitive_set: PrimitiveSet) -> Self {
        self.primitive_set = primitive_set;
        self
    }

    /// The underlying dataset.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Input variables available to variable nodes.
    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    /// The target variable.
    pub fn target(&self) -> &Variable {
        &self.target
    }

    /// Training rows.
    pub fn training_range(&self) -> Range<usize> {
        self.training_range.clone()
    }

    /// Test rows.
    pub fn test_range(&self) -> Range<usize> {
        self.test_range.clone()
    }

    /// Primitive set used to build and mutate trees.
    pub fn primitive_set(&self) -> &PrimitiveSet {
        &self.primitive_set
    }

    /// Mutable access to the primitive set.
    pub fn primitive_set_mut(&mut self) -> &mut PrimitiveSet {
        &mut self.primitive_set
    }

    /// Full target column.
    pub fn target_values(&self) -> &[f64] {
        &self.dataset.columns[self.target.index]
    }

    /// Target values restricted to the training range.
    pub fn training_target(&self) -> &[f64] {
        &self.target_values()[self.training_range.clone()]
    }
}

/// The larger block of rows outside `training` (empty when it covers every
/// row).
fn infer_test_range(training: &Range<usize>, rows: usize) -> Range<usize> {
    if training.start >= rows - training.end {
        0..training.start
    } else {
        training.end..rows
    }
}

fn check_disjoint(training: &Range<usize>, test: &Range<usize>) -> Result<()> {
    let overlap = training.start.max(test.start) < training.end.min(test.end);
    if overlap {
        return Err(Error::OverlappingRanges {
            training: training.clone(),
            test: test.clone(),
        });
    }
    Ok(())
}
