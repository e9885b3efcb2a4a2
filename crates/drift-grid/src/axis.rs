//! One coordinate axis.

use crate::error::GridError;

/// Where a coordinate falls relative to an [`Axis`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxisPosition {
    /// Inside the axis span: `values[index] <= v <= values[index + 1]`
    /// with `frac` the relative offset from `values[index]`.
    Inside {
        /// Lower cell index.
        index: usize,
        /// Fraction in `[0, 1]`.
        frac: f64,
    },
    /// Below the first value.
    Below,
    /// Above the last value, or NaN.
    Above,
}

/// A strictly increasing, finite sequence of coordinate values.
#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    name: &'static str,
    values: Vec<f64>,
}

impl Axis {
    /// Validate and wrap `values`.
    pub fn new(name: &'static str, values: Vec<f64>) -> Result<Self, GridError> {
        if values.is_empty() {
            return Err(GridError::EmptyAxis { axis: name });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(GridError::NonFiniteAxis { axis: name, index });
        }
        if let Some(w) = values.windows(2).position(|w| w[1] <= w[0]) {
            return Err(GridError::NonMonotonicAxis {
                axis: name,
                index: w + 1,
            });
        }
        Ok(Self { name, values })
    }

    /// Axis name, used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`: construction rejects empty axes.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value at `i`. Panics if out of range.
    pub fn get(&self, i: usize) -> f64 {
        self.values[i]
    }

    /// First value.
    pub fn first(&self) -> f64 {
        self.values[0]
    }

    /// Last value.
    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Largest index with `values[i] <= v`, or `None` if `v` is below the
    /// first value.
    pub fn floor_index(&self, v: f64) -> Option<usize> {
        self.values.partition_point(|&a| a <= v).checked_sub(1)
    }

    /// Smallest index with `values[i] >= v`, or `None` if `v` is above the
    /// last value.
    pub fn ceil_index(&self, v: f64) -> Option<usize> {
        let i = self.values.partition_point(|&a| a < v);
        (i < self.values.len()).then_some(i)
    }

    /// Locate `v` on the axis.
    ///
    /// A single-value axis accepts every coordinate. The last value is
    /// inside, at fraction 1 of the last cell.
    pub fn locate(&self, v: f64) -> AxisPosition {
        let n = self.values.len();
        if n == 1 {
            return AxisPosition::Inside {
                index: 0,
                frac: 0.0,
            };
        }
        if v.is_nan() {
            return AxisPosition::Above;
        }
        if v < self.values[0] {
            return AxisPosition::Below;
        }
        if v > self.values[n - 1] {
            return AxisPosition::Above;
        }
        let index = self.floor_index(v).unwrap_or(0).min(n - 2);
        let lo = self.values[index];
        let hi = self.values[index + 1];
        AxisPosition::Inside {
            index,
            frac: (v - lo) / (hi - lo),
        }
    }
}
