//! Composite fields and vector fields.

use std::sync::Arc;

use drift_core::{ErrorKind, EvalError};

use crate::error::FieldError;
use crate::field::Field;
use crate::sampler::FieldSampler;

/// A field expression evaluated by structural recursion.
#[derive(Clone, Debug)]
pub enum FieldExpr {
    /// A single field.
    Leaf(Arc<Field>),
    /// The sum of all children.
    Sum(Vec<FieldExpr>),
    /// The first child that can be sampled at the point, in order.
    ///
    /// A child failing with [`ErrorKind::OutOfBounds`] or
    /// [`ErrorKind::Interpolation`] hands over to the next one; the last
    /// child's error is the expression's error.
    FirstValid(Vec<FieldExpr>),
}

impl FieldExpr {
    /// Wrap a field.
    pub fn leaf(field: Arc<Field>) -> Self {
        Self::Leaf(field)
    }

    /// Sum of `children`, which must not be empty.
    pub fn sum(children: Vec<FieldExpr>) -> Result<Self, FieldError> {
        if children.is_empty() {
            return Err(FieldError::EmptyExpression);
        }
        Ok(Self::Sum(children))
    }

    /// Ordered fallback over `children`, which must not be empty.
    pub fn first_valid(children: Vec<FieldExpr>) -> Result<Self, FieldError> {
        if children.is_empty() {
            return Err(FieldError::EmptyExpression);
        }
        Ok(Self::FirstValid(children))
    }

    /// Every field referenced by the expression, depth first.
    pub fn leaves(&self) -> Vec<&Arc<Field>> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Arc<Field>>) {
        match self {
            Self::Leaf(f) => out.push(f),
            Self::Sum(children) | Self::FirstValid(children) => {
                for c in children {
                    c.collect_leaves(out);
                }
            }
        }
    }

    /// Value of the expression at `(t, z, y, x)`.
    pub fn sample(&self, t: f64, z: f64, y: f64, x: f64) -> Result<f64, EvalError> {
        match self {
            Self::Leaf(f) => f.sample(t, z, y, x),
            Self::Sum(children) => children
                .iter()
                .try_fold(0.0, |acc, c| Ok(acc + c.sample(t, z, y, x)?)),
            Self::FirstValid(children) => {
                let mut last = None;
                for c in children {
                    match c.sample(t, z, y, x) {
                        Err(e) if falls_through(&e) => last = Some(e),
                        other => return other,
                    }
                }
                Err(last.unwrap_or_else(|| {
                    EvalError::entity(ErrorKind::OutOfBounds, "empty first-valid expression")
                }))
            }
        }
    }
}

fn falls_through(e: &EvalError) -> bool {
    matches!(
        e.kind(),
        Some(ErrorKind::OutOfBounds | ErrorKind::Interpolation)
    )
}

impl From<Arc<Field>> for FieldExpr {
    fn from(field: Arc<Field>) -> Self {
        Self::Leaf(field)
    }
}

impl FieldSampler for FieldExpr {
    fn sample(&self, t: f64, z: f64, y: f64, x: f64) -> Result<f64, EvalError> {
        FieldExpr::sample(self, t, z, y, x)
    }
}

/// Components sampled together, usually a velocity.
#[derive(Clone, Debug)]
pub struct VectorField {
    name: String,
    u: FieldExpr,
    v: FieldExpr,
    w: Option<FieldExpr>,
}

impl VectorField {
    /// Two-component vector field.
    pub fn new(name: impl Into<String>, u: impl Into<FieldExpr>, v: impl Into<FieldExpr>) -> Self {
        Self {
            name: name.into(),
            u: u.into(),
            v: v.into(),
            w: None,
        }
    }

    /// Add a vertical component.
    pub fn with_w(mut self, w: impl Into<FieldExpr>) -> Self {
        self.w = Some(w.into());
        self
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every field referenced by any component.
    pub fn leaves(&self) -> Vec<&Arc<Field>> {
        let mut out = self.u.leaves();
        out.extend(self.v.leaves());
        if let Some(w) = &self.w {
            out.extend(w.leaves());
        }
        out
    }

    /// `(u, v, w)` at the point; `w` is 0 without a vertical component.
    pub fn sample(&self, t: f64, z: f64, y: f64, x: f64) -> Result<(f64, f64, f64), EvalError> {
        let u = self.u.sample(t, z, y, x)?;
        let v = self.v.sample(t, z, y, x)?;
        let w = match &self.w {
            Some(w) => w.sample(t, z, y, x)?,
            None => 0.0,
        };
        Ok((u, v, w))
    }
}
