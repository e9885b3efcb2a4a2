//! Pluggable spatial interpolation.
//!
//! The sampler gathers the eight corner values around a point into a
//! [`Stencil`] and hands it to an [`Interpolator`] together with the
//! fractional offsets from the [`CellLocation`]. Time interpolation is
//! linear and done by the sampler, not here.

use crate::index::CellLocation;

/// Corner values of the cell around a sample point, indexed
/// `values[dz][dy][dx]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stencil {
    /// Corner values.
    pub values: [[[f64; 2]; 2]; 2],
}

/// Turns a stencil into a single value.
///
/// Implementations must be pure: the same stencil and location always
/// yield the same result. Returning `None` marks the sample as failed
/// with an interpolation error for the entity that requested it.
pub trait Interpolator: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Interpolate inside the cell.
    fn interpolate(&self, stencil: &Stencil, loc: &CellLocation) -> Option<f64>;
}

/// Trilinear interpolation on a rectilinear grid.
#[derive(Clone, Copy, Debug, Default)]
pub struct Linear;

impl Interpolator for Linear {
    fn name(&self) -> &str {
        "linear"
    }

    fn interpolate(&self, stencil: &Stencil, loc: &CellLocation) -> Option<f64> {
        let [fz, fy, fx] = loc.frac;
        let v = &stencil.values;
        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
        let plane = |dz: usize| {
            let lo = lerp(v[dz][0][0], v[dz][0][1], fx);
            let hi = lerp(v[dz][1][0], v[dz][1][1], fx);
            lerp(lo, hi, fy)
        };
        let out = lerp(plane(0), plane(1), fz);
        out.is_finite().then_some(out)
    }
}

/// Value of the nearest stencil corner.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nearest;

impl Interpolator for Nearest {
    fn name(&self) -> &str {
        "nearest"
    }

    fn interpolate(&self, stencil: &Stencil, loc: &CellLocation) -> Option<f64> {
        let pick = |f: f64| usize::from(f >= 0.5);
        let [fz, fy, fx] = loc.frac;
        let out = stencil.values[pick(fz)][pick(fy)][pick(fx)];
        out.is_finite().then_some(out)
    }
}
