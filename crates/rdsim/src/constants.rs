//! Numerical tolerances and reserved identifiers.
//!
//! All geometry runs in f64; the tolerances below are calibrated for
//! positions of order 1 in the partition's length unit (cm).

/// Absolute tolerance for geometric predicates (plane-side tests,
/// denominator guards, collision-time cutoffs).
pub const EPS: f64 = 1e-12;

/// Looser tolerance for quantities that went through a square root.
pub const SQRT_EPS: f64 = 1e-6;

/// Stand-in for "never happens" times (unimolecular lifetime with no
/// reaction, parametric misses).
pub const FOREVER: f64 = 1e140;

/// sqrt(2), used by the subpartition halo inflation.
pub const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// 1/sqrt(2): per-component scale of the 3D Gaussian displacement.
pub const FRAC_1_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Largest |a - b| at which two floats are treated as the same value,
/// relative to their magnitudes. See `geom::distinguishable`.
pub const EPS_DISTINGUISHABLE: f64 = 1e-12;

/// Distance (relative to position magnitude) by which volume products of
/// wall reactions are placed off the wall plane, so their first step sees
/// the wall as ordinary geometry instead of an immediate collision.
pub const PRODUCT_WALL_OFFSET: f64 = 1e-9;

/// Default cap on wall reflections within one diffusion step.
pub const DEFAULT_MAX_REFLECTIONS: usize = 100;

/// Default cap on collision-test restarts (REDO outcomes) per step.
pub const DEFAULT_MAX_COLLISION_REDOS: usize = 10;

/// Default cap on wall-to-wall traversals of one surface step.
pub const DEFAULT_MAX_SURFACE_CROSSINGS: usize = 100;
