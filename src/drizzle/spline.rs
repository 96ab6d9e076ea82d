//! Two-dimensional surface (thin plate) spline parameters
//!
//! An alignment spline maps reference coordinates to source coordinates.
//! Only the parameter set is modeled here; evaluation happens in the
//! registration pipeline that consumes the record.

/// Parameters of one interpolating/smoothing surface spline.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSpline {
    /// Coordinate normalization scale, > 0.
    pub scaling_factor: f64,
    /// Normalization offset applied to X node coordinates.
    pub zero_offset_x: f64,
    /// Normalization offset applied to Y node coordinates.
    pub zero_offset_y: f64,
    /// Derivative order, >= 1.
    pub order: i32,
    /// Smoothing factor, >= 0; zero for an interpolating spline.
    pub smoothing: f64,
    /// X coordinates of the spline nodes.
    pub x: Vec<f64>,
    /// Y coordinates of the spline nodes.
    pub y: Vec<f64>,
    /// Optional per-node weights for smoothing splines.
    pub weights: Vec<f32>,
    /// Spline coefficients: one per node plus the polynomial part.
    pub coefficients: Vec<f64>,
}

impl Default for SurfaceSpline {
    fn default() -> Self {
        Self {
            scaling_factor: 1.0,
            zero_offset_x: 0.0,
            zero_offset_y: 0.0,
            order: 2,
            smoothing: 0.0,
            x: Vec::new(),
            y: Vec::new(),
            weights: Vec::new(),
            coefficients: Vec::new(),
        }
    }
}

impl SurfaceSpline {
    /// Number of polynomial terms for a given derivative order.
    pub fn polynomial_terms(order: i32) -> usize {
        (order * (order + 1) / 2) as usize
    }

    /// Number of spline nodes.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True when the spline has no nodes.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Structural validity: at least three nodes, congruent vector lengths,
    /// a coefficient for each node plus each polynomial term, and sane
    /// normalization/order parameters.
    pub fn is_valid(&self) -> bool {
        self.x.len() >= 3
            && self.y.len() == self.x.len()
            && (self.weights.is_empty() || self.weights.len() == self.x.len())
            && self.order >= 1
            && self.scaling_factor > 0.0
            && self.smoothing >= 0.0
            && self.coefficients.len() == self.x.len() + Self::polynomial_terms(self.order)
    }
}
