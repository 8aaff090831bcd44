//! Service contours: distance-by-azimuth tables.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A tabulated contour: distances in km at equal azimuth steps starting from
/// true north.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    distances: Vec<f64>,
}

impl Contour {
    /// Build a contour from equally spaced distances. The azimuth step is
    /// `360 / distances.len()`.
    pub fn new(distances: Vec<f64>) -> ModelResult<Self> {
        if distances.len() < 4 {
            return Err(ModelError::ContourTooSmall(distances.len()));
        }
        Ok(Self { distances })
    }

    /// Number of tabulated points.
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Azimuth step between tabulated points, degrees.
    pub fn azimuth_step(&self) -> f64 {
        360.0 / self.distances.len() as f64
    }

    /// Raw distance table.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Contour distance at an arbitrary azimuth, linearly interpolated with
    /// wrap-around between the last and first tabulated points.
    pub fn distance_at(&self, azimuth_deg: f64) -> f64 {
        let n = self.distances.len();
        let step = self.azimuth_step();
        let mut az = azimuth_deg % 360.0;
        if az < 0.0 {
            az += 360.0;
        }
        let pos = az / step;
        let i = pos.floor() as usize % n;
        let frac = pos - pos.floor();
        let d0 = self.distances[i];
        let d1 = self.distances[(i + 1) % n];
        d0 + (d1 - d0) * frac
    }

    /// Largest tabulated distance.
    pub fn max_distance(&self) -> f64 {
        self.distances.iter().copied().fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rejects_tiny_table() {
        assert!(Contour::new(vec![10.0, 12.0]).is_err());
    }

    #[test]
    fn test_exact_points() {
        let c = Contour::new(vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_abs_diff_eq!(c.distance_at(0.0), 10.0);
        assert_abs_diff_eq!(c.distance_at(90.0), 20.0);
        assert_abs_diff_eq!(c.distance_at(270.0), 40.0);
    }

    #[test]
    fn test_interpolates_and_wraps() {
        let c = Contour::new(vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_abs_diff_eq!(c.distance_at(45.0), 15.0);
        // Wrap from the last point back to the first.
        assert_abs_diff_eq!(c.distance_at(315.0), 25.0);
        assert_abs_diff_eq!(c.distance_at(-45.0), 25.0);
    }

    #[test]
    fn test_max_distance() {
        let c = Contour::new(vec![10.0, 55.5, 30.0, 40.0]).unwrap();
        assert_abs_diff_eq!(c.max_distance(), 55.5);
    }
}
