//! Piecewise-cubic surface fit over a curve table.
//!
//! Interpolation is separable: a cubic pass along the distance axis for each
//! tabulated height row, then a cubic pass across height. Node derivatives
//! come from neighbouring segment slopes weighted by the magnitude of their
//! second differences (Akima's rule), falling back to the plain average when
//! both differences vanish. Heights above the table reflect about the top
//! entry; heights below extrapolate linearly from the first two rows.

use crate::tables::CurveTable;

/// Interpolate the tabulated surface at a distance inside the table's range
/// and an arbitrary height.
pub fn interpolate(table: &CurveTable, distance_km: f64, height_m: f64) -> f64 {
    let heights = table.heights;
    let h_min = heights[0];
    let h_max = heights[heights.len() - 1];

    if height_m < h_min {
        // Linear extrapolation from the first two height rows.
        let v0 = akima_1d(table.distances, &table.fields[0], distance_km);
        let v1 = akima_1d(table.distances, &table.fields[1], distance_km);
        let slope = (v1 - v0) / (heights[1] - heights[0]);
        return v0 + slope * (height_m - h_min);
    }

    // Above the table, reflect about the top height.
    let h = if height_m > h_max {
        (2.0 * h_max - height_m).max(h_min)
    } else {
        height_m
    };

    let column: Vec<f64> = table
        .fields
        .iter()
        .map(|row| akima_1d(table.distances, row, distance_km))
        .collect();
    akima_1d(heights, &column, h)
}

/// One-dimensional piecewise-cubic interpolation with Akima derivative
/// weighting. `x` must lie within `[xs[0], xs[last]]`; the nodes must be
/// strictly increasing.
pub fn akima_1d(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    debug_assert!(n >= 2);
    let x = x.clamp(xs[0], xs[n - 1]);

    // Bracketing interval.
    let mut i = match xs.iter().position(|&v| v > x) {
        Some(p) => p.saturating_sub(1),
        None => n - 2,
    };
    if i > n - 2 {
        i = n - 2;
    }

    let h = xs[i + 1] - xs[i];
    let t = (x - xs[i]) / h;

    let d0 = node_derivative(xs, ys, i);
    let d1 = node_derivative(xs, ys, i + 1);

    // Cubic Hermite basis.
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    h00 * ys[i] + h10 * h * d0 + h01 * ys[i + 1] + h11 * h * d1
}

/// Segment slope with Akima end extension: slopes beyond the table continue
/// the trend of the outermost pair.
fn slope(xs: &[f64], ys: &[f64], k: isize) -> f64 {
    let n = xs.len() as isize;
    if k < 0 {
        2.0 * slope(xs, ys, k + 1) - slope(xs, ys, k + 2)
    } else if k > n - 2 {
        2.0 * slope(xs, ys, k - 1) - slope(xs, ys, k - 2)
    } else {
        let k = k as usize;
        (ys[k + 1] - ys[k]) / (xs[k + 1] - xs[k])
    }
}

/// Akima derivative at node `i`: the two adjacent segment slopes averaged
/// with weights from the neighbouring second differences, equal weights when
/// both are near zero.
fn node_derivative(xs: &[f64], ys: &[f64], i: usize) -> f64 {
    let i = i as isize;
    let m_prev = slope(xs, ys, i - 1);
    let m_next = slope(xs, ys, i);
    let w_next = (slope(xs, ys, i + 1) - m_next).abs();
    let w_prev = (m_prev - slope(xs, ys, i - 2)).abs();
    let total = w_next + w_prev;
    if total < 1e-12 {
        (m_prev + m_next) / 2.0
    } else {
        (w_next * m_prev + w_prev * m_next) / total
    }
}
