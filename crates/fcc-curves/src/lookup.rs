//! Curve lookup modes and off-table policies.

use study_common::Source;

use crate::error::{CurveError, CurveResult};
use crate::surface::interpolate;
use crate::tables::{table, CurveBand, CurveSet, CurveTable};
use crate::{free_space_distance, free_space_field};

/// Effective earth radius for depression angles, km (4/3 actual).
const EFFECTIVE_EARTH_RADIUS_KM: f64 = 8495.0;

/// Receiving antenna height above ground, metres.
const RECEIVER_HEIGHT_M: f64 = 9.1;

/// Floor on a relative pattern field before conversion to dB.
const PATTERN_FLOOR: f64 = 0.01;

/// Convergence threshold for the corrected free-space inversion, dB.
const INVERSION_TOLERANCE_DB: f64 = 0.01;

/// Iteration cap for the corrected free-space inversion.
const INVERSION_MAX_ITERATIONS: usize = 50;

/// Initial sweep step for distance-from-field lookups, km.
const SWEEP_STEP_KM: f64 = 81.25;

/// Sweep refinement passes (each divides the step by 10).
const SWEEP_REFINE_PASSES: usize = 3;

/// Behaviour when the lookup distance falls below the table minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum MinDistancePolicy {
    /// Plain free space; discontinuous at the curve end.
    FreeSpace,
    /// Free space shifted so the value at the curve minimum matches the
    /// curve; continuous at the joint.
    #[default]
    ScaledFreeSpace,
    /// Hold the curve-minimum value.
    Clamp,
}

/// Off-table advisory flags attached to a lookup result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Advisories {
    /// F(50,10)/F(50,90) below their minimum distance fell back to F(50,50).
    pub switched_to_median: bool,
    /// The value came from a free-space extension below the table.
    pub used_free_space: bool,
    /// The distance was clamped to the table maximum.
    pub clamped_to_max: bool,
}

impl Advisories {
    fn merge(self, other: Advisories) -> Advisories {
        Advisories {
            switched_to_median: self.switched_to_median || other.switched_to_median,
            used_free_space: self.used_free_space || other.used_free_space,
            clamped_to_max: self.clamped_to_max || other.clamped_to_max,
        }
    }
}

/// A lookup result: the value plus any off-table advisories.
#[derive(Debug, Clone, Copy)]
pub struct CurveValue {
    pub value: f64,
    pub advisories: Advisories,
}

/// Lookup parameters shared by the three modes.
#[derive(Debug, Clone, Copy)]
pub struct CurveParams<'a> {
    pub band: CurveBand,
    pub set: CurveSet,
    pub min_distance_policy: MinDistancePolicy,
    /// When present, every evaluation is adjusted by the source's vertical
    /// pattern at the depression angle implied by the distance.
    pub source: Option<&'a Source>,
    /// Azimuth from the source toward the receiver, for matrix patterns.
    pub azimuth_deg: f64,
}

impl<'a> CurveParams<'a> {
    pub fn new(band: CurveBand, set: CurveSet) -> Self {
        Self {
            band,
            set,
            min_distance_policy: MinDistancePolicy::default(),
            source: None,
            azimuth_deg: 0.0,
        }
    }

    pub fn with_source(mut self, source: &'a Source, azimuth_deg: f64) -> Self {
        self.source = Some(source);
        self.azimuth_deg = azimuth_deg;
        self
    }
}

/// Depression angle from the antenna down to the receiver at a distance,
/// including the effective-earth curvature term, degrees.
fn depression_angle_deg(height_m: f64, distance_km: f64) -> f64 {
    let d = distance_km.max(0.001);
    ((height_m - RECEIVER_HEIGHT_M) / (d * 1000.0)).atan().to_degrees()
        + (d / (2.0 * EFFECTIVE_EARTH_RADIUS_KM)).to_degrees()
}

/// Vertical-pattern correction in dB at a distance; zero without a source.
fn pattern_correction(params: &CurveParams<'_>, height_m: f64, distance_km: f64) -> f64 {
    match params.source {
        Some(source) => {
            let dep = depression_angle_deg(height_m, distance_km);
            let gain = source
                .vertical_field_at(params.azimuth_deg, dep)
                .max(PATTERN_FLOOR);
            20.0 * gain.log10()
        }
        None => 0.0,
    }
}

/// Mode 1: field strength (dBu) at a distance for a given ERP (dBk).
pub fn field_at_distance(
    power_dbk: f64,
    distance_km: f64,
    height_m: f64,
    params: &CurveParams<'_>,
) -> CurveValue {
    let mut advisories = Advisories::default();
    let mut set = params.set;
    let mut t = table(params.band, set);

    // Below the minimum of the high/low-variability sets the median set
    // answers instead.
    if set != CurveSet::F5050 && distance_km < t.min_distance() {
        set = CurveSet::F5050;
        t = table(params.band, set);
        advisories.switched_to_median = true;
    }

    let mut d = distance_km;
    if d > t.max_distance() {
        d = t.max_distance();
        advisories.clamped_to_max = true;
    }

    let base = if d < t.min_distance() {
        below_minimum_field(t, d, height_m, params.min_distance_policy, &mut advisories)
    } else {
        interpolate(t, d, height_m)
    };

    CurveValue {
        value: base + power_dbk + pattern_correction(params, height_m, d),
        advisories,
    }
}

fn below_minimum_field(
    t: &CurveTable,
    d: f64,
    height_m: f64,
    policy: MinDistancePolicy,
    advisories: &mut Advisories,
) -> f64 {
    let d_min = t.min_distance();
    match policy {
        MinDistancePolicy::FreeSpace => {
            advisories.used_free_space = true;
            free_space_field(d)
        }
        MinDistancePolicy::ScaledFreeSpace => {
            advisories.used_free_space = true;
            let joint = interpolate(t, d_min, height_m) - free_space_field(d_min);
            free_space_field(d) + joint
        }
        MinDistancePolicy::Clamp => interpolate(t, d_min, height_m),
    }
}

/// Mode 2: ERP (dBk) needed to produce a field at a distance.
pub fn power_for_field(
    field_dbu: f64,
    distance_km: f64,
    height_m: f64,
    params: &CurveParams<'_>,
) -> CurveValue {
    let unit = field_at_distance(0.0, distance_km, height_m, params);
    CurveValue {
        value: field_dbu - unit.value,
        advisories: unit.advisories,
    }
}

/// Mode 3: distance (km) at which a field is produced for a given ERP.
///
/// Sweeps the set's distance range in 81.25-km steps, brackets the target,
/// refines the bracket by dividing the step by ten for three passes, and
/// finishes with linear interpolation. Targets above the curve minimum are
/// answered by the (possibly pattern-corrected, hence iterative) free-space
/// extension.
pub fn distance_for_field(
    field_dbu: f64,
    power_dbk: f64,
    height_m: f64,
    params: &CurveParams<'_>,
) -> CurveResult<CurveValue> {
    let t = table(params.band, params.set);
    let d_min = t.min_distance();
    let d_max = t.max_distance();

    let eval = |d: f64| -> f64 {
        interpolate(t, d, height_m) + power_dbk + pattern_correction(params, height_m, d)
    };

    let f_min = eval(d_min);
    if field_dbu >= f_min {
        // Inside the curve minimum. The high/low-variability sets hand the
        // short-distance region to the median set.
        if params.set != CurveSet::F5050 {
            let median = CurveParams {
                set: CurveSet::F5050,
                ..*params
            };
            let result = distance_for_field(field_dbu, power_dbk, height_m, &median)?;
            return Ok(CurveValue {
                value: result.value,
                advisories: result.advisories.merge(Advisories {
                    switched_to_median: true,
                    ..Default::default()
                }),
            });
        }
        return below_minimum_distance(field_dbu, power_dbk, height_m, params, t);
    }

    let f_max = eval(d_max);
    if field_dbu <= f_max {
        return Ok(CurveValue {
            value: d_max,
            advisories: Advisories {
                clamped_to_max: true,
                ..Default::default()
            },
        });
    }

    // Initial sweep.
    let mut step = SWEEP_STEP_KM;
    let mut lo = d_min;
    let mut f_lo = f_min;
    let mut hi = (lo + step).min(d_max);
    let mut f_hi = eval(hi);
    while f_hi > field_dbu && hi < d_max {
        lo = hi;
        f_lo = f_hi;
        hi = (hi + step).min(d_max);
        f_hi = eval(hi);
    }

    // Refinement passes.
    for _ in 0..SWEEP_REFINE_PASSES {
        step /= 10.0;
        let mut d = lo;
        let mut f_d = f_lo;
        loop {
            let next = (d + step).min(hi);
            let f_next = eval(next);
            if f_next <= field_dbu || next >= hi {
                lo = d;
                f_lo = f_d;
                hi = next;
                f_hi = f_next;
                break;
            }
            d = next;
            f_d = f_next;
        }
    }

    let value = if (f_lo - f_hi).abs() < 1e-12 {
        lo
    } else {
        lo + (hi - lo) * (f_lo - field_dbu) / (f_lo - f_hi)
    };
    Ok(CurveValue {
        value,
        advisories: Advisories::default(),
    })
}

/// Distance inversion in the free-space region below the curve minimum.
fn below_minimum_distance(
    field_dbu: f64,
    power_dbk: f64,
    height_m: f64,
    params: &CurveParams<'_>,
    t: &CurveTable,
) -> CurveResult<CurveValue> {
    let d_min = t.min_distance();
    let target = field_dbu - power_dbk;

    let mut advisories = Advisories::default();
    let offset = match params.min_distance_policy {
        MinDistancePolicy::FreeSpace => {
            advisories.used_free_space = true;
            0.0
        }
        MinDistancePolicy::ScaledFreeSpace => {
            advisories.used_free_space = true;
            interpolate(t, d_min, height_m) - free_space_field(d_min)
        }
        // The clamped extension is flat below the minimum; the curve
        // minimum is the closest meaningful answer.
        MinDistancePolicy::Clamp => {
            return Ok(CurveValue {
                value: d_min,
                advisories,
            })
        }
    };

    let mut d = free_space_distance(target - offset).min(d_min);
    if params.source.is_none() {
        return Ok(CurveValue {
            value: d,
            advisories,
        });
    }

    // The pattern correction depends on the distance being solved for, so
    // iterate; a sign change in the residual switches to secant updates.
    let mut prev: Option<(f64, f64)> = None;
    for _ in 0..INVERSION_MAX_ITERATIONS {
        let f = free_space_field(d) + offset + pattern_correction(params, height_m, d);
        let delta = f - target;
        if delta.abs() < INVERSION_TOLERANCE_DB {
            return Ok(CurveValue {
                value: d,
                advisories,
            });
        }
        let next = match prev {
            Some((pd, p_delta)) if p_delta * delta < 0.0 => {
                d - delta * (d - pd) / (delta - p_delta)
            }
            _ => {
                let corr = pattern_correction(params, height_m, d);
                free_space_distance(target - offset - corr)
            }
        };
        prev = Some((d, delta));
        d = next.clamp(0.001, d_min);
    }
    Err(CurveError::IterationDidNotConverge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use study_common::{
        Band, Country, EmissionMask, LatLon, ServiceKind, Source, VerticalPattern,
    };

    fn params(set: CurveSet) -> CurveParams<'static> {
        CurveParams::new(CurveBand::VhfHigh, set)
    }

    #[test]
    fn test_vhf_high_median_at_100km() {
        let v = field_at_distance(0.0, 100.0, 305.0, &params(CurveSet::F5050));
        assert_abs_diff_eq!(v.value, 49.0, epsilon = 0.5);
        assert_eq!(v.advisories, Advisories::default());
    }

    #[test]
    fn test_distance_inverts_field() {
        let p = params(CurveSet::F5050);
        let f = field_at_distance(0.0, 100.0, 305.0, &p);
        let d = distance_for_field(f.value, 0.0, 305.0, &p).unwrap();
        assert!((d.value - 100.0).abs() / 100.0 < 0.02, "distance {}", d.value);
    }

    #[test]
    fn test_round_trip_across_table() {
        let p = params(CurveSet::F5050);
        for (d, h) in [(25.0, 150.0), (60.0, 305.0), (150.0, 600.0), (230.0, 90.0)] {
            let f = field_at_distance(10.0, d, h, &p);
            let back = distance_for_field(f.value, 10.0, h, &p).unwrap();
            let f2 = field_at_distance(10.0, back.value, h, &p);
            assert_abs_diff_eq!(f2.value, f.value, epsilon = 0.1);
        }
    }

    #[test]
    fn test_power_mode_inverts() {
        let p = params(CurveSet::F5050);
        let f = field_at_distance(14.0, 80.0, 200.0, &p);
        let pw = power_for_field(f.value, 80.0, 200.0, &p);
        assert_abs_diff_eq!(pw.value, 14.0, epsilon = 1e-9);
    }

    #[test]
    fn test_switch_to_median_below_set_minimum() {
        // F(50,10) starts at 15 km; below that the median set answers.
        let high = field_at_distance(0.0, 10.0, 300.0, &params(CurveSet::F5010));
        let median = field_at_distance(0.0, 10.0, 300.0, &params(CurveSet::F5050));
        assert!(high.advisories.switched_to_median);
        assert_abs_diff_eq!(high.value, median.value, epsilon = 1e-9);
    }

    #[test]
    fn test_clamp_above_table_maximum() {
        let p = params(CurveSet::F5050);
        let at_max = field_at_distance(0.0, 300.0, 300.0, &p);
        let beyond = field_at_distance(0.0, 450.0, 300.0, &p);
        assert!(beyond.advisories.clamped_to_max);
        assert_abs_diff_eq!(beyond.value, at_max.value, epsilon = 1e-9);
    }

    #[test]
    fn test_scaled_free_space_is_continuous_at_joint() {
        let p = params(CurveSet::F5050);
        let just_below = field_at_distance(0.0, 1.499, 300.0, &p);
        let at_min = field_at_distance(0.0, 1.5, 300.0, &p);
        assert!(just_below.advisories.used_free_space);
        assert_abs_diff_eq!(just_below.value, at_min.value, epsilon = 0.05);
    }

    #[test]
    fn test_plain_free_space_below_minimum() {
        let mut p = params(CurveSet::F5050);
        p.min_distance_policy = MinDistancePolicy::FreeSpace;
        let v = field_at_distance(0.0, 1.0, 300.0, &p);
        assert!(v.advisories.used_free_space);
        assert_abs_diff_eq!(v.value, free_space_field(1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_clamp_policy_below_minimum() {
        let mut p = params(CurveSet::F5050);
        p.min_distance_policy = MinDistancePolicy::Clamp;
        let v = field_at_distance(0.0, 1.0, 300.0, &p);
        let at_min = field_at_distance(0.0, 1.5, 300.0, &p);
        assert!(!v.advisories.used_free_space);
        assert_abs_diff_eq!(v.value, at_min.value, epsilon = 1e-9);
    }

    fn beam_tilted_source() -> Source {
        Source {
            key: 1,
            position: LatLon::new(40.0, 100.0),
            erp_kw: 10.0,
            height_amsl: 600.0,
            height_aat: 305.0,
            horizontal_pattern: None,
            vertical_pattern: Some(
                VerticalPattern::new(vec![(0.0, 1.0), (1.0, 0.9), (5.0, 0.5), (10.0, 0.2)])
                    .unwrap(),
            ),
            matrix_pattern: None,
            band: Band::VhfHigh,
            country: Country::Us,
            service: ServiceKind::Tv {
                channel: 9,
                emission_mask: EmissionMask::Full,
                dts: None,
            },
            contour: None,
            geography: None,
        }
    }

    #[test]
    fn test_pattern_correction_reduces_close_in_field() {
        let source = beam_tilted_source();
        let plain = field_at_distance(0.0, 5.0, 305.0, &params(CurveSet::F5050));
        let corrected = field_at_distance(
            0.0,
            5.0,
            305.0,
            &params(CurveSet::F5050).with_source(&source, 45.0),
        );
        // 305 m over 5 km is a steep depression angle; the pattern rolls
        // the field off.
        assert!(corrected.value < plain.value);
    }

    #[test]
    fn test_corrected_free_space_inversion_converges() {
        let source = beam_tilted_source();
        let p = params(CurveSet::F5050).with_source(&source, 0.0);
        // A strong target field that lands below the curve minimum.
        let f_at_1km = field_at_distance(0.0, 1.0, 305.0, &p);
        let d = distance_for_field(f_at_1km.value, 0.0, 305.0, &p).unwrap();
        assert!(d.advisories.used_free_space);
        let f_back = field_at_distance(0.0, d.value, 305.0, &p);
        assert_abs_diff_eq!(f_back.value, f_at_1km.value, epsilon = 0.05);
    }
}
