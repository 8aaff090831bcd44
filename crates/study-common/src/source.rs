//! Source (transmitter) records and antenna patterns.

use serde::{Deserialize, Serialize};

use crate::contour::Contour;
use crate::coords::LatLon;
use crate::error::{ModelError, ModelResult};
use crate::geography::Geography;

/// Process-wide source key. Keys are assigned by the study database and are
/// unique for the life of a study.
pub type SourceKey = u32;

/// Channel band families used for propagation-curve selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    VhfLow,
    VhfHigh,
    Uhf,
    Fm,
    Wireless,
}

/// Country of record for a source or study point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    Us,
    Ca,
    Mx,
}

impl Country {
    /// Countries in the order the population loader enumerates them.
    pub const ALL: [Country; 3] = [Country::Us, Country::Ca, Country::Mx];

    pub fn index(self) -> usize {
        match self {
            Country::Us => 0,
            Country::Ca => 1,
            Country::Mx => 2,
        }
    }
}

/// Digital TV emission mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmissionMask {
    Full,
    Simple,
    Stringent,
}

/// FM station class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FmClass {
    A,
    B1,
    B,
    C3,
    C2,
    C1,
    C0,
    C,
    D,
}

/// Horizontal radiation pattern: 360 relative-field values at 1-degree
/// spacing starting from true north.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPattern {
    field: Vec<f64>,
}

impl HorizontalPattern {
    pub fn new(field: Vec<f64>) -> ModelResult<Self> {
        if field.len() != 360 {
            return Err(ModelError::BadHorizontalPattern(field.len()));
        }
        Ok(Self { field })
    }

    /// Relative field at an azimuth, linearly interpolated between the
    /// 1-degree entries with wrap-around.
    pub fn field_at(&self, azimuth_deg: f64) -> f64 {
        let mut az = azimuth_deg % 360.0;
        if az < 0.0 {
            az += 360.0;
        }
        let i = az.floor() as usize % 360;
        let frac = az - az.floor();
        let f0 = self.field[i];
        let f1 = self.field[(i + 1) % 360];
        f0 + (f1 - f0) * frac
    }

    pub fn values(&self) -> &[f64] {
        &self.field
    }
}

/// Vertical (elevation) pattern: relative field by depression angle, degrees
/// below horizontal, sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalPattern {
    entries: Vec<(f64, f64)>,
}

impl VerticalPattern {
    pub fn new(mut entries: Vec<(f64, f64)>) -> ModelResult<Self> {
        if entries.len() < 2 {
            return Err(ModelError::BadVerticalPattern(entries.len()));
        }
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { entries })
    }

    /// Relative field at a depression angle, linearly interpolated and
    /// clamped to the tabulated ends.
    pub fn field_at(&self, depression_deg: f64) -> f64 {
        let first = self.entries[0];
        let last = self.entries[self.entries.len() - 1];
        if depression_deg <= first.0 {
            return first.1;
        }
        if depression_deg >= last.0 {
            return last.1;
        }
        for pair in self.entries.windows(2) {
            let (a0, f0) = pair[0];
            let (a1, f1) = pair[1];
            if depression_deg <= a1 {
                let frac = (depression_deg - a0) / (a1 - a0);
                return f0 + (f1 - f0) * frac;
            }
        }
        last.1
    }

    pub fn entries(&self) -> &[(f64, f64)] {
        &self.entries
    }
}

/// Matrix pattern: a vertical pattern per tabulated azimuth, interpolated
/// between the bracketing azimuth slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixPattern {
    slices: Vec<(f64, VerticalPattern)>,
}

impl MatrixPattern {
    pub fn slices(&self) -> &[(f64, VerticalPattern)] {
        &self.slices
    }

    pub fn new(mut slices: Vec<(f64, VerticalPattern)>) -> ModelResult<Self> {
        if slices.is_empty() {
            return Err(ModelError::BadVerticalPattern(0));
        }
        slices.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { slices })
    }

    pub fn field_at(&self, azimuth_deg: f64, depression_deg: f64) -> f64 {
        let mut az = azimuth_deg % 360.0;
        if az < 0.0 {
            az += 360.0;
        }
        let n = self.slices.len();
        if n == 1 {
            return self.slices[0].1.field_at(depression_deg);
        }
        // Find the bracketing slices, wrapping from the last back to the
        // first across north.
        let mut lo = n - 1;
        for (i, slice) in self.slices.iter().enumerate() {
            if slice.0 <= az {
                lo = i;
            } else {
                break;
            }
        }
        let hi = (lo + 1) % n;
        let a0 = self.slices[lo].0;
        let mut a1 = self.slices[hi].0;
        let mut azx = az;
        if hi == 0 {
            a1 += 360.0;
            if azx < a0 {
                azx += 360.0;
            }
        }
        let span = a1 - a0;
        let frac = if span.abs() < 1e-12 {
            0.0
        } else {
            (azx - a0) / span
        };
        let f0 = self.slices[lo].1.field_at(depression_deg);
        let f1 = self.slices[hi].1.field_at(depression_deg);
        f0 + (f1 - f0) * frac
    }
}

/// DTS parent payload: ordered child sources plus the pre-DTS reference
/// facility used by the truncation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtsParent {
    pub children: Vec<SourceKey>,
    pub reference_facility: SourceKey,
}

impl DtsParent {
    pub fn new(children: Vec<SourceKey>, reference_facility: SourceKey) -> ModelResult<Self> {
        if children.is_empty() {
            return Err(ModelError::EmptyDts);
        }
        Ok(Self {
            children,
            reference_facility,
        })
    }
}

/// Service-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceKind {
    Tv {
        channel: u16,
        emission_mask: EmissionMask,
        /// Present iff this record is a DTS parent.
        dts: Option<DtsParent>,
    },
    Fm {
        channel: u16,
        class: FmClass,
    },
    Wireless {
        frequency_mhz: f64,
    },
}

/// A transmitter record.
///
/// A DTS parent carries no operating parameters of its own; its ERP, heights,
/// and patterns are unused and its children supply the actual facilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub key: SourceKey,
    pub position: LatLon,
    /// Effective radiated power, kW.
    pub erp_kw: f64,
    /// Antenna height above mean sea level, metres.
    pub height_amsl: f64,
    /// Height above average terrain, metres.
    pub height_aat: f64,
    pub horizontal_pattern: Option<HorizontalPattern>,
    pub vertical_pattern: Option<VerticalPattern>,
    pub matrix_pattern: Option<MatrixPattern>,
    pub band: Band,
    pub country: Country,
    pub service: ServiceKind,
    pub contour: Option<Contour>,
    pub geography: Option<Geography>,
}

impl Source {
    /// Whether this record is a DTS parent.
    pub fn is_dts_parent(&self) -> bool {
        matches!(
            self.service,
            ServiceKind::Tv { dts: Some(_), .. }
        )
    }

    pub fn dts(&self) -> Option<&DtsParent> {
        match &self.service {
            ServiceKind::Tv { dts, .. } => dts.as_ref(),
            _ => None,
        }
    }

    /// ERP in dB above 1 kW.
    pub fn erp_dbk(&self) -> f64 {
        10.0 * self.erp_kw.log10()
    }

    /// Relative horizontal field at an azimuth; 1.0 for omni.
    pub fn horizontal_field_at(&self, azimuth_deg: f64) -> f64 {
        match &self.horizontal_pattern {
            Some(p) => p.field_at(azimuth_deg),
            None => 1.0,
        }
    }

    /// Relative vertical field at an azimuth and depression angle. A matrix
    /// pattern takes precedence over the plain vertical pattern; with
    /// neither, the field is 1.0.
    pub fn vertical_field_at(&self, azimuth_deg: f64, depression_deg: f64) -> f64 {
        if let Some(m) = &self.matrix_pattern {
            return m.field_at(azimuth_deg, depression_deg);
        }
        if let Some(v) = &self.vertical_pattern {
            return v.field_at(depression_deg);
        }
        1.0
    }
}
