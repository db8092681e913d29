//! Enumerated generation options and their string forms.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cartesian product type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Ppi,
    Cappi,
    Pcappi,
    Pmax,
    Max,
}

impl ProductType {
    const NAMES: &'static [&'static str] = &["ppi", "cappi", "pcappi", "pmax", "max"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ppi => "ppi",
            Self::Cappi => "cappi",
            Self::Pcappi => "pcappi",
            Self::Pmax => "pmax",
            Self::Max => "max",
        }
    }
}

impl FromStr for ProductType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ppi" => Ok(Self::Ppi),
            "cappi" => Ok(Self::Cappi),
            "pcappi" => Ok(Self::Pcappi),
            "pmax" => Ok(Self::Pmax),
            "max" => Ok(Self::Max),
            _ => Err(Error::invalid_option("product", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// How the contributing radar is chosen for a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionMethod {
    NearestRadar,
    HeightAboveSealevel,
}

impl SelectionMethod {
    const NAMES: &'static [&'static str] = &["NEAREST_RADAR", "HEIGHT_ABOVE_SEALEVEL"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NearestRadar => "NEAREST_RADAR",
            Self::HeightAboveSealevel => "HEIGHT_ABOVE_SEALEVEL",
        }
    }
}

impl FromStr for SelectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NEAREST_RADAR" => Ok(Self::NearestRadar),
            "HEIGHT_ABOVE_SEALEVEL" => Ok(Self::HeightAboveSealevel),
            _ => Err(Error::invalid_option("selection method", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpolation method between polar bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterpolationMethod {
    NearestValue,
    LinearHeight,
    LinearRange,
    LinearAzimuth,
    LinearRangeAndAzimuth,
    Linear3d,
    QuadraticHeight,
    Quadratic3d,
}

impl InterpolationMethod {
    const NAMES: &'static [&'static str] = &[
        "NEAREST_VALUE",
        "LINEAR_HEIGHT",
        "LINEAR_RANGE",
        "LINEAR_AZIMUTH",
        "LINEAR_RANGE_AND_AZIMUTH",
        "LINEAR_3D",
        "QUADRATIC_HEIGHT",
        "QUADRATIC_3D",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NearestValue => "NEAREST_VALUE",
            Self::LinearHeight => "LINEAR_HEIGHT",
            Self::LinearRange => "LINEAR_RANGE",
            Self::LinearAzimuth => "LINEAR_AZIMUTH",
            Self::LinearRangeAndAzimuth => "LINEAR_RANGE_AND_AZIMUTH",
            Self::Linear3d => "LINEAR_3D",
            Self::QuadraticHeight => "QUADRATIC_HEIGHT",
            Self::Quadratic3d => "QUADRATIC_3D",
        }
    }

    /// Interpolating methods are only meaningful for reflectivity
    pub fn check_quantity(&self, quantity: &str) -> Result<()> {
        if *self != Self::NearestValue && quantity != "DBZH" {
            return Err(Error::configuration(format!(
                "interpolation method {} is only supported for DBZH, not {}",
                self.as_str(),
                quantity
            )));
        }
        Ok(())
    }
}

impl FromStr for InterpolationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        Self::NAMES
            .iter()
            .position(|name| *name == upper)
            .map(|idx| {
                [
                    Self::NearestValue,
                    Self::LinearHeight,
                    Self::LinearRange,
                    Self::LinearAzimuth,
                    Self::LinearRangeAndAzimuth,
                    Self::Linear3d,
                    Self::QuadraticHeight,
                    Self::Quadratic3d,
                ][idx]
            })
            .ok_or_else(|| Error::invalid_option("interpolation method", s, Self::NAMES))
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether detectors only analyze, or analyze and correct the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityControlMode {
    Analyze,
    #[default]
    AnalyzeAndApply,
}

impl QualityControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::AnalyzeAndApply => "analyze_and_apply",
        }
    }

    /// Whether detectors may modify the underlying data
    pub fn applies(&self) -> bool {
        *self == Self::AnalyzeAndApply
    }
}

impl FromStr for QualityControlMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "analyze" => Ok(Self::Analyze),
            "analyze_and_apply" => Ok(Self::AnalyzeAndApply),
            _ => Err(Error::InvalidQualityControlMode {
                mode: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for QualityControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
