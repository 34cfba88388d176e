//! Shape biomarkers of a single region.
//!
//! A [`FeatureBackend`] turns a [`RegionMask`] into a list of named features. Back-ends are
//! independent: the record builder calls each one separately and a failure in one of them
//! never removes the features produced by another.

use std::fmt;

use crate::errors::FeatureError;
use crate::volume::RegionMask;

pub mod geometry;
mod radiomics;
mod ski;

pub use radiomics::RadiomicsShape;
pub use ski::SkiShape;

const PARAMETER_SEPARATOR: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Float,
    Int,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "float" => Some(ValueType::Float),
            "int" => Some(ValueType::Int),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single measured value with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub value: f64,
    pub description: String,
    pub unit: String,
    pub value_type: ValueType,
}

impl Feature {
    pub fn float(value: f64, description: &str, unit: &str) -> Self {
        Self {
            value,
            description: description.to_string(),
            unit: unit.to_string(),
            value_type: ValueType::Float,
        }
    }

    pub fn int(value: usize, description: &str, unit: &str) -> Self {
        Self {
            value: value as f64,
            description: description.to_string(),
            unit: unit.to_string(),
            value_type: ValueType::Int,
        }
    }
}

/// Identifies a feature within a record: `(body_part, biomarker_category, biomarker)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureKey {
    pub body_part: String,
    pub category: String,
    pub biomarker: String,
}

impl FeatureKey {
    pub fn new(body_part: &str, category: &str, biomarker: &str) -> Self {
        Self {
            body_part: body_part.to_string(),
            category: category.to_string(),
            biomarker: biomarker.to_string(),
        }
    }

    /// The parameter string `body_part-category-biomarker` used in result archives.
    pub fn parameter(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.body_part,
            self.category,
            self.biomarker,
            sep = PARAMETER_SEPARATOR
        )
    }

    /// Split a parameter string back into its three components.
    pub fn parse(parameter: &str) -> Option<Self> {
        let mut parts = parameter.splitn(3, PARAMETER_SEPARATOR);
        let body_part = parts.next().filter(|s| !s.is_empty())?;
        let category = parts.next().filter(|s| !s.is_empty())?;
        let biomarker = parts.next().filter(|s| !s.is_empty())?;
        Some(Self::new(body_part, category, biomarker))
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parameter())
    }
}

pub type Features = Vec<(FeatureKey, Feature)>;

pub trait FeatureBackend: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Biomarker category shared by every feature of this back-end.
    fn category(&self) -> &'static str;

    /// Compute the features of `mask`, keyed under body part `region`.
    fn features(&self, mask: &RegionMask, region: &str) -> Result<Features, FeatureError>;
}

/// The back-ends applied to every region, in the order their results are merged.
pub fn default_backends() -> Vec<Box<dyn FeatureBackend>> {
    vec![Box::new(SkiShape), Box::new(RadiomicsShape)]
}

/// Shared helper for back-ends: builds keyed features and rejects non-finite values.
pub(crate) struct FeatureSet<'a> {
    region: &'a str,
    category: &'static str,
    features: Features,
}

impl<'a> FeatureSet<'a> {
    pub(crate) fn new(region: &'a str, category: &'static str) -> Self {
        Self {
            region,
            category,
            features: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, biomarker: &str, feature: Feature) -> Result<(), FeatureError> {
        if !feature.value.is_finite() {
            return Err(FeatureError::Degenerate {
                region: self.region.to_string(),
                reason: format!("{} is not finite ({})", biomarker, feature.value),
            });
        }
        self.features
            .push((FeatureKey::new(self.region, self.category, biomarker), feature));
        Ok(())
    }

    pub(crate) fn finish(self) -> Features {
        self.features
    }
}
