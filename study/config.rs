//! # Study Configuration
//!
//! Every name the analysis depends on (outcome columns, biomarker panels,
//! reference proteins) lives in one explicit `StudyConfig` that is loaded from
//! a TOML file and passed into the pipeline. Nothing is read from ambient state.
//!
//! The panel and outcome sets are fixed: a CSF panel and a plasma panel, each
//! compared against a temporal tau-PET, a cortical tau-PET and an amyloid-PET
//! outcome. `result_order()` yields the six combinations in the order the
//! downstream plotting code expects.

use crate::pvalue::Alternative;
use crate::ratio::{DEFAULT_RATIO_SUFFIX, ratio_column_name};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_N_ITER: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CI_LEVEL: f64 = 0.90;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The {0} panel lists no biomarkers.")]
    EmptyPanel(Panel),
    #[error("Biomarker '{biomarker}' is listed more than once in the {panel} panel.")]
    DuplicateBiomarker { panel: Panel, biomarker: String },
    #[error(
        "Biomarker '{0}' is also used as its panel's reference protein; its ratio would be constant."
    )]
    BiomarkerIsReference(String),
    #[error(
        "Ratio column '{0}' is produced by both panels. Use distinct biomarker names per panel."
    )]
    RatioNameCollision(String),
    #[error("n_iter must be at least 1.")]
    ZeroIterations,
    #[error("ci_level must lie strictly between 0 and 1, got {0}.")]
    InvalidCiLevel(f64),
    #[error("ratio_suffix must not be empty.")]
    EmptyRatioSuffix,
    #[error(
        "seed must be at most {max}, got {0}; larger values cannot be stored in a TOML report.",
        max = i64::MAX
    )]
    SeedOutOfRange(u64),
}

/// Fluid the biomarkers of a panel were measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Panel {
    Csf,
    Plasma,
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csf => "CSF",
            Self::Plasma => "plasma",
        })
    }
}

/// Neuroimaging outcome a biomarker is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    TemporalTau,
    CorticalTau,
    Amyloid,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Self::TemporalTau, Self::CorticalTau, Self::Amyloid];
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TemporalTau => "temporal tau-PET",
            Self::CorticalTau => "cortical tau-PET",
            Self::Amyloid => "amyloid-PET",
        })
    }
}

/// Column names of the three PET outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeColumns {
    pub temporal_tau: String,
    pub cortical_tau: String,
    pub amyloid: String,
}

impl OutcomeColumns {
    pub fn column(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::TemporalTau => &self.temporal_tau,
            Outcome::CorticalTau => &self.cortical_tau,
            Outcome::Amyloid => &self.amyloid,
        }
    }
}

/// Biomarkers measured in one fluid and the protein they are normalized by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub biomarkers: Vec<String>,
    pub reference_protein: String,
}

/// The complete description of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Bootstrap iterations per biomarker. 10000 is recommended for reported p-values.
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    /// `true` selects the common-subset mode, `false` maximizes availability.
    #[serde(default)]
    pub subset: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub alternative: Alternative,
    #[serde(default = "default_ratio_suffix")]
    pub ratio_suffix: String,
    /// Coverage of the percentile interval reported for bootstrap distributions.
    #[serde(default = "default_ci_level")]
    pub ci_level: f64,
    /// Also fit the reference protein alone as a predictor of each outcome.
    #[serde(default = "default_include_reference")]
    pub include_reference_protein: bool,
    pub outcomes: OutcomeColumns,
    pub csf: PanelConfig,
    pub plasma: PanelConfig,
}

fn default_n_iter() -> usize {
    DEFAULT_N_ITER
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_ratio_suffix() -> String {
    DEFAULT_RATIO_SUFFIX.to_string()
}

fn default_ci_level() -> f64 {
    DEFAULT_CI_LEVEL
}

fn default_include_reference() -> bool {
    true
}

impl StudyConfig {
    /// A configuration with default run settings for the given columns.
    pub fn new(outcomes: OutcomeColumns, csf: PanelConfig, plasma: PanelConfig) -> Self {
        Self {
            n_iter: DEFAULT_N_ITER,
            subset: false,
            seed: DEFAULT_SEED,
            alternative: Alternative::default(),
            ratio_suffix: default_ratio_suffix(),
            ci_level: DEFAULT_CI_LEVEL,
            include_reference_protein: true,
            outcomes,
            csf,
            plasma,
        }
    }

    /// Loads a configuration from a TOML file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A filled-in example, useful as a starting point for a new study.
    pub fn template() -> Self {
        let names = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self::new(
            OutcomeColumns {
                temporal_tau: "tau_pet_temporal".to_string(),
                cortical_tau: "tau_pet_neocortical".to_string(),
                amyloid: "amyloid_pet_centiloid".to_string(),
            },
            PanelConfig {
                biomarkers: names(&["csf_ptau217", "csf_ptau181", "csf_ab42"]),
                reference_protein: "csf_ab40".to_string(),
            },
            PanelConfig {
                biomarkers: names(&["plasma_ptau217", "plasma_ptau181", "plasma_ab42"]),
                reference_protein: "plasma_ab40".to_string(),
            },
        )
    }

    pub fn panel(&self, panel: Panel) -> &PanelConfig {
        match panel {
            Panel::Csf => &self.csf,
            Panel::Plasma => &self.plasma,
        }
    }

    /// The six (panel, outcome) combinations in output order: CSF first, then
    /// plasma, each against temporal tau, cortical tau and amyloid.
    pub fn result_order() -> impl Iterator<Item = (Panel, Outcome)> {
        [Panel::Csf, Panel::Plasma]
            .into_iter()
            .flat_map(|panel| Outcome::ALL.into_iter().map(move |outcome| (panel, outcome)))
    }

    /// Every input column the run reads, in a stable order.
    pub fn required_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for outcome in Outcome::ALL {
            columns.push(self.outcomes.column(outcome).to_string());
        }
        for panel in [&self.csf, &self.plasma] {
            columns.extend(panel.biomarkers.iter().cloned());
            columns.push(panel.reference_protein.clone());
        }
        let mut seen = HashSet::new();
        columns.retain(|c| seen.insert(c.clone()));
        columns
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_iter == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !(self.ci_level > 0.0 && self.ci_level < 1.0) {
            return Err(ConfigError::InvalidCiLevel(self.ci_level));
        }
        if self.ratio_suffix.is_empty() {
            return Err(ConfigError::EmptyRatioSuffix);
        }
        if i64::try_from(self.seed).is_err() {
            return Err(ConfigError::SeedOutOfRange(self.seed));
        }

        let mut ratio_names = HashSet::new();
        for panel in [Panel::Csf, Panel::Plasma] {
            let settings = self.panel(panel);
            if settings.biomarkers.is_empty() {
                return Err(ConfigError::EmptyPanel(panel));
            }
            let mut seen = HashSet::new();
            for biomarker in &settings.biomarkers {
                if !seen.insert(biomarker.as_str()) {
                    return Err(ConfigError::DuplicateBiomarker {
                        panel,
                        biomarker: biomarker.clone(),
                    });
                }
                if *biomarker == settings.reference_protein {
                    return Err(ConfigError::BiomarkerIsReference(biomarker.clone()));
                }
                let ratio = ratio_column_name(biomarker, &self.ratio_suffix);
                if !ratio_names.insert(ratio.clone()) {
                    return Err(ConfigError::RatioNameCollision(ratio));
                }
            }
        }
        Ok(())
    }
}
