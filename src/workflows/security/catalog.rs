use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{CriterionDefinition, FrameworkDefinition, OverrideRule};
use super::scoring::find_band;

const BUILTIN_CATALOG: &str = include_str!("default_catalog.json");

/// Static criterion and framework definitions, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub criteria: Vec<CriterionDefinition>,
    pub framework: FrameworkDefinition,
}

impl Catalog {
    /// Definitions shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            criteria = catalog.criteria.len(),
            questions = catalog.framework.questions.len(),
            "loaded risk catalog"
        );
        Ok(catalog)
    }

    /// Built-in definitions unless a path is configured.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::builtin(),
        }
    }

    pub fn criterion(&self, id: &str) -> Option<&CriterionDefinition> {
        self.criteria.iter().find(|criterion| criterion.id == id)
    }

    pub fn is_known_criterion(&self, id: &str) -> bool {
        self.criterion(id).is_some()
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut criterion_ids = HashSet::new();
        for criterion in &self.criteria {
            if !criterion_ids.insert(criterion.id.as_str()) {
                return Err(CatalogError::DuplicateCriterion(criterion.id.clone()));
            }
            unique_ids(&criterion.id, criterion.questions.iter().map(|q| q.id.as_str()))?;
        }

        let framework = &self.framework;
        let owner = framework.id.as_deref().unwrap_or("framework");
        unique_ids(owner, framework.questions.iter().map(|q| q.id.as_str()))?;

        for question in &framework.questions {
            if !question.weight.is_finite() || question.weight < 0.0 {
                return Err(CatalogError::InvalidWeight {
                    question: question.id.clone(),
                    weight: question.weight,
                });
            }
        }

        if framework.bands.is_empty() {
            return Err(CatalogError::EmptyBands);
        }
        for band in &framework.bands {
            if band.min > band.max {
                return Err(CatalogError::InvertedBand(band.label.clone()));
            }
        }
        for (index, band) in framework.bands.iter().enumerate() {
            for other in &framework.bands[index + 1..] {
                if band.min <= other.max && other.min <= band.max {
                    return Err(CatalogError::OverlappingBands {
                        first: band.label.clone(),
                        second: other.label.clone(),
                    });
                }
            }
        }

        for rule in &framework.rules {
            match rule {
                OverrideRule::MinimumBand {
                    name,
                    trigger,
                    any_of,
                    floor_band,
                } => {
                    for question in std::iter::once(trigger).chain(any_of) {
                        if framework.question(question).is_none() {
                            return Err(CatalogError::UnknownRuleQuestion {
                                rule: name.clone(),
                                question: question.clone(),
                            });
                        }
                    }
                    if find_band(&framework.bands, floor_band).is_none() {
                        return Err(CatalogError::UnknownRuleBand {
                            rule: name.clone(),
                            band: floor_band.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

fn unique_ids<'a>(owner: &str, ids: impl Iterator<Item = &'a str>) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateQuestion {
                owner: owner.to_string(),
                question: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Reasons a catalog is rejected at load time.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("criterion '{0}' is defined more than once")]
    DuplicateCriterion(String),
    #[error("question '{question}' is defined more than once in '{owner}'")]
    DuplicateQuestion { owner: String, question: String },
    #[error("question '{question}' has invalid weight {weight}")]
    InvalidWeight { question: String, weight: f64 },
    #[error("framework defines no score bands")]
    EmptyBands,
    #[error("band '{0}' has min greater than max")]
    InvertedBand(String),
    #[error("bands '{first}' and '{second}' overlap")]
    OverlappingBands { first: String, second: String },
    #[error("rule '{rule}' references unknown question '{question}'")]
    UnknownRuleQuestion { rule: String, question: String },
    #[error("rule '{rule}' floors to unknown band '{band}'")]
    UnknownRuleBand { rule: String, band: String },
}
