mod demo;
mod loader;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::domain::{Level, LevelId, Requirement, RequirementId, SourceId, TrainingType};

pub use demo::demo_catalog;

/// Per-tenant definition of ranked levels, license prerequisites, and training types.
#[derive(Debug, Clone, Serialize)]
pub struct RequirementCatalog {
    levels: Vec<Level>,
    license_prerequisites: Vec<Requirement>,
    training_types: BTreeMap<SourceId, TrainingType>,
}

impl RequirementCatalog {
    pub fn new(
        mut levels: Vec<Level>,
        license_prerequisites: Vec<Requirement>,
        training_types: Vec<TrainingType>,
    ) -> Result<Self, CatalogError> {
        levels.sort_by_key(|level| level.rank);

        let mut seen_levels = HashSet::new();
        for (index, level) in levels.iter().enumerate() {
            if !seen_levels.insert(level.id.clone()) {
                return Err(CatalogError::DuplicateLevel(level.id.clone()));
            }

            let expected = index as u32 + 1;
            if level.rank != expected {
                return Err(CatalogError::NonContiguousRanks {
                    expected,
                    found: level.rank,
                });
            }

            validate_requirements(&level.id, &level.requirements)?;
        }

        let license_levels: Vec<&Level> = levels.iter().filter(|level| level.license).collect();
        if license_levels.len() > 1 {
            return Err(CatalogError::MultipleLicenseLevels);
        }
        if let Some(license) = license_levels.first() {
            if levels.last().map(|level| &level.id) != Some(&license.id) {
                return Err(CatalogError::LicenseNotTerminal(license.id.clone()));
            }
        }

        if !license_prerequisites.is_empty() {
            let Some(license) = license_levels.first() else {
                return Err(CatalogError::OrphanPrerequisites);
            };
            validate_requirements(&license.id, &license_prerequisites)?;
        }

        let training_types = training_types
            .into_iter()
            .map(|training| (training.source_id.clone(), training))
            .collect();

        Ok(Self {
            levels,
            license_prerequisites,
            training_types,
        })
    }

    /// Levels ordered by rank, entry level first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, id: &LevelId) -> Option<&Level> {
        self.levels.iter().find(|level| &level.id == id)
    }

    pub fn level_by_rank(&self, rank: u32) -> Option<&Level> {
        self.levels.iter().find(|level| level.rank == rank)
    }

    pub fn entry_level(&self) -> Option<&Level> {
        self.levels.first()
    }

    pub fn next_level(&self, id: &LevelId) -> Option<&Level> {
        let current = self.level(id)?;
        self.level_by_rank(current.rank + 1)
    }

    pub fn license_level(&self) -> Option<&Level> {
        self.levels.iter().find(|level| level.license)
    }

    pub fn license_prerequisites(&self) -> &[Requirement] {
        &self.license_prerequisites
    }

    pub fn training_type(&self, source: &SourceId) -> Option<&TrainingType> {
        self.training_types.get(source)
    }

    pub fn training_types(&self) -> impl Iterator<Item = &TrainingType> {
        self.training_types.values()
    }

    /// Requirements that must be met to leave `level`: its own list, plus the
    /// fixed prerequisite set when the level is the license level.
    pub fn gating_requirements<'a>(
        &'a self,
        level: &'a Level,
    ) -> impl Iterator<Item = &'a Requirement> + 'a {
        let prerequisites: &[Requirement] = if level.license {
            &self.license_prerequisites
        } else {
            &[]
        };
        level.requirements.iter().chain(prerequisites.iter())
    }
}

fn validate_requirements(
    level: &LevelId,
    requirements: &[Requirement],
) -> Result<(), CatalogError> {
    let mut sources = HashSet::new();
    let mut ids = HashSet::new();
    for requirement in requirements {
        if &requirement.level_id != level {
            return Err(CatalogError::MismatchedLevel {
                requirement: requirement.id.clone(),
                level: level.clone(),
            });
        }
        if requirement.required_count == 0 {
            return Err(CatalogError::InvalidRequiredCount(requirement.id.clone()));
        }
        if !ids.insert(requirement.id.clone()) {
            return Err(CatalogError::DuplicateRequirement(requirement.id.clone()));
        }
        if !sources.insert(requirement.source_id.clone()) {
            return Err(CatalogError::DuplicateSource {
                level: level.clone(),
                source_id: requirement.source_id.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("level {0} is defined more than once")]
    DuplicateLevel(LevelId),
    #[error("level ranks must be contiguous from 1: expected rank {expected}, found {found}")]
    NonContiguousRanks { expected: u32, found: u32 },
    #[error("only one license level may be defined")]
    MultipleLicenseLevels,
    #[error("license level {0} must be the highest rank")]
    LicenseNotTerminal(LevelId),
    #[error("license prerequisites require a license level")]
    OrphanPrerequisites,
    #[error("requirement {requirement} does not belong to level {level}")]
    MismatchedLevel {
        requirement: RequirementId,
        level: LevelId,
    },
    #[error("requirement {0} must require at least one achievement")]
    InvalidRequiredCount(RequirementId),
    #[error("requirement {0} is defined more than once")]
    DuplicateRequirement(RequirementId),
    #[error("level {level} lists training type {source_id} more than once")]
    DuplicateSource { level: LevelId, source_id: SourceId },
    #[error("row {row}: unknown requirement kind '{kind}'")]
    UnknownKind { row: usize, kind: String },
    #[error("row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },
}
