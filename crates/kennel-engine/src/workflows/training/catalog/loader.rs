use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::{CatalogError, RequirementCatalog};
use crate::workflows::training::domain::{
    Level, LevelId, Requirement, RequirementId, RequirementKind, SourceId, TrainingType,
};

impl RequirementCatalog {
    /// Build a catalog from a levels export and a training type export.
    ///
    /// Each levels row carries one requirement; a level with no requirements is
    /// listed once with the requirement columns left empty. Rows of kind
    /// `prerequisite` make up the license prerequisite list and ignore the level
    /// columns.
    pub fn from_csv<L: Read, T: Read>(levels: L, training_types: T) -> Result<Self, CatalogError> {
        let (levels, prerequisites) = parse_levels(levels)?;
        let training_types = parse_training_types(training_types)?;
        Self::new(levels, prerequisites, training_types)
    }

    pub fn from_paths(levels: &Path, training_types: &Path) -> Result<Self, CatalogError> {
        let levels = File::open(levels)?;
        let training_types = File::open(training_types)?;
        Self::from_csv(levels, training_types)
    }
}

#[derive(Debug, Deserialize)]
struct LevelRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    level_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rank: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    level_name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    license: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    requirement_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    required_count: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    source_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrainingTypeRow {
    source_id: String,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    default_price_cents: Option<String>,
}

enum RowKind {
    Level(RequirementKind),
    Prerequisite,
}

fn parse_levels<R: Read>(reader: R) -> Result<(Vec<Level>, Vec<Requirement>), CatalogError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut levels: Vec<Level> = Vec::new();
    let mut prerequisites = Vec::new();

    for (index, record) in csv_reader.deserialize::<LevelRow>().enumerate() {
        let row_number = index + 2;
        let row = record?;

        let kind = match row.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("main") => RowKind::Level(RequirementKind::Main),
            Some("additional") => RowKind::Level(RequirementKind::Additional),
            Some("prerequisite") => RowKind::Prerequisite,
            Some(other) => {
                return Err(CatalogError::UnknownKind {
                    row: row_number,
                    kind: other.to_string(),
                })
            }
        };

        let requirement = match (&row.requirement_id, &row.source_id) {
            (Some(id), Some(source)) => Some((
                RequirementId::new(id.clone()),
                SourceId::new(source.clone()),
                parse_count(row.required_count.as_deref(), row_number)?,
            )),
            (None, None) => None,
            _ => {
                return Err(CatalogError::MalformedRow {
                    row: row_number,
                    reason: "requirement_id and source_id must be given together".to_string(),
                })
            }
        };

        if let RowKind::Prerequisite = kind {
            let Some((id, source_id, required_count)) = requirement else {
                return Err(CatalogError::MalformedRow {
                    row: row_number,
                    reason: "prerequisite rows need a requirement".to_string(),
                });
            };
            // Owning level is assigned once the license level is known.
            prerequisites.push(Requirement {
                id,
                level_id: LevelId::new(""),
                kind: RequirementKind::Main,
                required_count,
                source_id,
            });
            continue;
        }

        let Some(level_id) = row.level_id.clone().map(LevelId::new) else {
            return Err(CatalogError::MalformedRow {
                row: row_number,
                reason: "level_id is required".to_string(),
            });
        };

        let position = match levels.iter().position(|level| level.id == level_id) {
            Some(position) => position,
            None => {
                let rank = row
                    .rank
                    .as_deref()
                    .ok_or_else(|| CatalogError::MalformedRow {
                        row: row_number,
                        reason: format!("first row for level {level_id} must carry a rank"),
                    })?
                    .parse::<u32>()
                    .map_err(|err| CatalogError::MalformedRow {
                        row: row_number,
                        reason: format!("invalid rank: {err}"),
                    })?;
                levels.push(Level {
                    id: level_id.clone(),
                    rank,
                    name: row.level_name.clone().unwrap_or_else(|| level_id.to_string()),
                    license: row.license.as_deref().is_some_and(parse_flag),
                    requirements: Vec::new(),
                });
                levels.len() - 1
            }
        };

        if let (RowKind::Level(kind), Some((id, source_id, required_count))) = (kind, requirement) {
            levels[position].requirements.push(Requirement {
                id,
                level_id,
                kind,
                required_count,
                source_id,
            });
        }
    }

    if let Some(license) = levels.iter().find(|level| level.license) {
        for prerequisite in &mut prerequisites {
            prerequisite.level_id = license.id.clone();
        }
    }

    Ok((levels, prerequisites))
}

fn parse_training_types<R: Read>(reader: R) -> Result<Vec<TrainingType>, CatalogError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut training_types = Vec::new();

    for (index, record) in csv_reader.deserialize::<TrainingTypeRow>().enumerate() {
        let row = record?;
        let default_price_cents = row
            .default_price_cents
            .as_deref()
            .map(str::parse::<i64>)
            .transpose()
            .map_err(|err| CatalogError::MalformedRow {
                row: index + 2,
                reason: format!("invalid default_price_cents: {err}"),
            })?;

        training_types.push(TrainingType {
            source_id: SourceId::new(row.source_id),
            name: row.name,
            default_price_cents,
        });
    }

    Ok(training_types)
}

fn parse_count(raw: Option<&str>, row: usize) -> Result<u32, CatalogError> {
    let raw = raw.ok_or_else(|| CatalogError::MalformedRow {
        row,
        reason: "required_count is missing".to_string(),
    })?;
    raw.parse::<u32>().map_err(|err| CatalogError::MalformedRow {
        row,
        reason: format!("invalid required_count: {err}"),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1"
    )
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
