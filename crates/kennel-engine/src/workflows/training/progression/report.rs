use serde::Serialize;

use super::{collect_shortfalls, ProgressionEvaluator, RequirementAllocation};
use crate::workflows::training::domain::{
    LevelId, Requirement, RequirementId, RequirementKind, SourceId, Subject,
};
use crate::workflows::training::repository::SubjectLedger;

/// Progress bar data for one subject at its current level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub subject: Subject,
    pub level_id: LevelId,
    pub level_name: String,
    pub rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_level_id: Option<LevelId>,
    pub requirements: Vec<RequirementProgress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub license_prerequisites: Vec<RequirementProgress>,
    pub licensed: bool,
    pub eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementProgress {
    pub requirement_id: RequirementId,
    pub kind: RequirementKind,
    pub source_id: SourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_type: Option<String>,
    pub required: u32,
    pub achieved: u32,
}

impl ProgressionEvaluator<'_> {
    /// Returns `None` when `level_id` is not in the catalog.
    pub fn report(&self, ledger: &SubjectLedger, level_id: &LevelId) -> Option<ProgressReport> {
        let level = self.catalog.level(level_id)?;
        let allocations = self.allocate_for(&ledger.achievements, level);
        let eligible = collect_shortfalls(&allocations).is_empty();

        let own_count = level.requirements.len();
        let (own, prerequisites) = allocations.split_at(own_count.min(allocations.len()));

        Some(ProgressReport {
            subject: ledger.subject.clone(),
            level_id: level.id.clone(),
            level_name: level.name.clone(),
            rank: level.rank,
            next_level_id: self.catalog.next_level(&level.id).map(|next| next.id.clone()),
            requirements: own.iter().map(|a| self.row(a)).collect(),
            license_prerequisites: prerequisites.iter().map(|a| self.row(a)).collect(),
            licensed: ledger.licensed_at.is_some(),
            eligible,
        })
    }

    fn row(&self, allocation: &RequirementAllocation<'_>) -> RequirementProgress {
        let requirement: &Requirement = allocation.requirement;
        RequirementProgress {
            requirement_id: requirement.id.clone(),
            kind: requirement.kind,
            source_id: requirement.source_id.clone(),
            training_type: self
                .catalog
                .training_type(&requirement.source_id)
                .map(|training| training.name.clone()),
            required: requirement.required_count,
            achieved: allocation.achieved(),
        }
    }
}
