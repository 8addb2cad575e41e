mod report;
mod transition;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::RequirementCatalog;
use super::domain::{
    Achievement, AchievementId, Level, LevelId, Requirement, RequirementId, SourceId,
};

pub use report::{ProgressReport, RequirementProgress};
pub use transition::{LevelUpOutcome, LicenseGrant};

/// Pure read over a subject's achievements against the catalog.
pub struct ProgressionEvaluator<'a> {
    catalog: &'a RequirementCatalog,
}

/// A main requirement whose capped count is below target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementShortfall {
    pub requirement_id: RequirementId,
    pub source_id: SourceId,
    pub required: u32,
    pub achieved: u32,
}

/// Achievements counted toward one requirement, oldest first, capped at its target.
#[derive(Debug, Clone)]
pub struct RequirementAllocation<'a> {
    pub requirement: &'a Requirement,
    pub achievement_ids: Vec<AchievementId>,
}

impl RequirementAllocation<'_> {
    pub fn achieved(&self) -> u32 {
        self.achievement_ids.len() as u32
    }

    pub fn is_satisfied(&self) -> bool {
        self.achieved() >= self.requirement.required_count
    }
}

impl<'a> ProgressionEvaluator<'a> {
    pub fn new(catalog: &'a RequirementCatalog) -> Self {
        Self { catalog }
    }

    /// Capped count per training type for the requirements of `level_id`.
    /// Unknown levels yield an empty map.
    pub fn progress(
        &self,
        achievements: &[Achievement],
        level_id: &LevelId,
    ) -> BTreeMap<SourceId, u32> {
        let Some(level) = self.catalog.level(level_id) else {
            return BTreeMap::new();
        };

        allocate(level.requirements.iter(), achievements)
            .into_iter()
            .map(|allocation| {
                (
                    allocation.requirement.source_id.clone(),
                    allocation.achieved(),
                )
            })
            .collect()
    }

    /// Whether every gating requirement of `level_id` is met. A level with no
    /// requirements is vacuously eligible; an unknown level never is.
    pub fn is_level_up_eligible(&self, achievements: &[Achievement], level_id: &LevelId) -> bool {
        match self.catalog.level(level_id) {
            Some(level) => self.shortfalls(achievements, level).is_empty(),
            None => false,
        }
    }

    pub fn shortfalls(
        &self,
        achievements: &[Achievement],
        level: &Level,
    ) -> Vec<RequirementShortfall> {
        collect_shortfalls(&self.allocate_for(achievements, level))
    }

    /// Allocation over the level's own requirements followed by the license
    /// prerequisites when `level` is the license level.
    pub fn allocate_for<'l>(
        &self,
        achievements: &[Achievement],
        level: &'l Level,
    ) -> Vec<RequirementAllocation<'l>>
    where
        'a: 'l,
    {
        let catalog: &'a RequirementCatalog = self.catalog;
        let allocations = allocate(catalog.gating_requirements(level), achievements);
        debug!(
            level = %level.id,
            satisfied = allocations.iter().filter(|a| a.is_satisfied()).count(),
            total = allocations.len(),
            "evaluated level requirements"
        );
        allocations
    }
}

pub(crate) fn collect_shortfalls(
    allocations: &[RequirementAllocation<'_>],
) -> Vec<RequirementShortfall> {
    allocations
        .iter()
        .filter(|allocation| allocation.requirement.is_gating() && !allocation.is_satisfied())
        .map(|allocation| RequirementShortfall {
            requirement_id: allocation.requirement.id.clone(),
            source_id: allocation.requirement.source_id.clone(),
            required: allocation.requirement.required_count,
            achieved: allocation.achieved(),
        })
        .collect()
}

/// Each unconsumed achievement counts toward at most one requirement; earlier
/// requirements in the iteration claim first.
pub(crate) fn allocate<'r>(
    requirements: impl IntoIterator<Item = &'r Requirement>,
    achievements: &[Achievement],
) -> Vec<RequirementAllocation<'r>> {
    let mut pool: Vec<&Achievement> = achievements
        .iter()
        .filter(|achievement| !achievement.is_consumed)
        .collect();
    pool.sort_by(|a, b| (a.date_achieved, &a.id).cmp(&(b.date_achieved, &b.id)));

    let mut taken: HashSet<&AchievementId> = HashSet::new();
    let mut allocations = Vec::new();

    for requirement in requirements {
        let mut achievement_ids = Vec::new();
        for achievement in &pool {
            if achievement_ids.len() as u32 >= requirement.required_count {
                break;
            }
            if achievement.source_id == requirement.source_id && taken.insert(&achievement.id) {
                achievement_ids.push(achievement.id.clone());
            }
        }
        allocations.push(RequirementAllocation {
            requirement,
            achievement_ids,
        });
    }

    allocations
}
