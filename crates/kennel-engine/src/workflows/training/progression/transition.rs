use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::{collect_shortfalls, RequirementAllocation};
use crate::workflows::training::domain::{AchievementId, LevelId, Subject};
use crate::workflows::training::error::EngineError;
use crate::workflows::training::repository::{
    AppointmentRepository, BalanceLedger, ProgressionRepository, SubjectLedger,
};
use crate::workflows::training::service::TrainingEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelUpOutcome {
    pub subject: Subject,
    pub from: LevelId,
    pub to: LevelId,
    pub consumed: Vec<AchievementId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseGrant {
    pub subject: Subject,
    pub level_id: LevelId,
    pub licensed_at: DateTime<Utc>,
    pub consumed: Vec<AchievementId>,
}

impl<A, P, B> TrainingEngine<A, P, B>
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    /// Advance the subject one rank. Eligibility is recomputed inside the
    /// subject's atomic unit, and the achievements that satisfied the current
    /// level are consumed together with the level change.
    pub fn level_up(
        &self,
        subject: &Subject,
        target_level_id: &LevelId,
    ) -> Result<LevelUpOutcome, EngineError> {
        let target = self
            .catalog
            .level(target_level_id)
            .ok_or_else(|| EngineError::UnknownLevel(target_level_id.clone()))?;

        let outcome = self.progression.transact(subject, |ledger| {
            let current = self.level_of(ledger).ok_or(EngineError::EmptyCatalog)?;
            if target.rank != current.rank + 1 {
                return Err(EngineError::InvalidLevelTransition {
                    from: current.id.clone(),
                    to: target.id.clone(),
                });
            }

            let allocations = self.evaluator().allocate_for(&ledger.achievements, current);
            let shortfalls = collect_shortfalls(&allocations);
            if !shortfalls.is_empty() {
                return Err(EngineError::RequirementsNotMet {
                    level_id: current.id.clone(),
                    shortfalls,
                });
            }

            let consumed = consume(ledger, &allocations);
            let from = current.id.clone();
            ledger.current_level = Some(target.id.clone());

            Ok(LevelUpOutcome {
                subject: subject.clone(),
                from,
                to: target.id.clone(),
                consumed,
            })
        })?;

        info!(
            subject = %subject,
            from = %outcome.from,
            to = %outcome.to,
            consumed = outcome.consumed.len(),
            "level up recorded"
        );
        Ok(outcome)
    }

    /// Complete the terminal license level.
    pub fn grant_license(&self, subject: &Subject) -> Result<LicenseGrant, EngineError> {
        let licensed_at = self.clock.now();

        let grant = self.progression.transact(subject, |ledger| {
            let current = self.level_of(ledger).ok_or(EngineError::EmptyCatalog)?;
            if !current.license {
                return Err(EngineError::LicenseUnavailable {
                    subject: subject.clone(),
                    level_id: current.id.clone(),
                });
            }
            if ledger.licensed_at.is_some() {
                return Err(EngineError::AlreadyLicensed(subject.clone()));
            }

            let allocations = self.evaluator().allocate_for(&ledger.achievements, current);
            let shortfalls = collect_shortfalls(&allocations);
            if !shortfalls.is_empty() {
                return Err(EngineError::RequirementsNotMet {
                    level_id: current.id.clone(),
                    shortfalls,
                });
            }

            let consumed = consume(ledger, &allocations);
            let level_id = current.id.clone();
            ledger.licensed_at = Some(licensed_at);

            Ok(LicenseGrant {
                subject: subject.clone(),
                level_id,
                licensed_at,
                consumed,
            })
        })?;

        info!(subject = %subject, consumed = grant.consumed.len(), "license granted");
        Ok(grant)
    }
}

/// Flag the achievements backing every satisfied requirement. Partially met
/// requirements keep theirs, and surplus beyond each cap was never allocated.
fn consume(
    ledger: &mut SubjectLedger,
    allocations: &[RequirementAllocation<'_>],
) -> Vec<AchievementId> {
    let spent: HashSet<&AchievementId> = allocations
        .iter()
        .filter(|allocation| allocation.is_satisfied())
        .flat_map(|allocation| allocation.achievement_ids.iter())
        .collect();

    let mut consumed = Vec::with_capacity(spent.len());
    for achievement in &mut ledger.achievements {
        if spent.contains(&achievement.id) {
            achievement.is_consumed = true;
            consumed.push(achievement.id.clone());
        }
    }
    consumed
}
