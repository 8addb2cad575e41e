use super::RequirementCatalog;
use crate::workflows::training::domain::{
    Level, LevelId, Requirement, RequirementId, RequirementKind, SourceId, TrainingType,
};

/// Built-in three-level catalog used by the demo command and by `serve` when no
/// catalog exports are configured.
pub fn demo_catalog() -> RequirementCatalog {
    let levels = vec![
        level(
            "foundations",
            1,
            "Puppy Foundations",
            false,
            &[
                ("foundations-group", RequirementKind::Main, 6, "group_class"),
                ("foundations-exam", RequirementKind::Main, 1, "exam"),
                ("foundations-workshop", RequirementKind::Additional, 2, "workshop"),
            ],
        ),
        level(
            "companion",
            2,
            "Companion Dog",
            false,
            &[
                ("companion-group", RequirementKind::Main, 8, "group_class"),
                ("companion-exam", RequirementKind::Main, 1, "exam"),
                ("companion-agility", RequirementKind::Additional, 3, "agility"),
            ],
        ),
        level(
            "license",
            3,
            "Handler License",
            true,
            &[
                ("license-private", RequirementKind::Main, 4, "private_lesson"),
                ("license-exam", RequirementKind::Main, 1, "exam"),
            ],
        ),
    ];

    let license_prerequisites = [
        ("license-lectures", 3, "lecture"),
        ("license-workshops", 2, "workshop"),
        ("license-first-aid", 1, "first_aid"),
    ]
    .into_iter()
    .map(|(id, required_count, source)| Requirement {
        id: RequirementId::new(id),
        level_id: LevelId::new("license"),
        kind: RequirementKind::Main,
        required_count,
        source_id: SourceId::new(source),
    })
    .collect();

    let training_types = [
        ("group_class", "Group class", Some(2_500)),
        ("private_lesson", "Private lesson", Some(6_000)),
        ("exam", "Level exam", Some(4_000)),
        ("workshop", "Workshop", Some(3_500)),
        ("agility", "Agility session", Some(3_000)),
        ("lecture", "Theory lecture", Some(1_500)),
        ("first_aid", "Canine first aid", Some(5_000)),
        ("open_play", "Open play", None),
    ]
    .into_iter()
    .map(|(source, name, price)| {
        let training = TrainingType {
            source_id: SourceId::new(source),
            name: name.to_string(),
            default_price_cents: price,
        };
        (training.source_id.clone(), training)
    })
    .collect();

    // Ranks are already contiguous and the license level is last.
    RequirementCatalog {
        levels,
        license_prerequisites,
        training_types,
    }
}

fn level(
    id: &str,
    rank: u32,
    name: &str,
    license: bool,
    requirements: &[(&str, RequirementKind, u32, &str)],
) -> Level {
    Level {
        id: LevelId::new(id),
        rank,
        name: name.to_string(),
        license,
        requirements: requirements
            .iter()
            .map(|(req_id, kind, required_count, source)| Requirement {
                id: RequirementId::new(*req_id),
                level_id: LevelId::new(id),
                kind: *kind,
                required_count: *required_count,
                source_id: SourceId::new(*source),
            })
            .collect(),
    }
}
