use super::common::*;

use crate::workflows::training::domain::{LevelId, RequirementKind, SourceId};
use crate::workflows::training::{demo_catalog, CatalogError, RequirementCatalog};

const TRAINING_TYPES: &str = "\
source_id,name,default_price_cents
group_class,Group class,2500
exam,Exam,4000
lecture,Lecture,
first_aid,First aid course,5000
";

#[test]
fn demo_catalog_is_consistent() {
    let catalog = demo_catalog();

    assert_eq!(catalog.levels().len(), 3);
    assert_eq!(
        catalog.entry_level().map(|level| level.id.clone()),
        Some(LevelId::new("foundations"))
    );
    assert!(catalog.license_level().is_some());
    assert_eq!(catalog.license_prerequisites().len(), 3);
    assert_eq!(
        catalog
            .training_type(&SourceId::new("open_play"))
            .and_then(|training| training.default_price_cents),
        None
    );

    let rebuilt = RequirementCatalog::new(
        catalog.levels().to_vec(),
        catalog.license_prerequisites().to_vec(),
        catalog.training_types().cloned().collect(),
    )
    .expect("demo catalog passes validation");
    assert_eq!(rebuilt.levels().len(), catalog.levels().len());
}

#[test]
fn loads_levels_and_prerequisites_from_csv() {
    let levels = "\
level_id,rank,level_name,license,requirement_id,kind,required_count,source_id
puppy,1,Puppy,,puppy-group,main,6,group_class
puppy,,,,puppy-exam,main,1,exam
free,2,Free Play,no,,,,
handler,3,Handler,yes,handler-exam,main,1,exam
,,,,prereq-lecture,prerequisite,3,lecture
,,,,prereq-first-aid,Prerequisite,1,first_aid
";

    let catalog = RequirementCatalog::from_csv(levels.as_bytes(), TRAINING_TYPES.as_bytes())
        .expect("catalog parses");

    let ids: Vec<&str> = catalog.levels().iter().map(|level| level.id.as_str()).collect();
    assert_eq!(ids, vec!["puppy", "free", "handler"]);

    let puppy = catalog.level(&LevelId::new("puppy")).expect("puppy level");
    assert_eq!(puppy.name, "Puppy");
    assert_eq!(puppy.requirements.len(), 2);
    assert!(puppy
        .requirements
        .iter()
        .all(|requirement| requirement.kind == RequirementKind::Main));

    let free = catalog.level(&LevelId::new("free")).expect("free level");
    assert!(free.requirements.is_empty());
    assert!(!free.license);

    let handler = catalog.license_level().expect("license level");
    assert_eq!(handler.id, LevelId::new("handler"));
    assert_eq!(catalog.license_prerequisites().len(), 2);
    assert!(catalog
        .license_prerequisites()
        .iter()
        .all(|requirement| requirement.level_id == handler.id));
    assert_eq!(catalog.gating_requirements(handler).count(), 3);
    assert_eq!(catalog.gating_requirements(puppy).count(), 2);

    assert_eq!(
        catalog
            .next_level(&LevelId::new("puppy"))
            .map(|level| level.id.clone()),
        Some(LevelId::new("free"))
    );
    assert_eq!(
        catalog
            .training_type(&SourceId::new("lecture"))
            .and_then(|training| training.default_price_cents),
        None
    );
}

#[test]
fn rejects_unknown_requirement_kind() {
    let levels = "\
level_id,rank,level_name,license,requirement_id,kind,required_count,source_id
puppy,1,Puppy,,puppy-group,optional,6,group_class
";

    match RequirementCatalog::from_csv(levels.as_bytes(), TRAINING_TYPES.as_bytes()) {
        Err(CatalogError::UnknownKind { row, kind }) => {
            assert_eq!(row, 2);
            assert_eq!(kind, "optional");
        }
        other => panic!("expected unknown kind, got {other:?}"),
    }
}

#[test]
fn rejects_half_specified_requirement_rows() {
    let levels = "\
level_id,rank,level_name,license,requirement_id,kind,required_count,source_id
puppy,1,Puppy,,puppy-group,main,6,
";

    assert!(matches!(
        RequirementCatalog::from_csv(levels.as_bytes(), TRAINING_TYPES.as_bytes()),
        Err(CatalogError::MalformedRow { row: 2, .. })
    ));
}

#[test]
fn ranks_must_be_contiguous_from_one() {
    let result = RequirementCatalog::new(
        vec![level("basic", 1, false, Vec::new()), level("advanced", 3, false, Vec::new())],
        Vec::new(),
        training_types(),
    );

    match result {
        Err(CatalogError::NonContiguousRanks { expected, found }) => {
            assert_eq!((expected, found), (2, 3));
        }
        other => panic!("expected non-contiguous ranks, got {other:?}"),
    }
}

#[test]
fn license_level_must_be_terminal() {
    let result = RequirementCatalog::new(
        vec![level("license", 1, true, Vec::new()), level("after", 2, false, Vec::new())],
        Vec::new(),
        training_types(),
    );

    assert!(matches!(result, Err(CatalogError::LicenseNotTerminal(_))));
}

#[test]
fn prerequisites_need_a_license_level() {
    let result = RequirementCatalog::new(
        vec![level("basic", 1, false, Vec::new())],
        vec![requirement("prereq", "basic", RequirementKind::Main, 1, "lecture")],
        training_types(),
    );

    assert!(matches!(result, Err(CatalogError::OrphanPrerequisites)));
}

#[test]
fn requirement_rules_are_enforced() {
    use RequirementKind::{Additional, Main};

    let zero = RequirementCatalog::new(
        vec![level(
            "basic",
            1,
            false,
            vec![requirement("basic-group", "basic", Main, 0, "group_class")],
        )],
        Vec::new(),
        training_types(),
    );
    assert!(matches!(zero, Err(CatalogError::InvalidRequiredCount(_))));

    let duplicate_source = RequirementCatalog::new(
        vec![level(
            "basic",
            1,
            false,
            vec![
                requirement("basic-group", "basic", Main, 6, "group_class"),
                requirement("basic-extra", "basic", Additional, 2, "group_class"),
            ],
        )],
        Vec::new(),
        training_types(),
    );
    match duplicate_source {
        Err(CatalogError::DuplicateSource { level, source_id }) => {
            assert_eq!(level, LevelId::new("basic"));
            assert_eq!(source_id, SourceId::new("group_class"));
        }
        other => panic!("expected duplicate source, got {other:?}"),
    }

    let mismatched = RequirementCatalog::new(
        vec![level(
            "basic",
            1,
            false,
            vec![requirement("basic-group", "advanced", Main, 6, "group_class")],
        )],
        Vec::new(),
        training_types(),
    );
    assert!(matches!(
        mismatched,
        Err(CatalogError::MismatchedLevel { .. })
    ));

    let duplicate_level = RequirementCatalog::new(
        vec![level("basic", 1, false, Vec::new()), level("basic", 2, false, Vec::new())],
        Vec::new(),
        training_types(),
    );
    assert!(matches!(
        duplicate_level,
        Err(CatalogError::DuplicateLevel(_))
    ));
}
