use chrono::NaiveDate;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use yggdrasil_core::db::open_db_in_memory;
use yggdrasil_core::{
    CanonicalLeaf, CanonicalPatterns, Classifier, FileStatus, KeywordRule, KeywordTable,
    LeafPlacement, LeafType, MigrationError, MigrationMode, MigrationOptions,
    MigrationOrchestrator, MigrationReport, NewResource, SqliteTaxonomyRepository,
    StructureSummary, TaxonomyPath, TaxonomyService,
};

const QUANTUM_MECH: &str =
    r#"{"field": "Quantum Mechanics", "subfields": ["Wave Function", "Entanglement"]}"#;

fn service(conn: &Connection) -> TaxonomyService<SqliteTaxonomyRepository<'_>> {
    TaxonomyService::new(SqliteTaxonomyRepository::try_new(conn).unwrap())
}

fn options(mode: MigrationMode) -> MigrationOptions {
    MigrationOptions {
        migration_date: NaiveDate::from_ymd_opt(2025, 6, 22).unwrap(),
        ..MigrationOptions::new(mode)
    }
}

fn run(
    service: &TaxonomyService<SqliteTaxonomyRepository<'_>>,
    root: &Path,
    options: MigrationOptions,
) -> MigrationReport {
    MigrationOrchestrator::new(
        service,
        Classifier::default(),
        CanonicalPatterns::defaults().unwrap(),
        options,
    )
    .run(root)
    .unwrap()
}

fn write(root: &Path, name: &str, body: &str) {
    fs::write(root.join(name), body).unwrap();
}

fn total_changes(conn: &Connection) -> i64 {
    conn.query_row("SELECT total_changes();", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn quantum_mech_dry_run_then_execute() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let table = KeywordTable::new(vec![KeywordRule::new("quantum", "science_tree")]).unwrap();
    let orchestrator = |mode| {
        MigrationOrchestrator::new(
            &service,
            Classifier::new(table.clone()),
            CanonicalPatterns::defaults().unwrap(),
            options(mode),
        )
    };

    let before = total_changes(&conn);
    let dry = orchestrator(MigrationMode::DryRun).run(dir.path()).unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.total_files, 1);
    assert_eq!(dry.successful_migrations, 1);
    assert_eq!(dry.failed_migrations, 0);
    assert_eq!(dry.tree_distribution.len(), 1);
    assert_eq!(dry.tree_distribution["science_tree"], 1);
    assert_eq!(total_changes(&conn), before);
    assert_eq!(service.structure().unwrap(), StructureSummary::default());

    let live = orchestrator(MigrationMode::Execute).run(dir.path()).unwrap();
    assert_eq!(live.successful_migrations, 1);
    assert_eq!(live.files_processed[0].status, FileStatus::Success);

    let limb = service
        .resolve_path("science_tree", "Legacy", "quantum_mech")
        .unwrap();
    assert_eq!(limb.description.as_deref(), Some("Quantum Mech"));
    assert_eq!(limb.source_path.as_deref(), Some("quantum_mech.json"));

    let resources = service.list_resources(limb.id).unwrap();
    let titles: Vec<_> = resources.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Entanglement", "Wave Function"]);

    let wave = service
        .get_resource_by_path("science_tree", "Legacy", "quantum_mech", "Wave Function")
        .unwrap();
    assert_eq!(wave.category.as_deref(), Some("subfield"));
    assert_eq!(
        wave.description.as_deref(),
        Some("Subfield from legacy quantum_mech.json")
    );
    assert_eq!(
        wave.tree_path,
        "science_tree → Legacy → quantum_mech → Wave Function"
    );
    assert_eq!(wave.metadata["original_field"], "Quantum Mechanics");
    assert_eq!(wave.metadata["migration_date"], "2025-06-22");
    assert_eq!(wave.metadata["requires_review"], true);
}

#[test]
fn executed_leaves_are_emitted_and_never_remigrated() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let mut live = options(MigrationMode::Execute);
    live.leaf_output_dir = Some(dir.path().to_path_buf());
    let report = run(&service, dir.path(), live.clone());
    assert_eq!(report.successful_migrations, 1);

    let emitted = dir.path().join("quantum_mech_migrated_leaf.json");
    let leaf: CanonicalLeaf =
        serde_json::from_str(&fs::read_to_string(&emitted).unwrap()).unwrap();
    assert_eq!(leaf.limb, "quantum_mech");
    assert_eq!(leaf.leaf_name, "Quantum Mech");
    assert_eq!(leaf.leaf_type, LeafType::MigratedContent);
    assert_eq!(leaf.tree_path, "science_tree → Legacy → quantum_mech");
    let stubs: Vec<_> = leaf.resources.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(stubs, ["Wave Function", "Entanglement"]);
    assert!(leaf.requires_review());

    // The emitted file matches the canonical pattern and the source is
    // already recorded, so a rerun touches nothing.
    let rerun = run(&service, dir.path(), live);
    assert_eq!(rerun.total_files, 0);
    assert_eq!(rerun.already_migrated, ["quantum_mech.json"]);
}

#[test]
fn live_migration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    write(dir.path(), "philosophy_of_mind.json", r#"{"field": "Mind", "subfields": ["Qualia"]}"#);
    write(dir.path(), "misc.json", r#"{"field": "Misc"}"#);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let first = run(&service, dir.path(), options(MigrationMode::Execute));
    assert_eq!(first.successful_migrations, 3);
    let after_first = service.structure().unwrap();

    let second = run(&service, dir.path(), options(MigrationMode::Execute));
    assert_eq!(second.total_files, 0);
    assert_eq!(second.already_migrated.len(), 3);
    assert_eq!(service.structure().unwrap(), after_first);

    let unknown = after_first.tree("unknown_tree").unwrap();
    assert_eq!(unknown.branches[0].limbs[0].name, "misc");
}

#[test]
fn duplicate_titles_are_skipped_not_failed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    // Same placement already populated by hand, without a recorded source.
    let limb = service
        .ensure_path("science_tree", "Legacy", "quantum_mech")
        .unwrap();
    for title in ["Wave Function", "Entanglement"] {
        service
            .add_resource(limb.id, yggdrasil_core::NewResource::new(title))
            .unwrap();
    }

    let dry = run(&service, dir.path(), options(MigrationMode::DryRun));
    let live = run(&service, dir.path(), options(MigrationMode::Execute));
    for report in [&dry, &live] {
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed_migrations, 0);
        assert_eq!(report.files_processed[0].status, FileStatus::Skipped);
    }
    assert_eq!(service.list_resources(limb.id).unwrap().len(), 2);
}

#[test]
fn dry_run_report_matches_live_report() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    write(dir.path(), "art_history.json", r#"{"subfields": ["Baroque"]}"#);
    write(dir.path(), "broken.json", "{not json");
    write(dir.path(), "science_branches.json", "{}");
    write(dir.path(), "master_tree_structure.json", "{}");
    write(dir.path(), "notes.txt", "ignored");

    let dry_conn = open_db_in_memory().unwrap();
    let live_conn = open_db_in_memory().unwrap();
    let dry = run(&service(&dry_conn), dir.path(), options(MigrationMode::DryRun));
    let live = run(&service(&live_conn), dir.path(), options(MigrationMode::Execute));

    assert_eq!(dry.total_files, 3);
    assert_eq!(dry.total_files, live.total_files);
    assert_eq!(dry.successful_migrations, live.successful_migrations);
    assert_eq!(dry.failed_migrations, live.failed_migrations);
    assert_eq!(dry.tree_distribution, live.tree_distribution);
    let statuses = |report: &MigrationReport| {
        report
            .files_processed
            .iter()
            .map(|outcome| (outcome.file.clone(), outcome.status))
            .collect::<Vec<_>>()
    };
    assert_eq!(statuses(&dry), statuses(&live));
    assert!(!live.dry_run);
}

#[test]
fn parse_failure_is_recorded_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a_broken.json", "{not json");
    write(dir.path(), "b_list.json", "[1, 2, 3]");
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let report = run(&service, dir.path(), options(MigrationMode::Execute));
    assert_eq!(report.total_files, 3);
    assert_eq!(report.failed_migrations, 2);
    assert_eq!(report.successful_migrations, 1);
    assert_eq!(report.tree_distribution.values().sum::<usize>(), 1);

    let files: Vec<_> = report.files_processed.iter().map(|o| o.file.as_str()).collect();
    assert_eq!(files, ["a_broken.json", "b_list.json", "quantum_mech.json"]);
    let broken = &report.files_processed[0];
    assert_eq!(broken.status, FileStatus::Failed);
    assert_eq!(broken.suggested_tree, None);
    assert!(broken.message.as_deref().unwrap().contains("invalid JSON"));
}

#[test]
fn recursive_scan_descends_into_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("physics")).unwrap();
    write(&dir.path().join("physics"), "optics.json", r#"{"subfields": ["Lenses"]}"#);
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let flat = run(&service, dir.path(), options(MigrationMode::DryRun));
    assert_eq!(flat.total_files, 1);

    let mut deep = options(MigrationMode::Execute);
    deep.recursive = true;
    let report = run(&service, dir.path(), deep);
    let files: Vec<_> = report.files_processed.iter().map(|o| o.file.as_str()).collect();
    assert_eq!(files, ["physics/optics.json", "quantum_mech.json"]);
    assert!(service
        .structure()
        .unwrap()
        .migrated_sources()
        .contains("physics/optics.json"));
}

#[test]
fn same_named_files_in_subdirectories_stay_separate() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for (subdir, title) in [("a", "Spin"), ("b", "Tunneling")] {
        fs::create_dir(dir.path().join(subdir)).unwrap();
        write(
            &dir.path().join(subdir),
            "quantum.json",
            &format!(r#"{{"subfields": ["{title}"]}}"#),
        );
    }
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let mut live = options(MigrationMode::Execute);
    live.recursive = true;
    live.leaf_output_dir = Some(out.path().to_path_buf());
    let report = run(&service, dir.path(), live.clone());
    assert_eq!(report.successful_migrations, 2);

    for (subdir, title) in [("a", "Spin"), ("b", "Tunneling")] {
        let limb_name = format!("{subdir}/quantum");
        let limb = service
            .resolve_path("science_tree", "Legacy", &limb_name)
            .unwrap();
        let source = format!("{subdir}/quantum.json");
        assert_eq!(limb.source_path.as_deref(), Some(source.as_str()));
        let titles: Vec<_> = service
            .list_resources(limb.id)
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, [title]);

        let emitted = out.path().join(subdir).join("quantum_migrated_leaf.json");
        let leaf: CanonicalLeaf =
            serde_json::from_str(&fs::read_to_string(&emitted).unwrap()).unwrap();
        assert_eq!(leaf.migrated_from(), Some(source.as_str()));
    }

    let rerun = run(&service, dir.path(), live);
    assert_eq!(rerun.total_files, 0);
    assert_eq!(rerun.already_migrated, ["a/quantum.json", "b/quantum.json"]);
}

#[test]
fn limb_recording_another_source_is_not_merged_into() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    service
        .merge_leaf(&LeafPlacement {
            path: TaxonomyPath::new("science_tree", "Legacy", "quantum_mech"),
            limb_description: None,
            source_path: Some("archive/quantum_mech.json".to_string()),
            resources: vec![NewResource::new("Spin")],
        })
        .unwrap();
    let before = service.structure().unwrap();

    let dry = run(&service, dir.path(), options(MigrationMode::DryRun));
    let live = run(&service, dir.path(), options(MigrationMode::Execute));
    for report in [&dry, &live] {
        assert_eq!(report.failed_migrations, 1);
        assert_eq!(report.skipped, 0);
        let outcome = &report.files_processed[0];
        assert_eq!(outcome.status, FileStatus::Failed);
        assert!(outcome
            .message
            .as_deref()
            .unwrap()
            .contains("archive/quantum_mech.json"));
    }
    assert_eq!(service.structure().unwrap(), before);
}

#[test]
fn blank_file_stem_fails_in_both_modes() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "   .json", QUANTUM_MECH);

    let dry_conn = open_db_in_memory().unwrap();
    let live_conn = open_db_in_memory().unwrap();
    let dry = run(&service(&dry_conn), dir.path(), options(MigrationMode::DryRun));
    let live = run(&service(&live_conn), dir.path(), options(MigrationMode::Execute));

    for report in [&dry, &live] {
        assert_eq!(report.total_files, 1);
        assert_eq!(report.failed_migrations, 1);
        assert_eq!(report.files_processed[0].status, FileStatus::Failed);
    }
    assert_eq!(service(&live_conn).structure().unwrap(), StructureSummary::default());
}

#[test]
fn emitted_leaf_keeps_subfields_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(dir.path(), "optics_notes.json", r#"{"subfields": ["Optics ", ""]}"#);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let mut live = options(MigrationMode::Execute);
    live.leaf_output_dir = Some(out.path().to_path_buf());
    let report = run(&service, dir.path(), live);
    assert_eq!(report.files_processed[0].status, FileStatus::Success);
    assert_eq!(report.files_processed[0].resources, 2);

    let leaf: CanonicalLeaf = serde_json::from_str(
        &fs::read_to_string(out.path().join("optics_notes_migrated_leaf.json")).unwrap(),
    )
    .unwrap();
    let stubs: Vec<_> = leaf.resources.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(stubs, ["Optics ", ""]);

    let limb = service
        .resolve_path(leaf.tree_path.split(" → ").next().unwrap(), "Legacy", "optics_notes")
        .unwrap();
    let stored: Vec<_> = service
        .list_resources(limb.id)
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(stored, ["Optics"]);
}

#[test]
fn cancelled_run_keeps_completed_work() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let orchestrator = MigrationOrchestrator::new(
        &service,
        Classifier::default(),
        CanonicalPatterns::defaults().unwrap(),
        options(MigrationMode::Execute),
    );
    let report = orchestrator
        .run_with_cancel(dir.path(), &AtomicBool::new(true))
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.total_files, 1);
    assert!(report.files_processed.is_empty());

    let report = orchestrator.run(dir.path()).unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.successful_migrations, 1);
}

#[test]
fn missing_root_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let err = MigrationOrchestrator::new(
        &service,
        Classifier::default(),
        CanonicalPatterns::defaults().unwrap(),
        options(MigrationMode::DryRun),
    )
    .run(&dir.path().join("absent"))
    .unwrap_err();
    assert!(matches!(err, MigrationError::RootNotFound(_)));
}

#[test]
fn report_serializes_with_snake_case_statuses() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quantum_mech.json", QUANTUM_MECH);
    let conn = open_db_in_memory().unwrap();

    let report = run(&service(&conn), dir.path(), options(MigrationMode::DryRun));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["files_processed"][0]["status"], "success");
    assert_eq!(json["files_processed"][0]["suggested_tree"], "science_tree");
    assert_eq!(json["tree_distribution"]["science_tree"], 1);
    assert!(report.render_text().contains("Successful migrations: 1"));
}
