use rusqlite::Connection;
use yggdrasil_core::db::open_db_in_memory;
use yggdrasil_core::{
    NewResource, NodeKind, NodeRef, SqliteTaxonomyRepository, TaxonomyRepository,
    TaxonomyService, TaxonomyServiceError, ValidationError,
};

fn service(conn: &Connection) -> TaxonomyService<SqliteTaxonomyRepository<'_>> {
    TaxonomyService::new(SqliteTaxonomyRepository::try_new(conn).unwrap())
}

#[test]
fn ensure_path_creates_missing_ancestors_once() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let first = service
        .ensure_path(" philosophy_tree ", "Ancient", "Stoicism")
        .unwrap();
    let second = service
        .ensure_path("philosophy_tree", "Ancient", "Stoicism")
        .unwrap();
    assert_eq!(first.id, second.id);

    let trees = service.list_trees().unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].name, "philosophy_tree");
    assert_eq!(service.list_branches(trees[0].id).unwrap().len(), 1);
}

#[test]
fn branch_names_are_scoped_to_their_tree() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let a = service.ensure_path("science_tree", "Legacy", "optics").unwrap();
    let b = service.ensure_path("arts_tree", "Legacy", "optics").unwrap();
    assert_ne!(a.id, b.id);
    assert_ne!(a.branch_id, b.branch_id);
}

#[test]
fn strict_lookups_report_not_found_without_creating() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    service.ensure_path("science_tree", "Physics", "Optics").unwrap();

    match service.resolve_path("science_tree", "Physics", "Acoustics") {
        Err(TaxonomyServiceError::NotFound { kind, key }) => {
            assert_eq!(kind, NodeKind::Limb);
            assert_eq!(key, "science_tree → Physics → Acoustics");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        service.find_tree("history_tree"),
        Err(TaxonomyServiceError::NotFound {
            kind: NodeKind::Tree,
            ..
        })
    ));
    assert_eq!(service.list_trees().unwrap().len(), 1);
}

#[test]
fn add_resource_derives_tree_path_and_rejects_duplicates() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let limb = service.ensure_path("science_tree", "Physics", "Optics").unwrap();

    let mut payload = NewResource::new("  Opticks ");
    payload.author = Some("Isaac Newton".to_string());
    payload.key_concepts = vec!["light".to_string(), "refraction".to_string()];
    let created = service.add_resource(limb.id, payload).unwrap();
    assert_eq!(created.title, "Opticks");
    assert_eq!(created.tree_path, "science_tree → Physics → Optics → Opticks");
    assert_eq!(created.key_concepts, ["light", "refraction"]);

    let err = service
        .add_resource(limb.id, NewResource::new("Opticks"))
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonomyServiceError::Validation(ValidationError::DuplicateTitle { .. })
    ));

    let err = service
        .add_resource(limb.id, NewResource::new("   "))
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonomyServiceError::Validation(ValidationError::EmptyTitle)
    ));
    assert_eq!(service.list_resources(limb.id).unwrap().len(), 1);
}

#[test]
fn get_resource_by_path_resolves_full_path() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let limb = service.ensure_path("religion_tree", "Texts", "Vedas").unwrap();
    let created = service
        .add_resource(limb.id, NewResource::new("Rigveda"))
        .unwrap();

    let found = service
        .get_resource_by_path("religion_tree", "Texts", "Vedas", "Rigveda")
        .unwrap();
    assert_eq!(found.id, created.id);
    assert!(matches!(
        service.get_resource_by_path("religion_tree", "Texts", "Vedas", "Upanishads"),
        Err(TaxonomyServiceError::NotFound {
            kind: NodeKind::Resource,
            ..
        })
    ));
}

#[test]
fn rename_keeps_descendant_tree_paths_consistent() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let limb = service.ensure_path("science_tree", "Physics", "Optics").unwrap();
    let resource = service
        .add_resource(limb.id, NewResource::new("Opticks"))
        .unwrap();

    service
        .rename_node(NodeRef::Branch(limb.branch_id), "Natural Philosophy")
        .unwrap();
    let tree = service.find_tree("science_tree").unwrap();
    service.rename_node(NodeRef::Tree(tree.id), "physics_tree").unwrap();
    service
        .rename_node(NodeRef::Resource(resource.id), "Opticks (1704)")
        .unwrap();

    let reloaded = service.get_resource(resource.id).unwrap();
    assert_eq!(
        reloaded.tree_path,
        "physics_tree → Natural Philosophy → Optics → Opticks (1704)"
    );
    assert!(service
        .get_resource_by_path("physics_tree", "Natural Philosophy", "Optics", "Opticks (1704)")
        .is_ok());
}

#[test]
fn rename_rejects_sibling_collisions_and_blank_names() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let optics = service.ensure_path("science_tree", "Physics", "Optics").unwrap();
    service.ensure_path("science_tree", "Physics", "Acoustics").unwrap();

    let err = service
        .rename_node(NodeRef::Limb(optics.id), "Acoustics")
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonomyServiceError::Validation(ValidationError::DuplicateName {
            kind: NodeKind::Limb,
            ..
        })
    ));
    let err = service.rename_node(NodeRef::Limb(optics.id), " ").unwrap_err();
    assert!(matches!(
        err,
        TaxonomyServiceError::Validation(ValidationError::EmptyName(NodeKind::Limb))
    ));
}

#[test]
fn set_description_and_refresh_resource_update_rows() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let limb = service.ensure_path("history_tree", "Ancient", "Rome").unwrap();
    let resource = service
        .add_resource(limb.id, NewResource::new("Annals"))
        .unwrap();
    assert_eq!(resource.scraped_at, None);

    service
        .set_description(NodeRef::Limb(limb.id), Some("  Roman history  "))
        .unwrap();
    let limbs = service.list_limbs(limb.branch_id).unwrap();
    assert_eq!(limbs[0].description.as_deref(), Some("Roman history"));

    service
        .set_description(NodeRef::Limb(limb.id), Some("   "))
        .unwrap();
    let limbs = service.list_limbs(limb.branch_id).unwrap();
    assert_eq!(limbs[0].description, None);

    service
        .refresh_resource(resource.id, Some("Ab excessu divi Augusti"))
        .unwrap();
    let refreshed = service.get_resource(resource.id).unwrap();
    assert_eq!(refreshed.content.as_deref(), Some("Ab excessu divi Augusti"));
    assert!(refreshed.scraped_at.is_some());
}

#[test]
fn cross_references_are_directed_and_listed_both_ways() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let limb = service.ensure_path("philosophy_tree", "Ancient", "Stoicism").unwrap();
    let meditations = service
        .add_resource(limb.id, NewResource::new("Meditations"))
        .unwrap();
    let enchiridion = service
        .add_resource(limb.id, NewResource::new("Enchiridion"))
        .unwrap();

    let reference = service
        .add_cross_reference(meditations.id, enchiridion.id, " Cited-By ")
        .unwrap();
    assert_eq!(reference.relationship_type, "cited-by");

    assert!(matches!(
        service.add_cross_reference(meditations.id, enchiridion.id, "cited-by"),
        Err(TaxonomyServiceError::Validation(
            ValidationError::DuplicateCrossReference { .. }
        ))
    ));
    assert!(matches!(
        service.add_cross_reference(meditations.id, meditations.id, "related"),
        Err(TaxonomyServiceError::Validation(ValidationError::SelfReference(_)))
    ));
    assert!(matches!(
        service.add_cross_reference(meditations.id, enchiridion.id, "  "),
        Err(TaxonomyServiceError::Validation(
            ValidationError::EmptyRelationshipType
        ))
    ));

    let from = service.list_cross_references(meditations.id).unwrap();
    let to = service.list_cross_references(enchiridion.id).unwrap();
    assert_eq!(from, to);
    assert_eq!(from.len(), 1);
}

#[test]
fn listings_are_ordered_by_name() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    for name in ["religion_tree", "arts_tree", "science_tree"] {
        service.ensure_tree(name).unwrap();
    }
    let names: Vec<String> = service
        .list_trees()
        .unwrap()
        .into_iter()
        .map(|tree| tree.name)
        .collect();
    assert_eq!(names, ["arts_tree", "religion_tree", "science_tree"]);
}

#[test]
fn repository_rejects_branch_under_missing_tree() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaxonomyRepository::try_new(&conn).unwrap();
    let err = repo
        .get_or_create_branch(yggdrasil_core::TreeId::new(), "Legacy")
        .unwrap_err();
    assert!(matches!(
        err,
        yggdrasil_core::RepoError::NotFound {
            kind: NodeKind::Tree,
            ..
        }
    ));
}
