use rusqlite::Connection;
use yggdrasil_core::db::open_db_in_memory;
use yggdrasil_core::{
    search_resources, NewResource, NodeRef, SearchError, SearchQuery, SqliteTaxonomyRepository,
    TaxonomyService,
};

fn seeded(conn: &Connection) -> TaxonomyService<SqliteTaxonomyRepository<'_>> {
    let service = TaxonomyService::new(SqliteTaxonomyRepository::try_new(conn).unwrap());

    let optics = service.ensure_path("science_tree", "Physics", "Optics").unwrap();
    let mut opticks = NewResource::new("Opticks");
    opticks.description = Some("Treatise on the reflections of light".to_string());
    opticks.key_concepts = vec!["refraction".to_string()];
    service.add_resource(optics.id, opticks).unwrap();

    let mut lenses = NewResource::new("Lens Design");
    lenses.content = Some("Light bends through glass".to_string());
    service.add_resource(optics.id, lenses).unwrap();

    let painting = service.ensure_path("arts_tree", "Painting", "Baroque").unwrap();
    let mut chiaroscuro = NewResource::new("Chiaroscuro");
    chiaroscuro.description = Some("Contrast of light and shadow".to_string());
    service.add_resource(painting.id, chiaroscuro).unwrap();

    service
}

#[test]
fn search_matches_title_description_content_and_concepts() {
    let conn = open_db_in_memory().unwrap();
    let _service = seeded(&conn);

    let hits = search_resources(&conn, &SearchQuery::new("light")).unwrap();
    let mut titles: Vec<_> = hits.iter().map(|hit| hit.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, ["Chiaroscuro", "Lens Design", "Opticks"]);

    let hits = search_resources(&conn, &SearchQuery::new("refraction")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tree_path, "science_tree → Physics → Optics → Opticks");
}

#[test]
fn terms_are_anded_and_tree_filter_applies() {
    let conn = open_db_in_memory().unwrap();
    let _service = seeded(&conn);

    let hits = search_resources(&conn, &SearchQuery::new("light shadow")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Chiaroscuro");

    let hits =
        search_resources(&conn, &SearchQuery::new("light").with_tree("science_tree")).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits
        .iter()
        .all(|hit| hit.tree_path.starts_with("science_tree → ")));
}

#[test]
fn blank_query_and_zero_limit_return_nothing() {
    let conn = open_db_in_memory().unwrap();
    let _service = seeded(&conn);

    assert!(search_resources(&conn, &SearchQuery::new("   ")).unwrap().is_empty());
    assert!(search_resources(&conn, &SearchQuery::new("light").with_limit(0))
        .unwrap()
        .is_empty());
    assert_eq!(
        search_resources(&conn, &SearchQuery::new("light").with_limit(1))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn operator_words_are_searched_literally() {
    let conn = open_db_in_memory().unwrap();
    let _service = seeded(&conn);

    // `AND` is quoted into a plain term, so only text containing "and" hits.
    let hits = search_resources(&conn, &SearchQuery::new("light AND")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Chiaroscuro");
}

#[test]
fn malformed_raw_query_is_invalid_query() {
    let conn = open_db_in_memory().unwrap();
    let _service = seeded(&conn);

    let mut query = SearchQuery::new("light AND (");
    query.raw_fts_syntax = true;
    let err = search_resources(&conn, &query).unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery { .. }));
}

#[test]
fn renamed_and_refreshed_resources_are_reindexed() {
    let conn = open_db_in_memory().unwrap();
    let service = seeded(&conn);
    let opticks = service
        .get_resource_by_path("science_tree", "Physics", "Optics", "Opticks")
        .unwrap();

    service
        .rename_node(NodeRef::Resource(opticks.id), "Opticks Revised")
        .unwrap();
    service
        .refresh_resource(opticks.id, Some("Corpuscular theory of colours"))
        .unwrap();

    let hits = search_resources(&conn, &SearchQuery::new("corpuscular")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Opticks Revised");
    assert_eq!(
        hits[0].tree_path,
        "science_tree → Physics → Optics → Opticks Revised"
    );
}
