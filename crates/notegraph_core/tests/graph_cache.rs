use notegraph_core::detect::window::CoOccurrenceWindow;
use notegraph_core::{
    ConnectionType, ExplicitEdge, GraphConfig, GraphEngine, NoteChange, PersonNames, SyncState,
};
use std::path::Path;
use uuid::Uuid;

fn id(value: u128) -> Uuid {
    Uuid::from_u128(value)
}

fn populate(path: &Path) -> notegraph_core::GraphSnapshot {
    let engine = GraphEngine::open_with_cache(GraphConfig::default(), path).unwrap();
    assert_eq!(engine.cache_load().map(|load| load.nodes), Some(0));

    engine
        .on_person_changed(
            id(10),
            &PersonNames::new("Alice Smith").with_alias("Ali"),
        )
        .unwrap();
    engine
        .on_person_changed(id(20), &PersonNames::new("Bob Jones"))
        .unwrap();
    engine
        .on_note_changed(id(1), "# Budget review\nAlice Smith met Bob Jones.", 3)
        .unwrap();
    engine
        .on_note_changed(id(2), "Hiring\nBob Jones and Ali talked.", 1)
        .unwrap();
    engine.wait_idle();
    engine
        .update_connections(id(2), &[ExplicitEdge::link(id(1))])
        .unwrap();

    engine.save_cache(None).unwrap();
    engine.get_graph()
}

#[test]
fn reload_restores_graph_without_detection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let saved = populate(&path);
    assert!(!saved.edges.is_empty());

    let engine = GraphEngine::open_with_cache(GraphConfig::default(), &path).unwrap();
    let load = engine.cache_load().unwrap();
    assert!(load.trusted);
    assert_eq!(load.nodes, saved.nodes.len());
    assert_eq!(load.edges, saved.edges.len());
    assert_eq!(engine.get_graph(), saved);

    let co_occurrences = engine.get_stats().edge_count_by_type[&ConnectionType::CoOccursWith];
    assert_eq!(co_occurrences, 1);
}

#[test]
fn cached_version_is_adopted_and_newer_version_redetected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    populate(&path);

    let engine = GraphEngine::open_with_cache(GraphConfig::default(), &path).unwrap();
    assert_eq!(
        engine
            .on_note_changed(id(1), "# Budget review\nAlice Smith met Bob Jones.", 3)
            .unwrap(),
        NoteChange::Adopted { version: 3 }
    );
    assert_eq!(engine.sync_state(id(1)), Some(SyncState::Clean));
    assert_eq!(
        engine.on_note_changed(id(1), "older", 2).unwrap(),
        NoteChange::Stale { known_version: 3 }
    );

    engine
        .on_note_changed(id(1), "# Budget review\nonly Bob Jones now", 4)
        .unwrap();
    engine.wait_idle();
    let targets = engine
        .graph()
        .attributed_edges(id(1))
        .iter()
        .map(|edge| edge.target())
        .collect::<Vec<_>>();
    assert_eq!(targets, vec![id(20)]);
}

#[test]
fn changed_detector_settings_force_redetection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    populate(&path);

    let config = GraphConfig {
        co_occurrence_window: CoOccurrenceWindow::Paragraph,
        ..GraphConfig::default()
    };
    let engine = GraphEngine::open_with_cache(config, &path).unwrap();
    assert!(!engine.cache_load().unwrap().trusted);

    let change = engine
        .on_note_changed(id(1), "# Budget review\nAlice Smith met Bob Jones.", 3)
        .unwrap();
    assert!(matches!(change, NoteChange::Scheduled { version: 3, .. }));
    engine.wait_idle();
    assert_eq!(engine.sync_state(id(1)), Some(SyncState::Clean));
}

#[test]
fn save_to_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.db");

    let engine = GraphEngine::new(GraphConfig::default()).unwrap();
    engine
        .on_person_changed(id(10), &PersonNames::new("Alice Smith"))
        .unwrap();
    engine.save_cache(Some(path.as_path())).unwrap();
    drop(engine);

    let reopened = GraphEngine::open_with_cache(GraphConfig::default(), &path).unwrap();
    assert!(reopened.graph().contains(id(10)));
    assert_eq!(reopened.cache_path(), Some(path.as_path()));
}
