mod common;

use dnesave_core::core_api::{CoreErrorCode, Engine, FactValue, Relationship};
use dnesave_core::facts::{FactCatalog, FactDefinition, FactType};

use common::story_save;

const DEFS: &str = r#"[
    {"Type": 3, "FactAssetId": "A1", "FactId": "F1", "FactAssetName": "Chapter1", "FactName": "MetAutumn"},
    {"Type": 0, "FactAssetId": "A1", "FactId": "F2", "FactAssetName": "Chapter1", "FactName": "Trust"}
]"#;

fn scenes(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn summary_lists_scene_snapshots() {
    let session = Engine::new().open_bytes(story_save()).unwrap();
    let summary = session.summary();
    assert_eq!(summary.save_data_type, "DNESaveGame");
    assert_eq!(summary.engine_version, "5.3.2");
    assert_eq!(summary.scene_ids, vec!["S1000_10", "S1100_10"]);
    assert_eq!(summary.property_count, 4);
}

#[test]
fn relationships_are_read_per_scene_and_global() {
    let session = Engine::new().open_bytes(story_save()).unwrap();
    let per_scene = session.relationships().unwrap();

    let keys: Vec<&str> = per_scene.iter().map(|s| s.scene.as_str()).collect();
    assert_eq!(keys, vec!["S1000_10", "S1100_10", "global"]);

    let autumn = |i: usize| {
        per_scene[i]
            .relationships
            .iter()
            .find(|r| r.name == "Autumn")
            .cloned()
            .expect("Autumn should be present")
    };
    assert_eq!(autumn(0).level, 1);
    assert_eq!(autumn(1).level, 2);
    assert_eq!(
        autumn(2),
        Relationship {
            name: "Autumn".to_string(),
            level: 3,
            growth: 2,
            decay: 0,
            growth_changes: 6,
            decay_changes: 0,
        }
    );
    assert_eq!(per_scene[2].relationships.len(), 2);
}

#[test]
fn fact_timelines_follow_play_order() {
    let session = Engine::new().open_bytes(story_save()).unwrap();
    let timelines = session.catalog_facts(&FactCatalog::default()).unwrap();

    assert_eq!(timelines.len(), 2);
    let met = &timelines[0];
    assert_eq!(met.fact.fact_id, "F1");
    assert_eq!(met.fact.fact_type, FactType::Bool);
    let history: Vec<(&str, FactValue)> = met
        .values
        .iter()
        .map(|v| (v.scene.as_str(), v.value))
        .collect();
    assert_eq!(
        history,
        vec![
            ("S1000_10", FactValue::Bool(false)),
            ("S1100_10", FactValue::Bool(true)),
            ("global", FactValue::Bool(true)),
        ]
    );
    assert_eq!(timelines[1].latest(), Some(FactValue::Int(7)));
}

#[test]
fn fact_timelines_use_catalog_names() {
    let session = Engine::new().open_bytes(story_save()).unwrap();
    let catalog = FactCatalog::from_json_str(DEFS).unwrap();
    let timelines = session.catalog_facts(&catalog).unwrap();
    assert_eq!(timelines[1].fact.label(), "Chapter1 / Trust");
}

#[test]
fn adjust_fact_patches_selected_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("working.sav");
    let engine = Engine::new();
    let session = engine.open_bytes(story_save()).unwrap();
    let mut buffer = session.write_working_copy(&path).unwrap();

    let catalog = FactCatalog::from_json_str(DEFS).unwrap();
    let trust = catalog.find_by_name("Trust").unwrap();
    let complete = session
        .adjust_fact(&mut buffer, trust, FactValue::Int(9), &scenes(&["S1100_10", "S9999_99"]), true)
        .unwrap();
    assert!(complete);
    buffer.write_out().unwrap();

    let patched = engine.open_path(&path).unwrap();
    let timeline = patched
        .catalog_facts(&catalog)
        .unwrap()
        .into_iter()
        .find(|t| t.fact.fact_id == "F2")
        .unwrap();
    let values: Vec<FactValue> = timeline.values.iter().map(|v| v.value).collect();
    assert_eq!(
        values,
        vec![FactValue::Int(5), FactValue::Int(9), FactValue::Int(9)]
    );
}

#[test]
fn adjust_fact_reports_missing_targets() {
    let session = Engine::new().open_bytes(story_save()).unwrap();
    let mut buffer = dnesave_core::patch::PatchBuffer::from_bytes(session.container().raw_bytes().to_vec());

    let unknown = FactDefinition::bare(FactType::Int, "A7", "F2");
    let complete = session
        .adjust_fact(&mut buffer, &unknown, FactValue::Int(1), &scenes(&["S1000_10"]), false)
        .unwrap();
    assert!(!complete);
    assert_eq!(buffer.as_bytes(), session.container().raw_bytes());

    let wrong_type = FactDefinition::bare(FactType::Bool, "A1", "F1");
    let err = session
        .adjust_fact(&mut buffer, &wrong_type, FactValue::Int(1), &[], true)
        .unwrap_err();
    assert_eq!(err.code, CoreErrorCode::UnsupportedOperation);
}

#[test]
fn adjust_relationship_rewrites_all_counters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("working.sav");
    let engine = Engine::new();
    let session = engine.open_bytes(story_save()).unwrap();
    let mut buffer = session.write_working_copy(&path).unwrap();

    let wanted = Relationship {
        name: "Autumn".to_string(),
        level: 5,
        growth: 4,
        decay: 1,
        growth_changes: 10,
        decay_changes: 2,
    };
    session
        .adjust_relationship(&mut buffer, &wanted, &scenes(&["S1000_10"]), false)
        .unwrap();
    buffer.write_out().unwrap();

    let patched = engine.open_path(&path).unwrap();
    let per_scene = patched.relationships().unwrap();
    let first = per_scene[0]
        .relationships
        .iter()
        .find(|r| r.name == "Autumn")
        .unwrap();
    assert_eq!(first, &wanted);
    let global = per_scene[2]
        .relationships
        .iter()
        .find(|r| r.name == "Autumn")
        .unwrap();
    assert_eq!(global.level, 3);
}

#[test]
fn second_patch_from_stale_tree_is_rejected() {
    let session = Engine::new().open_bytes(story_save()).unwrap();
    let mut buffer = dnesave_core::patch::PatchBuffer::from_bytes(session.container().raw_bytes().to_vec());
    let nora = Relationship {
        name: "Nora".to_string(),
        level: 4,
        growth: 2,
        decay: 0,
        growth_changes: 0,
        decay_changes: 0,
    };

    session
        .adjust_relationship(&mut buffer, &nora, &[], true)
        .unwrap();
    let err = session
        .adjust_relationship(&mut buffer, &nora, &[], true)
        .unwrap_err();
    assert_eq!(err.code, CoreErrorCode::PatchVerification);

    let err = session
        .adjust_relationship(
            &mut buffer,
            &Relationship {
                name: "Chloe".to_string(),
                ..nora
            },
            &[],
            true,
        )
        .unwrap_err();
    assert_eq!(err.code, CoreErrorCode::NotFound);
}
