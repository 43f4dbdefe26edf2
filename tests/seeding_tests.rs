//! End-to-end seeding tests against the in-memory store.
//!
//! Exercises the full pipeline a deployment runs: dataset extraction,
//! shape validation, skip-on-conflict upsert, and self-reference
//! resolution, including failure and recovery paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use seed_runner::{
    AfterSeed, BeforeSeed, FieldType, MemoryStore, Record, ReferenceSpec, ResolveReferences,
    RunnerState, SeedError, SeedResult, SeedRunner, SeedStore, SeedTarget, ShapeContract,
    StoreError, resolve_references,
};

fn levels_contract() -> ShapeContract {
    ShapeContract::new()
        .require("code", FieldType::Text)
        .require("name", FieldType::Text)
        .require_nullable("parent_summary_level", FieldType::Text)
}

fn levels_spec() -> ReferenceSpec {
    ReferenceSpec::new(
        "Geography levels",
        "summary_levels",
        "code",
        "parent_summary_level",
        "parent_summary_level_id",
    )
}

fn levels_target() -> SeedTarget {
    SeedTarget::new(
        "summary_levels.json",
        "summary_levels",
        "code",
        "summary_levels",
    )
    .with_contract(levels_contract())
    .with_after_seed(ResolveReferences::new(levels_spec()))
}

fn hierarchy_document() -> serde_json::Value {
    json!({
        "summary_levels": [
            { "code": "010", "name": "Nation", "parent_summary_level": null },
            { "code": "040", "name": "State", "parent_summary_level": "010" },
            { "code": "050", "name": "County", "parent_summary_level": "040" }
        ]
    })
}

async fn connected_runner() -> SeedRunner<MemoryStore> {
    let mut runner = SeedRunner::new(MemoryStore::new());
    runner.connect().await.unwrap();
    runner
}

fn row<'a>(rows: &'a [serde_json::Value], code: &str) -> &'a serde_json::Value {
    rows.iter()
        .find(|r| r["code"] == json!(code))
        .unwrap_or_else(|| panic!("no row with code {}", code))
}

#[tokio::test]
async fn test_hierarchy_seeds_and_resolves() {
    let mut runner = connected_runner().await;

    let summary = runner.seed(&levels_target(), &hierarchy_document()).await.unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.inserted, 3);

    let rows = runner.store().fetch_all("summary_levels").await.unwrap();
    assert_eq!(rows.len(), 3);

    let nation = row(&rows, "010");
    let state = row(&rows, "040");
    let county = row(&rows, "050");

    assert_eq!(nation["parent_summary_level_id"], json!(null));
    assert_eq!(state["parent_summary_level_id"], nation["id"]);
    assert_eq!(county["parent_summary_level_id"], state["id"]);
}

#[tokio::test]
async fn test_reseeding_is_idempotent() {
    let mut runner = connected_runner().await;

    runner.seed(&levels_target(), &hierarchy_document()).await.unwrap();
    let before = runner.store().fetch_all("summary_levels").await.unwrap();

    let second = runner.seed(&levels_target(), &hierarchy_document()).await.unwrap();
    assert_eq!(second.records, 3);
    assert_eq!(second.inserted, 0);

    let after = runner.store().fetch_all("summary_levels").await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_children_before_parents_still_resolve() {
    let mut runner = connected_runner().await;

    // Deepest level first; resolution runs over the whole table afterwards.
    let reversed = json!({
        "summary_levels": [
            { "code": "050", "name": "County", "parent_summary_level": "040" },
            { "code": "040", "name": "State", "parent_summary_level": "010" },
            { "code": "010", "name": "Nation", "parent_summary_level": null }
        ]
    });

    runner.seed(&levels_target(), &reversed).await.unwrap();

    let rows = runner.store().fetch_all("summary_levels").await.unwrap();
    assert_eq!(row(&rows, "050")["parent_summary_level_id"], row(&rows, "040")["id"]);
    assert_eq!(row(&rows, "040")["parent_summary_level_id"], row(&rows, "010")["id"]);
}

#[tokio::test]
async fn test_orphaned_reference_is_reported_not_fatal() {
    let mut runner = connected_runner().await;

    let with_orphan = json!({
        "summary_levels": [
            { "code": "010", "name": "Nation", "parent_summary_level": null },
            { "code": "777", "name": "Lost", "parent_summary_level": "888" }
        ]
    });

    // Seeding succeeds despite the dangling reference.
    runner.seed(&levels_target(), &with_orphan).await.unwrap();
    assert_eq!(runner.state(), RunnerState::Connected);

    let report = resolve_references(runner.store(), &levels_spec()).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.with_reference, 1);
    assert_eq!(report.resolved, 0);
    assert_eq!(report.orphan_count(), 1);
    assert_eq!(report.orphans[0]["code"], json!("777"));

    let rows = runner.store().fetch_all("summary_levels").await.unwrap();
    assert_eq!(row(&rows, "777")["parent_summary_level_id"], json!(null));
}

#[tokio::test]
async fn test_validation_rejects_whole_dataset() {
    let mut runner = connected_runner().await;

    // Second record is missing its name; nothing may be written.
    let invalid = json!({
        "summary_levels": [
            { "code": "010", "name": "Nation", "parent_summary_level": null },
            { "code": "040", "parent_summary_level": "010" }
        ]
    });

    let err = runner.seed(&levels_target(), &invalid).await.unwrap_err();
    match err {
        SeedError::Validation(inner) => {
            let message = inner.to_string();
            assert!(message.contains("record 1"), "unexpected message: {}", message);
            assert!(message.contains("name"), "unexpected message: {}", message);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(runner.state(), RunnerState::Failed);

    // The table was never touched.
    assert!(runner.store().fetch_all("summary_levels").await.is_err());
}

#[tokio::test]
async fn test_duplicate_natural_key_first_record_wins() {
    let mut runner = connected_runner().await;

    let duplicated = json!({
        "summary_levels": [
            { "code": "010", "name": "Nation", "parent_summary_level": null },
            { "code": "010", "name": "Duplicate", "parent_summary_level": null }
        ]
    });

    let summary = runner.seed(&levels_target(), &duplicated).await.unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.inserted, 1);

    let rows = runner.store().fetch_all("summary_levels").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("Nation"));
}

#[tokio::test]
async fn test_missing_data_path_fails_before_any_write() {
    let mut runner = connected_runner().await;

    let err = runner
        .seed(&levels_target(), &json!({ "wrong_key": [] }))
        .await
        .unwrap_err();
    assert!(matches!(err, SeedError::DataPath { .. }));
    assert_eq!(runner.state(), RunnerState::Failed);
}

/// Schema-preparation hook: runs idempotent DDL through the store.
struct PrepareIndexes;

#[async_trait(?Send)]
impl BeforeSeed for PrepareIndexes {
    async fn run(&self, store: &dyn SeedStore, records: &[Record]) -> SeedResult<()> {
        assert!(!records.is_empty());
        store
            .batch_execute("CREATE INDEX IF NOT EXISTS idx_summary_levels_code ON summary_levels (code)")
            .await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_before_seed_hook_runs_schema_preparation() {
    let mut runner = connected_runner().await;

    let target = levels_target().with_before_seed(PrepareIndexes);
    let summary = runner.seed(&target, &hierarchy_document()).await.unwrap();
    assert_eq!(summary.inserted, 3);
}

/// After-seed hook that fails on its first invocation.
struct FailOnce {
    failed: AtomicBool,
}

impl FailOnce {
    fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait(?Send)]
impl AfterSeed for FailOnce {
    async fn run(&self, _store: &dyn SeedStore) -> SeedResult<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::QueryFailed {
                code: None,
                message: "post-seed step lost its connection".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_hook_failure_is_attributed_and_recoverable() {
    let mut runner = connected_runner().await;
    let target = levels_target().with_after_seed(FailOnce::new());

    let err = runner.seed(&target, &hierarchy_document()).await.unwrap_err();
    match err {
        SeedError::Hook { stage, .. } => assert_eq!(stage, "after_seed"),
        other => panic!("expected hook error, got {:?}", other),
    }
    assert_eq!(runner.state(), RunnerState::Failed);

    // Rows from the failed run survive; the retry skips them all.
    let summary = runner.seed(&target, &hierarchy_document()).await.unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(runner.state(), RunnerState::Connected);
}

/// Hook that sleeps past any reasonable stage timeout.
struct SlowHook;

#[async_trait(?Send)]
impl AfterSeed for SlowHook {
    async fn run(&self, _store: &dyn SeedStore) -> SeedResult<()> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_stage_timeout_surfaces_as_cancellation() {
    let mut runner = SeedRunner::new(MemoryStore::new()).with_timeout(Duration::from_millis(20));
    runner.connect().await.unwrap();

    let target = levels_target().with_after_seed(SlowHook);
    let err = runner.seed(&target, &hierarchy_document()).await.unwrap_err();

    match err {
        SeedError::Hook { stage, source } => {
            assert_eq!(stage, "after_seed");
            assert!(matches!(*source, SeedError::Store(StoreError::Cancelled(_))));
        }
        other => panic!("expected cancelled hook, got {:?}", other),
    }
    assert_eq!(runner.state(), RunnerState::Failed);
}

#[tokio::test]
async fn test_multiple_datasets_through_one_runner() {
    let mut runner = connected_runner().await;

    runner.seed(&levels_target(), &hierarchy_document()).await.unwrap();

    let states_target = SeedTarget::new("states.json", "states", "fips", "states")
        .with_contract(
            ShapeContract::new()
                .require("fips", FieldType::Text)
                .require("name", FieldType::Text),
        );
    let states = json!({
        "states": [
            { "fips": "06", "name": "California" },
            { "fips": "36", "name": "New York" }
        ]
    });

    let summary = runner.seed(&states_target, &states).await.unwrap();
    assert_eq!(summary.inserted, 2);

    assert_eq!(runner.store().fetch_all("summary_levels").await.unwrap().len(), 3);
    assert_eq!(runner.store().fetch_all("states").await.unwrap().len(), 2);

    runner.disconnect().await.unwrap();
    assert_eq!(runner.state(), RunnerState::Disconnected);
}
