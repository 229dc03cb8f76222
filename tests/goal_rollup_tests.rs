use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mission_control::api::{router, Client, CoreClient};
use mission_control::forest::{self, GoalForest};
use mission_control::models::{Core, GoalNode, NewTask};
use mission_control::store::{GoalStore, JsonGoalStore, JsonTaskStore, MemoryGoalStore, MemoryTaskStore};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tower::ServiceExt;

fn example_goals() -> Vec<GoalNode> {
    vec![
        GoalNode::new("r", "Root"),
        GoalNode::new("c1", "One").with_progress(40).with_parent("r"),
        GoalNode::new("c2", "Two").with_progress(80).with_parent("r"),
    ]
}

/// Random acyclic forest: every parent comes earlier in the list or is dangling
fn random_forest(rng: &mut StdRng, size: usize) -> Vec<GoalNode> {
    (0..size)
        .map(|i| {
            let mut goal = GoalNode::new(format!("g{}", i), format!("Goal {}", i))
                .with_progress(rng.gen_range(0..=100));
            match rng.gen_range(0..10) {
                0 => goal = goal.with_parent("missing"),
                1..=2 => {}
                _ if i > 0 => goal = goal.with_parent(format!("g{}", rng.gen_range(0..i))),
                _ => {}
            }
            if rng.gen_bool(0.2) {
                goal = goal.with_override(rng.gen_range(0..=100));
            }
            goal
        })
        .collect()
}

#[test]
fn test_rollup_examples() {
    let progress = forest::progress_for(&example_goals());
    assert_eq!(progress["r"], 60.0);
    assert_eq!(progress["c1"], 40.0);
    assert_eq!(progress["c2"], 80.0);

    let mut overridden = example_goals();
    overridden[0] = overridden[0].clone().with_override(10);
    let progress = forest::progress_for(&overridden);
    assert_eq!(progress["r"], 10.0);
    assert_eq!(progress["c1"], 40.0);
    assert_eq!(progress["c2"], 80.0);

    let cycle = vec![
        GoalNode::new("a", "A").with_progress(30).with_parent("b"),
        GoalNode::new("b", "B").with_progress(70).with_parent("a"),
    ];
    let progress = forest::progress_for(&cycle);
    assert_eq!(progress["a"], 30.0);
    assert_eq!(progress["b"], 70.0);
}

#[test]
fn test_rollup_invariants_on_random_forests() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let size = rng.gen_range(1..40);
        let goals = random_forest(&mut rng, size);
        let forest = GoalForest::build(&goals);
        let progress = forest::compute_progress(&forest);

        assert_eq!(progress.len(), goals.len());
        for goal in &goals {
            let value = progress[&goal.id];
            assert!((0.0..=100.0).contains(&value));

            let children = forest.children_of(&goal.id);
            if children.is_empty() {
                assert_eq!(value, goal.progress as f64);
            } else if let Some(fixed) = goal.progress_override {
                assert_eq!(value, fixed as f64);
            } else {
                let mean = children.iter().map(|c| progress[&c.id]).sum::<f64>()
                    / children.len() as f64;
                assert!((value - mean).abs() < 1e-9, "{} != {}", value, mean);
            }
        }
    }
}

#[test]
fn test_delete_leaves_no_dangling_references() {
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..50 {
        let goals = random_forest(&mut rng, 25);
        let victim = format!("g{}", rng.gen_range(0..25));
        let removed_parent = goals
            .iter()
            .find(|g| g.id == victim)
            .and_then(|g| g.parent_id.clone());

        let after = forest::remove_goal(&goals, &victim).unwrap();
        assert_eq!(after.len(), goals.len() - 1);
        assert!(after.iter().all(|g| g.parent_id.as_deref() != Some(victim.as_str())));

        for (before, now) in goals.iter().filter(|g| g.id != victim).zip(&after) {
            if before.parent_id.as_deref() == Some(victim.as_str()) {
                assert_eq!(now.parent_id, removed_parent);
            } else {
                assert_eq!(now.parent_id, before.parent_id);
            }
        }
    }
}

#[test]
fn test_json_store_round_trip_through_core() {
    let dir = tempfile::tempdir().unwrap();
    let preferred = dir.path().join("vault").join("goal-tree.json");
    let fallback = dir.path().join("data").join("goal-tree.json");

    let store = Arc::new(JsonGoalStore::new(Some(preferred.clone()), fallback.clone()));
    let core = Core::new(
        store.clone(),
        Arc::new(JsonTaskStore::new(dir.path().join("data").join("tasks.json"))),
    );

    // First read seeds the preferred file
    let tree = core.goal_tree().unwrap();
    assert!(!tree.used_fallback);
    assert_eq!(tree.roots, vec!["goal-root".to_string()]);
    assert!(preferred.exists());
    assert!(!fallback.exists());

    let raw: Vec<Value> = vec![
        json!({ "id": "r", "title": "Root", "progress": 5 }),
        json!({ "id": "c", "title": "Child", "progress": "150", "parentId": "r" }),
    ];
    let saved = core.replace_goals(&raw).unwrap();
    assert_eq!(saved.progress["r"], 100.0);

    let on_disk: Value =
        serde_json::from_str(&std::fs::read_to_string(&preferred).unwrap()).unwrap();
    assert_eq!(on_disk["goals"][1]["progress"], json!(100));
    assert_eq!(on_disk["goals"][1]["parentId"], json!("r"));

    let reread = store.read().unwrap();
    assert_eq!(reread.goals, saved.goals);
}

#[test]
fn test_hand_edited_cycle_is_still_served() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("goal-tree.json");
    std::fs::write(
        &path,
        r#"{"goals":[
            {"id":"a","title":"A","progress":30,"parentId":"b"},
            {"id":"b","title":"B","progress":70,"parentId":"a"},
            {"id":"c","title":"C","progress":-50,"parentId":"a"}
        ]}"#,
    )
    .unwrap();

    let core = Core::new(
        Arc::new(JsonGoalStore::new(Some(path), dir.path().join("fallback.json"))),
        Arc::new(MemoryTaskStore::default()),
    );
    let tree = core.goal_tree().unwrap();

    assert!(tree.roots.is_empty());
    let expected: HashMap<String, f64> = [
        // a = mean(b cut back to a's own 30, c)
        ("a".to_string(), 15.0),
        // b = mean(a) where a = mean(b cut back to b's own 70, c)
        ("b".to_string(), 35.0),
        ("c".to_string(), 0.0),
    ]
    .into_iter()
    .collect();
    assert_eq!(tree.progress, expected);
}

#[tokio::test]
async fn test_core_client_task_flow() {
    let client = CoreClient::new(Core::new(
        Arc::new(MemoryGoalStore::new(example_goals())),
        Arc::new(MemoryTaskStore::default()),
    ));

    let task = client
        .create_task(NewTask {
            project_id: "alpha".to_string(),
            title: "First".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let tasks = client.list_tasks(Some("alpha")).await.unwrap();
    assert_eq!(tasks, vec![task.clone()]);

    client.delete_task(&task.id).await.unwrap();
    assert!(client.list_tasks(None).await.unwrap().is_empty());
    assert!(client.projects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_http_api_over_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let core = Core::new(
        Arc::new(JsonGoalStore::new(None, dir.path().join("goal-tree.json"))),
        Arc::new(JsonTaskStore::new(dir.path().join("tasks.json"))),
    );
    let app = router(core);

    let body = json!({ "goals": [
        { "id": "r", "title": "Root" },
        { "id": "c1", "title": "One", "progress": 40, "parentId": "r" },
        { "id": "c2", "title": "Two", "progress": 80, "parentId": "r" }
    ]});
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/goals")
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/goals")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let payload: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["data"]["progress"]["r"], json!(60.0));
    assert_eq!(payload["data"]["usedFallback"], json!(true));

    let response = app
        .oneshot(Request::builder().uri("/ui").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&bytes);
    assert!(html.contains("Root"));
    assert!(html.contains("60%"));
}
