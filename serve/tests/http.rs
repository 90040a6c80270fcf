//! End-to-end HTTP tests over the router (no sockets).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use palaver::knowledge::KnowledgeStore;
use palaver::llm::MockModel;
use palaver::mcp::{McpClient, RecordingWakeupSender};
use palaver::memory::MemorySaver;
use palaver::registry::{AgentProfile, AgentRegistry};
use palaver::runtime::Runtime;
use palaver::stages::{build_pipeline, Services};
use palaver::state::PipelineReducer;
use palaver::tools::ToolKit;
use palaver::vision::{LinkAdapter, VisionAdapters, VisionService};
use palaver::wait::WaitTable;

use serve::{router, AppState};

struct StubAdapter;

#[async_trait::async_trait]
impl LinkAdapter for StubAdapter {
    async fn enrich(&self, _url: &str) -> Result<String, palaver::RuntimeError> {
        Ok("inspected".into())
    }
}

fn test_app(dir: &tempfile::TempDir) -> axum::Router {
    let wakeups = Arc::new(RecordingWakeupSender::new());
    let agent_model = Arc::new(MockModel::text("sure thing"));
    let mut agents = BTreeMap::new();
    agents.insert(
        "conversing".to_string(),
        AgentProfile {
            routing_description: "Just talks.".into(),
            memory_description: "Default agent.".into(),
            prompt: None,
            model: agent_model,
            tools: vec![],
            include: false,
        },
    );
    let services = Arc::new(Services {
        knobs: env_config::Knobs::default(),
        registry: AgentRegistry::new(agents, "conversing").unwrap(),
        decision_model: Arc::new(MockModel::text(r#"{"action": "take"}"#)),
        summarize_model: Arc::new(MockModel::text("a summary")),
        mcp: Arc::new(McpClient::new(Arc::new(ToolKit::new()), wakeups.clone())),
        vision: Arc::new(VisionService::new(
            dir.path().join("urls.json"),
            VisionAdapters::uniform(Arc::new(StubAdapter)),
        )),
        knowledge: Arc::new(KnowledgeStore::new(dir.path().join("memory.json"))),
        wakeups,
        waits: Arc::new(WaitTable::new()),
        http: reqwest_client(),
    });
    let graph = build_pipeline(services, None).unwrap();
    let runtime = Arc::new(Runtime::new(
        graph,
        Arc::new(MemorySaver::new()),
        PipelineReducer::default(),
        Arc::new(WaitTable::new()),
    ));
    router(Arc::new(AppState::new(runtime, "palaver")))
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::new()
}

/// **Scenario**: Posting a run input with a fresh human message streams the
/// agent's side channel: typing, the answer text, and the send flush.
#[tokio::test]
async fn run_streams_side_channel() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let now = chrono::Utc::now().to_rfc3339();
    let input = serde_json::json!({
        "history": {
            "current_channel": "dm-1",
            "channel_updates": {
                "dm-1": {
                    "name": "DM",
                    "new_messages": [
                        {"kind": "human", "author": "ro", "content": "hello?", "date": now}
                    ]
                }
            }
        }
    });

    let response = app
        .oneshot(
            Request::post("/threads/t1/runs")
                .header("content-type", "application/json")
                .body(Body::from(input.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("#typing#"), "got: {text}");
    assert!(text.contains("sure thing"), "got: {text}");
    assert!(text.contains("#send#"), "got: {text}");
    assert!(text.contains("#activity#conversing"), "got: {text}");
}

/// **Scenario**: The wake-up endpoint accepts immediately and is idempotent.
#[tokio::test]
async fn wakeup_accepts() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::get("/wakeup/dm-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}

/// **Scenario**: A malformed run input is rejected without touching state.
#[tokio::test]
async fn malformed_input_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let response = app
        .oneshot(
            Request::post("/threads/t1/runs")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
