//! Shared stage-test fixtures: a full service container over mocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use env_config::Knobs;

use super::Services;
use crate::error::RuntimeError;
use crate::knowledge::KnowledgeStore;
use crate::llm::{ChatModel, MockModel};
use crate::mcp::{McpClient, RecordingWakeupSender};
use crate::registry::{AgentProfile, AgentRegistry};
use crate::tools::{Tool, ToolKit};
use crate::vision::{LinkAdapter, VisionAdapters, VisionService};
use crate::wait::WaitTable;

/// Keeps the temp directory (stores live in it) and the wake-up recorder
/// alive for the duration of a test.
pub(crate) struct TestEnv {
    pub wakeups: Arc<RecordingWakeupSender>,
    #[allow(dead_code)]
    dir: tempfile::TempDir,
}

/// Adapter answering every URL with a fixed tag.
struct StaticAdapter(&'static str);

#[async_trait]
impl LinkAdapter for StaticAdapter {
    async fn enrich(&self, _url: &str) -> Result<String, RuntimeError> {
        Ok(self.0.to_string())
    }
}

/// Overrides for [`test_services_with`]. Unset fields use mocks.
#[derive(Default)]
pub(crate) struct ServicesTuning {
    pub decision_model: Option<Arc<dyn ChatModel>>,
    pub agent_model: Option<Arc<dyn ChatModel>>,
    pub summarize_model: Option<Arc<dyn ChatModel>>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub knobs: Option<Knobs>,
}

pub(crate) fn test_services_with(tuning: ServicesTuning) -> (Arc<Services>, TestEnv) {
    let dir = tempfile::tempdir().expect("tempdir");
    let wakeups = Arc::new(RecordingWakeupSender::new());

    let decision_model = tuning
        .decision_model
        .unwrap_or_else(|| Arc::new(MockModel::text(r#"{"action": "take"}"#)));
    let agent_model = tuning
        .agent_model
        .unwrap_or_else(|| Arc::new(MockModel::text("hello there")));
    let summarize_model = tuning
        .summarize_model
        .unwrap_or_else(|| Arc::new(MockModel::text("a summary")));

    let mut toolkit = ToolKit::new();
    for tool in tuning.tools {
        toolkit.register(tool);
    }
    let toolkit = Arc::new(toolkit);

    let mut agents = BTreeMap::new();
    agents.insert(
        "conversing".to_string(),
        AgentProfile {
            routing_description: "Just talks.".into(),
            memory_description: "Default agent.".into(),
            prompt: None,
            model: agent_model.clone(),
            tools: toolkit.names().map(str::to_string).collect(),
            include: false,
        },
    );
    agents.insert(
        "debug".to_string(),
        AgentProfile {
            routing_description: "Runs the diagnostic tools.".into(),
            memory_description: "Can run diagnostics.".into(),
            prompt: Some("Prefer terse answers.".into()),
            model: agent_model,
            tools: vec![],
            include: true,
        },
    );
    let registry = AgentRegistry::new(agents, "conversing").expect("default registered");

    let services = Arc::new(Services {
        knobs: tuning.knobs.unwrap_or_default(),
        registry,
        decision_model,
        summarize_model,
        mcp: Arc::new(McpClient::new(toolkit, wakeups.clone())),
        vision: Arc::new(VisionService::new(
            dir.path().join("url_cache.json"),
            VisionAdapters::uniform(Arc::new(StaticAdapter("inspected"))),
        )),
        knowledge: Arc::new(KnowledgeStore::new(dir.path().join("memory.json"))),
        wakeups: wakeups.clone(),
        waits: Arc::new(WaitTable::new()),
        http: reqwest::Client::new(),
    });
    (services, TestEnv { wakeups, dir })
}

pub(crate) fn test_services() -> (Arc<Services>, TestEnv) {
    test_services_with(ServicesTuning::default())
}
