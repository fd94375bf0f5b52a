//! Scripted mutation scenarios
//!
//! A scenario is a seed cache plus a list of mutations, each paired with the
//! answer the remote API gives. Replaying it runs every step through the
//! coordinator and reports the outcome of each and the final cache.
//!
//! ```json
//! {
//!   "entities": [{ "id": "P1", "entityType": "puzzle", "entity": { "ownerId": "C1" } }],
//!   "steps": [{
//!     "entityType": "puzzle",
//!     "request": { "op": "update", "id": "P1", "patch": { "ownerId": "C2" } },
//!     "outcome": { "ok": {} }
//!   }]
//! }
//! ```

use crate::config::EngineConfig;
use crate::graph::{Entity, Graph, GraphStore, Node, NodeId};
use crate::mutation::{
    build_graph, ApiError, ApiRegistry, ApiResponse, EntityApi, EntityPatch, MutationCoordinator, MutationRequest,
    Reconciliation,
};
use crate::schema::EntityType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the remote API answers for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Ok(ApiResponse),
    Err(ApiError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    pub entity_type: EntityType,
    pub request: MutationRequest,
    pub outcome: StepOutcome,
}

/// Seed entities and the mutations to replay against them.
///
/// Edges are derived from the entities' relationship fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub entities: Vec<Node>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn seed_graph(&self) -> Graph {
        build_graph(self.entities.iter().cloned())
    }
}

/// Outcome of one replayed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub index: usize,
    pub entity_type: EntityType,
    pub op: String,
    /// Final node id on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub graph: Graph,
}

impl ScenarioReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }
}

/// An API that answers with whatever outcome the script queued next.
#[derive(Debug)]
pub struct ScriptedApi {
    entity_type: EntityType,
    next: Arc<Mutex<Option<StepOutcome>>>,
}

impl ScriptedApi {
    fn answer(&self) -> Result<ApiResponse, ApiError> {
        let queued = self.next.lock().unwrap_or_else(PoisonError::into_inner).take();
        match queued {
            Some(StepOutcome::Ok(response)) => Ok(response),
            Some(StepOutcome::Err(error)) => Err(error),
            None => Err(ApiError::Server(format!("no scripted answer for {}", self.entity_type))),
        }
    }
}

#[async_trait]
impl EntityApi for ScriptedApi {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn create(&self, _data: &Entity) -> Result<ApiResponse, ApiError> {
        self.answer()
    }

    async fn update(&self, _id: &NodeId, _patch: &EntityPatch) -> Result<ApiResponse, ApiError> {
        self.answer()
    }

    async fn delete(&self, _id: &NodeId) -> Result<ApiResponse, ApiError> {
        self.answer()
    }
}

/// Replay every step in order against a fresh cache seeded from the scenario.
pub async fn run_scenario(scenario: &Scenario, config: EngineConfig) -> ScenarioReport {
    let next = Arc::new(Mutex::new(None));
    let mut apis = ApiRegistry::new();
    for entity_type in EntityType::ALL {
        apis.register(Arc::new(ScriptedApi {
            entity_type,
            next: Arc::clone(&next),
        }));
    }

    let store = Arc::new(GraphStore::with_event_capacity(config.event_capacity));
    let coordinator = MutationCoordinator::with_config(store, apis, config);
    coordinator.store().replace(coordinator.cache_key(), scenario.seed_graph());

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        *next.lock().unwrap_or_else(PoisonError::into_inner) = Some(step.outcome.clone());

        let mut report = StepReport {
            index,
            entity_type: step.entity_type,
            op: step.request.kind().to_string(),
            node_id: None,
            reconciled: None,
            error: None,
        };
        match coordinator.mutate(step.entity_type, step.request.clone()).await {
            Ok(outcome) => {
                report.node_id = Some(outcome.node_id);
                report.reconciled = Some(describe(&outcome.reconciled));
            }
            Err(e) => {
                tracing::debug!(step = index, error = %e, "scenario step failed");
                report.error = Some(e.to_string());
            }
        }
        steps.push(report);
    }

    ScenarioReport {
        steps,
        graph: coordinator.read(),
    }
}

fn describe(reconciled: &Reconciliation) -> String {
    match reconciled {
        Reconciliation::Delta(summary) => format!(
            "delta: {} nodes upserted, {} removed; {} edges upserted, {} removed",
            summary.nodes_upserted, summary.nodes_removed, summary.edges_upserted, summary.edges_removed
        ),
        Reconciliation::Merged => "merged".to_string(),
        Reconciliation::Removed => "removed".to_string(),
        Reconciliation::Unchanged => "unchanged".to_string(),
    }
}
