use std::collections::HashSet;
use std::sync::Arc;

use grid_domain::{slug, Edge, EdgeId, EdgeStatus, StateGuid, StateRef};
use grid_graph::{state_status as rollup_state_status, DepGraph, Direction, Layer, StateStatus};
use grid_store::{EdgeStore, NewEdge, StateStore, StoreError};
use grid_worker::EdgeWorker;

use crate::error::ServiceError;
use crate::types::{AddDependencyOutcome, DependencyGraph, ProducerRef};

/// Orchestrates the dependency graph's read and write operations (C7).
/// Unlike the worker's single pipeline, each method here is an
/// independent entry point — `add_dependency`, `remove_dependency`, the
/// various list/search projections, and the graph/status queries all
/// stand alone rather than compose into one end-to-end flow.
pub struct DependencyService {
    states: Arc<dyn StateStore>,
    edges: Arc<dyn EdgeStore>,
    worker: Arc<EdgeWorker>,
}

impl DependencyService {
    pub fn new(states: Arc<dyn StateStore>, edges: Arc<dyn EdgeStore>, worker: Arc<EdgeWorker>) -> Self {
        Self { states, edges, worker }
    }

    async fn resolve(&self, state_ref: &StateRef) -> Result<grid_domain::State, ServiceError> {
        let found = match state_ref {
            StateRef::Guid(guid) => self.states.get_by_guid(*guid).await?,
            StateRef::LogicId(logic_id) => self.states.get_by_logic_id(logic_id).await?,
        };
        found.ok_or_else(|| ServiceError::StateNotFound(state_ref.to_string()))
    }

    /// §4.7 `add_dependency`. Idempotent on `(from_state, from_output,
    /// to_state)`; resolves references, defaults the alias via the slug
    /// rule, pre-checks acyclicity, and seeds the edge's digest from
    /// any state the producer already has committed.
    pub async fn add_dependency(
        &self,
        from_ref: &StateRef,
        from_output: &str,
        to_ref: &StateRef,
        to_input_name: Option<String>,
        mock_value: Option<Vec<u8>>,
    ) -> Result<AddDependencyOutcome, ServiceError> {
        let producer = self.resolve(from_ref).await?;
        let consumer = self.resolve(to_ref).await?;

        let existing = self.edges.outgoing(producer.guid).await?;
        if let Some(edge) = existing
            .into_iter()
            .find(|e| e.from_output == from_output && e.to_state == consumer.guid)
        {
            return Ok(AddDependencyOutcome { edge, already_exists: true });
        }

        let alias = to_input_name.unwrap_or_else(|| {
            format!("{}_{}", slug(&producer.logic_id), slug(from_output))
        });

        if self.edges.would_create_cycle(producer.guid, consumer.guid).await? {
            return Err(StoreError::CycleDetected { from: producer.guid, to: consumer.guid }.into());
        }

        let (status, in_digest) = match &mock_value {
            Some(_) => (EdgeStatus::Mock, String::new()),
            None => {
                let (digest, status) = self.worker.bootstrap_edge(producer.guid, from_output).await?;
                (status, digest)
            }
        };

        let edge = self
            .edges
            .create(NewEdge {
                from_state: producer.guid,
                from_output: from_output.to_string(),
                to_state: consumer.guid,
                to_input_name: alias,
                status,
                in_digest,
                mock_value,
            })
            .await?;

        Ok(AddDependencyOutcome { edge, already_exists: false })
    }

    pub async fn remove_dependency(&self, edge_id: EdgeId) -> Result<(), ServiceError> {
        self.edges.delete(edge_id).await?;
        Ok(())
    }

    pub async fn list_dependencies(&self, consumer_ref: &StateRef) -> Result<Vec<Edge>, ServiceError> {
        let consumer = self.resolve(consumer_ref).await?;
        Ok(self.edges.incoming(consumer.guid).await?)
    }

    pub async fn list_dependents(&self, producer_ref: &StateRef) -> Result<Vec<Edge>, ServiceError> {
        let producer = self.resolve(producer_ref).await?;
        Ok(self.edges.outgoing(producer.guid).await?)
    }

    pub async fn search_by_output(&self, output_name: &str) -> Result<Vec<Edge>, ServiceError> {
        Ok(self.edges.by_output(output_name).await?)
    }

    pub async fn list_all_edges(&self) -> Result<Vec<Edge>, ServiceError> {
        Ok(self.edges.all().await?)
    }

    /// §4.5 topological layering, materialized from a fresh edge/state
    /// snapshot (the engine never persists its output).
    pub async fn topological_order(
        &self,
        root_ref: &StateRef,
        direction: Direction,
    ) -> Result<Vec<Layer>, ServiceError> {
        let root = self.resolve(root_ref).await?;
        let all_edges = self.edges.all().await?;
        let all_states: Vec<StateGuid> = self.states.list().await?.into_iter().map(|s| s.guid).collect();
        let graph = DepGraph::build(&all_edges, &all_states);
        Ok(graph.topological_layers(root.guid, direction)?)
    }

    /// §4.5 state-status rollup over a fresh edge snapshot.
    pub async fn state_status(&self, state_ref: &StateRef) -> Result<StateStatus, ServiceError> {
        let root = self.resolve(state_ref).await?;
        let all_edges = self.edges.all().await?;
        let logic_ids = self
            .states
            .list()
            .await?
            .into_iter()
            .map(|s| (s.guid, s.logic_id))
            .collect();
        Ok(rollup_state_status(root.guid, &all_edges, &logic_ids))
    }

    /// §4.7 `dependency_graph` — the materialization-oriented view the
    /// renderer (C9) consumes. Uses the edge store's eager-load join
    /// (§4.2) rather than one `get_by_guid` per distinct producer, so
    /// this is a single consistent snapshot read regardless of how many
    /// producers feed the consumer.
    pub async fn dependency_graph(&self, consumer_ref: &StateRef) -> Result<DependencyGraph, ServiceError> {
        let consumer = self.resolve(consumer_ref).await?;
        let joined = self.edges.incoming_with_producers(consumer.guid).await?;

        let mut seen = HashSet::new();
        let mut producers = Vec::new();
        let mut edges = Vec::with_capacity(joined.len());
        for row in joined {
            if seen.insert(row.producer.guid) {
                producers.push(ProducerRef { guid: row.producer.guid, logic_id: row.producer.logic_id });
            }
            edges.push(row.edge);
        }
        producers.sort_by(|a, b| a.logic_id.cmp(&b.logic_id));

        Ok(DependencyGraph { consumer: consumer.guid, producers, edges })
    }
}
