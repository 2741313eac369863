use std::sync::Arc;

use chrono::Utc;
use grid_domain::{
    fingerprint, parse_state, Edge, EdgeStatus, ParsedState, StateGuid, ValidationStatus, EMPTY_FINGERPRINT,
};
use grid_store::{EdgeStore, StateStore};
use tracing::{debug, info, instrument, warn};

use crate::error::WorkerError;
use crate::registry::ProducerLockRegistry;

/// Recomputes edge digests against the output cache after a producer
/// write — the §4.6 pass that replaces the teacher's "reconcile cloud
/// resources against YAML" loop.
pub struct EdgeWorker {
    edge_store: Arc<dyn EdgeStore>,
    state_store: Arc<dyn StateStore>,
    locks: ProducerLockRegistry,
}

impl EdgeWorker {
    pub fn new(edge_store: Arc<dyn EdgeStore>, state_store: Arc<dyn StateStore>) -> Self {
        Self {
            edge_store,
            state_store,
            locks: ProducerLockRegistry::new(),
        }
    }

    /// Process one producer write: outgoing pass then incoming pass,
    /// serialized per producer via the lock registry. Callers that want
    /// fire-and-forget semantics should use [`Self::spawn`] instead.
    #[instrument(skip(self, parsed), fields(producer = %producer_guid, serial = parsed.serial))]
    pub async fn process_producer_write(
        &self,
        producer_guid: StateGuid,
        parsed: &ParsedState,
    ) -> Result<(), WorkerError> {
        let lock = self.locks.lock_for(producer_guid).await;
        let _guard = lock.lock().await;

        self.run_outgoing_pass(producer_guid, parsed).await?;
        self.run_incoming_pass(producer_guid).await?;
        Ok(())
    }

    /// Spawn [`Self::process_producer_write`] as a detached background
    /// task. Errors are logged, never propagated — the write HTTP path
    /// has already returned to the caller by the time this runs (§4.6).
    pub fn spawn(self: Arc<Self>, producer_guid: StateGuid, parsed: ParsedState) {
        tokio::spawn(async move {
            if let Err(err) = self.process_producer_write(producer_guid, &parsed).await {
                warn!(producer = %producer_guid, serial = parsed.serial, error = %err, "edge worker pass failed");
            }
        });
    }

    async fn run_outgoing_pass(
        &self,
        producer_guid: StateGuid,
        parsed: &ParsedState,
    ) -> Result<(), WorkerError> {
        let mut edges = self.edge_store.outgoing(producer_guid).await?;
        edges.sort_by_key(|e| e.id);
        debug!(count = edges.len(), "outgoing pass");

        for mut edge in edges {
            let mut changed = apply_outgoing_rule(&mut edge, parsed);
            // missing-output outranks schema-invalid (§9 precedence rule);
            // never downgrade a missing-output verdict.
            if edge.status != EdgeStatus::MissingOutput
                && edge.status != EdgeStatus::SchemaInvalid
                && self.schema_invalid(&edge).await?
            {
                edge.status = EdgeStatus::SchemaInvalid;
                edge.updated_at = Utc::now();
                changed = true;
            }
            if changed {
                self.edge_store.update(edge).await?;
            }
        }
        Ok(())
    }

    /// Does the producer's cached output for this edge currently fail
    /// validation? Overriding to `schema-invalid` wins over `dirty`/`clean`
    /// (§9's precedence rule).
    async fn schema_invalid(&self, edge: &Edge) -> Result<bool, WorkerError> {
        let cached = self
            .state_store
            .get_output_cache_entry(edge.from_state, &edge.from_output)
            .await?;
        Ok(matches!(
            cached.and_then(|c| c.validation_status),
            Some(ValidationStatus::Invalid)
        ))
    }

    async fn run_incoming_pass(&self, producer_guid: StateGuid) -> Result<(), WorkerError> {
        let mut edges = self.edge_store.incoming(producer_guid).await?;
        edges.sort_by_key(|e| e.id);
        debug!(count = edges.len(), "incoming pass");

        for mut edge in edges {
            if apply_incoming_rule(&mut edge) {
                self.edge_store.update(edge).await?;
            }
        }
        Ok(())
    }

    /// Seed a newly created edge's digest from the producer's current
    /// output cache (§4.6 "Bootstrapping"). Looks at the cache entry
    /// first; the full blob is only fetched and parsed when the cache
    /// says the output actually exists, to avoid paying a parse for an
    /// output that isn't produced at all.
    pub async fn bootstrap_edge(
        &self,
        producer_guid: StateGuid,
        from_output: &str,
    ) -> Result<(String, EdgeStatus), WorkerError> {
        let producer = match self.state_store.get_by_guid(producer_guid).await? {
            Some(s) if !s.state_content.is_empty() => s,
            _ => return Ok((EMPTY_FINGERPRINT.to_string(), EdgeStatus::Pending)),
        };

        let cached = self
            .state_store
            .get_output_cache_entry(producer_guid, from_output)
            .await?;
        if cached.is_none() {
            return Ok((EMPTY_FINGERPRINT.to_string(), EdgeStatus::MissingOutput));
        }

        let parsed = parse_state(&producer.state_content)?;
        match parsed.outputs.get(from_output) {
            Some(out) => {
                let digest = fingerprint(&out.value);
                info!(producer = %producer_guid, output = from_output, "bootstrapped edge from existing producer state");
                Ok((digest, EdgeStatus::Dirty))
            }
            None => Ok((EMPTY_FINGERPRINT.to_string(), EdgeStatus::MissingOutput)),
        }
    }
}

/// Apply the outgoing-pass rule (§4.6) to one edge. Returns `true` if
/// the edge was mutated and needs to be persisted.
fn apply_outgoing_rule(edge: &mut Edge, parsed: &ParsedState) -> bool {
    let now = Utc::now();

    let Some(out) = parsed.outputs.get(&edge.from_output) else {
        if edge.status == EdgeStatus::MissingOutput && edge.in_digest.is_empty() {
            return false;
        }
        if edge.status == EdgeStatus::Mock {
            edge.mock_value = None;
        }
        edge.status = EdgeStatus::MissingOutput;
        edge.in_digest = EMPTY_FINGERPRINT.to_string();
        edge.updated_at = now;
        return true;
    };

    let d = fingerprint(&out.value);
    if d == EMPTY_FINGERPRINT {
        return false;
    }

    let was_mock = edge.status == EdgeStatus::Mock;
    if edge.in_digest == d && !was_mock {
        return false;
    }

    edge.in_digest = d.clone();
    edge.last_in_at = Some(now);
    edge.status = if edge.out_digest == d {
        EdgeStatus::Clean
    } else {
        EdgeStatus::Dirty
    };
    if was_mock {
        edge.mock_value = None;
    }
    edge.updated_at = now;
    true
}

/// Apply the incoming-pass rule (§4.6) to one edge. Returns `true` if
/// the edge was mutated and needs to be persisted.
fn apply_incoming_rule(edge: &mut Edge) -> bool {
    if edge.in_digest.is_empty() || edge.in_digest == edge.out_digest {
        return false;
    }
    let now = Utc::now();
    edge.out_digest = edge.in_digest.clone();
    edge.last_out_at = Some(now);
    edge.status = EdgeStatus::Clean;
    edge.updated_at = now;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_domain::EdgeId;
    use grid_store::{InMemoryStore, NewEdge};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn guid() -> StateGuid {
        StateGuid::new(Uuid::now_v7())
    }

    fn edge_fixture(id: i64, from_output: &str, status: EdgeStatus) -> Edge {
        let now = Utc::now();
        Edge {
            id: EdgeId(id),
            from_state: guid(),
            from_output: from_output.to_string(),
            to_state: guid(),
            to_input_name: "in".to_string(),
            status,
            in_digest: String::new(),
            out_digest: String::new(),
            mock_value: None,
            last_in_at: None,
            last_out_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn parsed_with(key: &str, value: &str) -> ParsedState {
        let mut outputs = HashMap::new();
        outputs.insert(
            key.to_string(),
            grid_domain::ParsedOutput {
                value: grid_domain::Value::String(value.to_string()),
                sensitive: false,
            },
        );
        ParsedState { serial: 1, outputs }
    }

    #[test]
    fn outgoing_rule_marks_missing_output() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Pending);
        let parsed = ParsedState { serial: 1, outputs: HashMap::new() };
        assert!(apply_outgoing_rule(&mut edge, &parsed));
        assert_eq!(edge.status, EdgeStatus::MissingOutput);
        assert_eq!(edge.in_digest, "");
    }

    #[test]
    fn outgoing_rule_sets_dirty_on_new_digest() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Pending);
        let parsed = parsed_with("vpc_id", "vpc-1");
        assert!(apply_outgoing_rule(&mut edge, &parsed));
        assert_eq!(edge.status, EdgeStatus::Dirty);
        assert!(!edge.in_digest.is_empty());
        assert!(edge.last_in_at.is_some());
    }

    #[test]
    fn outgoing_rule_sets_clean_when_out_digest_already_matches() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Dirty);
        let parsed = parsed_with("vpc_id", "vpc-1");
        let digest = fingerprint(&grid_domain::Value::String("vpc-1".to_string()));
        edge.out_digest = digest;
        assert!(apply_outgoing_rule(&mut edge, &parsed));
        assert_eq!(edge.status, EdgeStatus::Clean);
    }

    #[test]
    fn outgoing_rule_clears_mock_on_real_value() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Mock);
        edge.mock_value = Some(b"vpc-mock".to_vec());
        let parsed = parsed_with("vpc_id", "vpc-1");
        assert!(apply_outgoing_rule(&mut edge, &parsed));
        assert_eq!(edge.status, EdgeStatus::Dirty);
        assert!(edge.mock_value.is_none());
    }

    #[test]
    fn outgoing_rule_clears_mock_value_on_missing_output() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Mock);
        edge.mock_value = Some(b"vpc-mock".to_vec());
        let parsed = ParsedState { serial: 1, outputs: HashMap::new() };
        assert!(apply_outgoing_rule(&mut edge, &parsed));
        assert_eq!(edge.status, EdgeStatus::MissingOutput);
        assert_eq!(edge.in_digest, "");
        assert!(edge.mock_value.is_none());
    }

    #[test]
    fn outgoing_rule_is_noop_when_digest_unchanged_and_not_mock() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Clean);
        let digest = fingerprint(&grid_domain::Value::String("vpc-1".to_string()));
        edge.in_digest = digest.clone();
        edge.out_digest = digest;
        let parsed = parsed_with("vpc_id", "vpc-1");
        assert!(!apply_outgoing_rule(&mut edge, &parsed));
    }

    #[test]
    fn incoming_rule_promotes_to_clean_when_observed() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Dirty);
        edge.in_digest = "abc".to_string();
        edge.out_digest = String::new();
        assert!(apply_incoming_rule(&mut edge));
        assert_eq!(edge.status, EdgeStatus::Clean);
        assert_eq!(edge.out_digest, "abc");
        assert!(edge.last_out_at.is_some());
    }

    #[test]
    fn incoming_rule_is_noop_when_already_observed() {
        let mut edge = edge_fixture(1, "vpc_id", EdgeStatus::Clean);
        edge.in_digest = "abc".to_string();
        edge.out_digest = "abc".to_string();
        assert!(!apply_incoming_rule(&mut edge));
    }

    #[tokio::test]
    async fn end_to_end_outgoing_then_incoming_observation() {
        let store = Arc::new(InMemoryStore::new());
        let producer = guid();
        let consumer = guid();
        StateStore::create(store.as_ref(), producer, "p").await.unwrap();
        StateStore::create(store.as_ref(), consumer, "c").await.unwrap();

        let edge = EdgeStore::create(
            store.as_ref(),
            NewEdge {
                from_state: producer,
                from_output: "vpc_id".into(),
                to_state: consumer,
                to_input_name: "p_vpc_id".into(),
                status: EdgeStatus::Pending,
                in_digest: String::new(),
                mock_value: None,
            },
        )
        .await
        .unwrap();

        let worker = EdgeWorker::new(store.clone() as Arc<dyn EdgeStore>, store.clone() as Arc<dyn StateStore>);

        let outcome = store
            .update_content_and_refresh_outputs(
                producer,
                br#"{"serial": 1, "outputs": {"vpc_id": {"value": "vpc-1", "sensitive": false}}}"#.to_vec(),
                None,
            )
            .await
            .unwrap();
        worker.process_producer_write(producer, &outcome.parsed).await.unwrap();

        let after = EdgeStore::get(store.as_ref(), edge.id).await.unwrap().unwrap();
        assert_eq!(after.status, EdgeStatus::Dirty);
        assert_eq!(after.out_digest, "");

        // Consumer's own write lets the worker's incoming pass observe
        // the producer's digest and flip the edge to clean.
        let consumer_outcome = store
            .update_content_and_refresh_outputs(
                consumer,
                br#"{"serial": 1, "outputs": {}}"#.to_vec(),
                None,
            )
            .await
            .unwrap();
        worker.process_producer_write(consumer, &consumer_outcome.parsed).await.unwrap();

        let after = EdgeStore::get(store.as_ref(), edge.id).await.unwrap().unwrap();
        assert_eq!(after.status, EdgeStatus::Clean);
        assert_eq!(after.out_digest, after.in_digest);
    }

    #[tokio::test]
    async fn bootstrap_seeds_dirty_when_producer_already_has_state() {
        let store = Arc::new(InMemoryStore::new());
        let producer = guid();
        StateStore::create(store.as_ref(), producer, "p").await.unwrap();
        store
            .update_content_and_refresh_outputs(
                producer,
                br#"{"serial": 1, "outputs": {"vpc_id": {"value": "vpc-1", "sensitive": false}}}"#.to_vec(),
                None,
            )
            .await
            .unwrap();

        let worker = EdgeWorker::new(store.clone() as Arc<dyn EdgeStore>, store.clone() as Arc<dyn StateStore>);
        let (digest, status) = worker.bootstrap_edge(producer, "vpc_id").await.unwrap();
        assert_eq!(status, EdgeStatus::Dirty);
        assert!(!digest.is_empty());
    }

    #[tokio::test]
    async fn bootstrap_is_missing_output_when_producer_has_state_but_not_this_key() {
        let store = Arc::new(InMemoryStore::new());
        let producer = guid();
        StateStore::create(store.as_ref(), producer, "p").await.unwrap();
        store
            .update_content_and_refresh_outputs(producer, br#"{"serial": 1, "outputs": {}}"#.to_vec(), None)
            .await
            .unwrap();

        let worker = EdgeWorker::new(store.clone() as Arc<dyn EdgeStore>, store.clone() as Arc<dyn StateStore>);
        let (digest, status) = worker.bootstrap_edge(producer, "vpc_id").await.unwrap();
        assert_eq!(status, EdgeStatus::MissingOutput);
        assert_eq!(digest, "");
    }

    #[tokio::test]
    async fn bootstrap_is_pending_when_producer_has_no_committed_state() {
        let store = Arc::new(InMemoryStore::new());
        let producer = guid();
        StateStore::create(store.as_ref(), producer, "p").await.unwrap();

        let worker = EdgeWorker::new(store.clone() as Arc<dyn EdgeStore>, store.clone() as Arc<dyn StateStore>);
        let (digest, status) = worker.bootstrap_edge(producer, "vpc_id").await.unwrap();
        assert_eq!(status, EdgeStatus::Pending);
        assert_eq!(digest, "");
    }
}
