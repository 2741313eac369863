use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use grid_domain::{parse_state, Edge, EdgeId, Labels, LockInfo, OutputCacheEntry, State, StateGuid};
use grid_graph::DepGraph;

use crate::error::StoreError;
use crate::state::plan_cache_refresh;
use crate::store::{
    EdgeStore, EdgeWithProducer, LabelOp, LabelPredicate, NewEdge, StateFilter, StateStore, WriteOutcome,
};

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<StateGuid, State>,
    logic_ids: HashMap<String, StateGuid>,
    edges: HashMap<EdgeId, Edge>,
    next_edge_id: i64,
    output_cache: HashMap<StateGuid, Vec<OutputCacheEntry>>,
}

impl Inner {
    fn cascade_delete(&mut self, guid: StateGuid) {
        self.edges.retain(|_, e| e.from_state != guid && e.to_state != guid);
        self.output_cache.remove(&guid);
    }

    fn all_state_guids(&self) -> Vec<StateGuid> {
        self.states.keys().copied().collect()
    }
}

/// In-memory implementation of [`StateStore`] and [`EdgeStore`], guarded
/// by a single `RwLock`. All data is lost on process exit — suitable
/// for tests and local runs, per §4.3's concurrency note that the
/// in-memory backend uses a critical section rather than a database
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn create(&self, guid: StateGuid, logic_id: &str) -> Result<State, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.logic_ids.contains_key(logic_id) {
            return Err(StoreError::DuplicateLogicId(logic_id.to_string()));
        }
        let state = State::new(guid, logic_id, Utc::now());
        guard.logic_ids.insert(logic_id.to_string(), guid);
        guard.states.insert(guid, state.clone());
        Ok(state)
    }

    async fn get_by_guid(&self, guid: StateGuid) -> Result<Option<State>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.states.get(&guid).cloned())
    }

    async fn get_by_logic_id(&self, logic_id: &str) -> Result<Option<State>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .logic_ids
            .get(logic_id)
            .and_then(|guid| guard.states.get(guid))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<State>, StoreError> {
        let guard = self.inner.read().await;
        let mut states: Vec<State> = guard.states.values().cloned().collect();
        states.sort_by(|a, b| a.guid.cmp(&b.guid));
        Ok(states)
    }

    async fn list_filtered(&self, filter: &StateFilter) -> Result<Vec<State>, StoreError> {
        let guard = self.inner.read().await;
        let mut states: Vec<State> = guard
            .states
            .values()
            .filter(|s| filter.matches(&s.labels))
            .cloned()
            .collect();
        states.sort_by(|a, b| a.guid.cmp(&b.guid));
        Ok(states)
    }

    async fn update_labels(&self, guid: StateGuid, labels: Labels) -> Result<State, StoreError> {
        let mut guard = self.inner.write().await;
        let state = guard
            .states
            .get_mut(&guid)
            .ok_or_else(|| StoreError::StateNotFound(guid.to_string()))?;
        state.labels = labels;
        state.updated_at = Utc::now();
        Ok(state.clone())
    }

    async fn delete(&self, guid: StateGuid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let state = guard
            .states
            .remove(&guid)
            .ok_or_else(|| StoreError::StateNotFound(guid.to_string()))?;
        guard.logic_ids.remove(&state.logic_id);
        guard.cascade_delete(guid);
        Ok(())
    }

    async fn lock(&self, guid: StateGuid, lock_info: LockInfo) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let state = guard
            .states
            .get_mut(&guid)
            .ok_or_else(|| StoreError::StateNotFound(guid.to_string()))?;
        if state.locked {
            return Err(StoreError::Locked(guid));
        }
        state.locked = true;
        state.lock_info = Some(lock_info);
        state.updated_at = Utc::now();
        Ok(())
    }

    async fn unlock(&self, guid: StateGuid, lock_id: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let state = guard
            .states
            .get_mut(&guid)
            .ok_or_else(|| StoreError::StateNotFound(guid.to_string()))?;
        if !state.locked {
            return Err(StoreError::NotLocked(guid));
        }
        let holder = state.lock_info.as_ref().map(|l| l.id.as_str()).unwrap_or("");
        if holder != lock_id {
            return Err(StoreError::LockIdMismatch(guid));
        }
        state.locked = false;
        state.lock_info = None;
        state.updated_at = Utc::now();
        Ok(())
    }

    async fn force_unlock(&self, guid: StateGuid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let state = guard
            .states
            .get_mut(&guid)
            .ok_or_else(|| StoreError::StateNotFound(guid.to_string()))?;
        state.locked = false;
        state.lock_info = None;
        state.updated_at = Utc::now();
        Ok(())
    }

    async fn update_content_and_refresh_outputs(
        &self,
        guid: StateGuid,
        new_blob: Vec<u8>,
        supplied_lock_id: Option<&str>,
    ) -> Result<WriteOutcome, StoreError> {
        let mut guard = self.inner.write().await;

        {
            let state = guard
                .states
                .get(&guid)
                .ok_or_else(|| StoreError::StateNotFound(guid.to_string()))?;
            if state.locked {
                let holder = state.lock_info.as_ref().map(|l| l.id.as_str()).unwrap_or("");
                if supplied_lock_id != Some(holder) {
                    return Err(StoreError::Locked(guid));
                }
            }
        }

        let parsed = parse_state(&new_blob)?;
        let now = Utc::now();

        let state = guard
            .states
            .get_mut(&guid)
            .ok_or_else(|| StoreError::StateNotFound(guid.to_string()))?;
        state.state_content = new_blob;
        state.updated_at = now;
        let updated_state = state.clone();

        let existing = guard.output_cache.get(&guid).cloned().unwrap_or_default();
        let plan = plan_cache_refresh(guid, &existing, &parsed, now);

        let mut next_cache: Vec<OutputCacheEntry> = existing
            .into_iter()
            .filter(|e| !plan.delete_keys.contains(&e.output_key))
            .filter(|e| !plan.upserts.iter().any(|u| u.output_key == e.output_key))
            .collect();
        next_cache.extend(plan.upserts.iter().cloned());
        guard.output_cache.insert(guid, next_cache);

        Ok(WriteOutcome { state: updated_state, parsed })
    }

    async fn output_cache(&self, guid: StateGuid) -> Result<Vec<OutputCacheEntry>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.output_cache.get(&guid).cloned().unwrap_or_default())
    }

    async fn get_output_cache_entry(
        &self,
        guid: StateGuid,
        output_key: &str,
    ) -> Result<Option<OutputCacheEntry>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .output_cache
            .get(&guid)
            .and_then(|rows| rows.iter().find(|e| e.output_key == output_key))
            .cloned())
    }

    async fn set_output_schema(
        &self,
        guid: StateGuid,
        output_key: &str,
        schema_json: serde_json::Value,
    ) -> Result<OutputCacheEntry, StoreError> {
        let mut guard = self.inner.write().await;
        let now = Utc::now();
        let rows = guard.output_cache.entry(guid).or_default();
        if let Some(existing) = rows.iter_mut().find(|e| e.output_key == output_key) {
            existing.schema_json = Some(schema_json);
            existing.schema_source = Some(grid_domain::SchemaSource::Manual);
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let entry = OutputCacheEntry {
            state_guid: guid,
            output_key: output_key.to_string(),
            sensitive: false,
            state_serial: 0,
            schema_json: Some(schema_json),
            schema_source: Some(grid_domain::SchemaSource::Manual),
            validation_status: None,
            validation_error: None,
            validated_at: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl EdgeStore for InMemoryStore {
    async fn create(&self, new_edge: NewEdge) -> Result<Edge, StoreError> {
        let mut guard = self.inner.write().await;

        if new_edge.from_state == new_edge.to_state {
            return Err(StoreError::CycleDetected {
                from: new_edge.from_state,
                to: new_edge.to_state,
            });
        }

        if guard.edges.values().any(|e| {
            e.from_state == new_edge.from_state
                && e.from_output == new_edge.from_output
                && e.to_state == new_edge.to_state
        }) {
            return Err(StoreError::DuplicateEdge {
                from_state: new_edge.from_state,
                from_output: new_edge.from_output,
                to_state: new_edge.to_state,
            });
        }

        if guard
            .edges
            .values()
            .any(|e| e.to_state == new_edge.to_state && e.to_input_name == new_edge.to_input_name)
        {
            return Err(StoreError::AliasConflict {
                to_state: new_edge.to_state,
                alias: new_edge.to_input_name,
            });
        }

        let graph = DepGraph::build(
            &guard.edges.values().cloned().collect::<Vec<_>>(),
            &guard.all_state_guids(),
        );
        if graph.would_create_cycle(new_edge.from_state, new_edge.to_state) {
            return Err(StoreError::CycleDetected {
                from: new_edge.from_state,
                to: new_edge.to_state,
            });
        }

        let now = Utc::now();
        guard.next_edge_id += 1;
        let id = EdgeId(guard.next_edge_id);
        let edge = Edge {
            id,
            from_state: new_edge.from_state,
            from_output: new_edge.from_output,
            to_state: new_edge.to_state,
            to_input_name: new_edge.to_input_name,
            status: new_edge.status,
            in_digest: new_edge.in_digest,
            out_digest: String::new(),
            mock_value: new_edge.mock_value,
            last_in_at: None,
            last_out_at: None,
            created_at: now,
            updated_at: now,
        };
        guard.edges.insert(id, edge.clone());
        Ok(edge)
    }

    async fn get(&self, id: EdgeId) -> Result<Option<Edge>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.edges.get(&id).cloned())
    }

    async fn update(&self, edge: Edge) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.edges.contains_key(&edge.id) {
            return Err(StoreError::EdgeNotFound(edge.id));
        }
        guard.edges.insert(edge.id, edge);
        Ok(())
    }

    async fn delete(&self, id: EdgeId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .edges
            .remove(&id)
            .ok_or(StoreError::EdgeNotFound(id))?;
        Ok(())
    }

    async fn outgoing(&self, producer: StateGuid) -> Result<Vec<Edge>, StoreError> {
        let guard = self.inner.read().await;
        let mut edges: Vec<Edge> = guard
            .edges
            .values()
            .filter(|e| e.from_state == producer)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn incoming(&self, consumer: StateGuid) -> Result<Vec<Edge>, StoreError> {
        let guard = self.inner.read().await;
        let mut edges: Vec<Edge> = guard
            .edges
            .values()
            .filter(|e| e.to_state == consumer)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn by_output(&self, output_name: &str) -> Result<Vec<Edge>, StoreError> {
        let guard = self.inner.read().await;
        let mut edges: Vec<Edge> = guard
            .edges
            .values()
            .filter(|e| e.from_output == output_name)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn all(&self) -> Result<Vec<Edge>, StoreError> {
        let guard = self.inner.read().await;
        let mut edges: Vec<Edge> = guard.edges.values().cloned().collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn would_create_cycle(&self, from: StateGuid, to: StateGuid) -> Result<bool, StoreError> {
        let guard = self.inner.read().await;
        let graph = DepGraph::build(
            &guard.edges.values().cloned().collect::<Vec<_>>(),
            &guard.all_state_guids(),
        );
        Ok(graph.would_create_cycle(from, to))
    }

    async fn incoming_with_producers(&self, consumer: StateGuid) -> Result<Vec<EdgeWithProducer>, StoreError> {
        let guard = self.inner.read().await;
        let mut edges: Vec<Edge> = guard
            .edges
            .values()
            .filter(|e| e.to_state == consumer)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.id);

        edges
            .into_iter()
            .map(|edge| {
                let producer = guard
                    .states
                    .get(&edge.from_state)
                    .cloned()
                    .ok_or_else(|| StoreError::StateNotFound(edge.from_state.to_string()))?;
                let producer_output = guard
                    .output_cache
                    .get(&edge.from_state)
                    .and_then(|rows| rows.iter().find(|o| o.output_key == edge.from_output))
                    .cloned();
                Ok(EdgeWithProducer { edge, producer, producer_output })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn guid() -> StateGuid {
        StateGuid::new(Uuid::now_v7())
    }

    #[tokio::test]
    async fn create_and_get_by_guid_and_logic_id() {
        let store = InMemoryStore::new();
        let g = guid();
        store.create(g, "producer").await.unwrap();

        assert!(store.get_by_guid(g).await.unwrap().is_some());
        assert_eq!(store.get_by_logic_id("producer").await.unwrap().unwrap().guid, g);
    }

    #[tokio::test]
    async fn duplicate_logic_id_rejected() {
        let store = InMemoryStore::new();
        store.create(guid(), "dup").await.unwrap();
        let err = store.create(guid(), "dup").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateLogicId(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_edges_and_cache() {
        let store = InMemoryStore::new();
        let producer = guid();
        let consumer = guid();
        store.create(producer, "p").await.unwrap();
        store.create(consumer, "c").await.unwrap();

        EdgeStore::create(
            &store,
            NewEdge {
                from_state: producer,
                from_output: "vpc_id".into(),
                to_state: consumer,
                to_input_name: "p_vpc_id".into(),
                status: grid_domain::EdgeStatus::Pending,
                in_digest: String::new(),
                mock_value: None,
            },
        )
        .await
        .unwrap();

        StateStore::delete(&store, producer).await.unwrap();
        let remaining = EdgeStore::all(&store).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn lock_then_unlock_roundtrip() {
        let store = InMemoryStore::new();
        let g = guid();
        store.create(g, "lockable").await.unwrap();

        let info = LockInfo {
            id: "lock-1".into(),
            operation: "apply".into(),
            who: "tester".into(),
            created_at: Utc::now(),
            path: "tfstate/lockable".into(),
        };
        store.lock(g, info.clone()).await.unwrap();

        let err = store.lock(g, info.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::Locked(_)));

        let err = store.unlock(g, "wrong").await.unwrap_err();
        assert!(matches!(err, StoreError::LockIdMismatch(_)));

        store.unlock(g, "lock-1").await.unwrap();
        assert!(!store.get_by_guid(g).await.unwrap().unwrap().locked);
    }

    #[tokio::test]
    async fn write_path_refreshes_output_cache_and_drops_stale_keys() {
        let store = InMemoryStore::new();
        let g = guid();
        store.create(g, "producer").await.unwrap();

        let blob = br#"{"serial": 1, "outputs": {"vpc_id": {"value": "vpc-1", "sensitive": false}}}"#.to_vec();
        let outcome = store
            .update_content_and_refresh_outputs(g, blob, None)
            .await
            .unwrap();
        assert_eq!(outcome.parsed.serial, 1);
        let cache = store.output_cache(g).await.unwrap();
        assert_eq!(cache.len(), 1);

        let blob2 = br#"{"serial": 2, "outputs": {}}"#.to_vec();
        store
            .update_content_and_refresh_outputs(g, blob2, None)
            .await
            .unwrap();
        let cache = store.output_cache(g).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn incoming_with_producers_joins_producer_state_and_output_cache() {
        let store = InMemoryStore::new();
        let producer = guid();
        let consumer = guid();
        store.create(producer, "producer").await.unwrap();
        store.create(consumer, "consumer").await.unwrap();

        EdgeStore::create(
            &store,
            NewEdge {
                from_state: producer,
                from_output: "vpc_id".into(),
                to_state: consumer,
                to_input_name: "p_vpc_id".into(),
                status: grid_domain::EdgeStatus::Pending,
                in_digest: String::new(),
                mock_value: None,
            },
        )
        .await
        .unwrap();

        store
            .update_content_and_refresh_outputs(
                producer,
                br#"{"serial": 1, "outputs": {"vpc_id": {"value": "vpc-1", "sensitive": false}}}"#.to_vec(),
                None,
            )
            .await
            .unwrap();

        let joined = store.incoming_with_producers(consumer).await.unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].producer.logic_id, "producer");
        assert_eq!(joined[0].producer_output.as_ref().unwrap().output_key, "vpc_id");
    }

    #[tokio::test]
    async fn would_create_cycle_detects_reverse_path() {
        let store = InMemoryStore::new();
        let a = guid();
        let b = guid();
        store.create(a, "a").await.unwrap();
        store.create(b, "b").await.unwrap();

        EdgeStore::create(
            &store,
            NewEdge {
                from_state: a,
                from_output: "o".into(),
                to_state: b,
                to_input_name: "a_o".into(),
                status: grid_domain::EdgeStatus::Pending,
                in_digest: String::new(),
                mock_value: None,
            },
        )
        .await
        .unwrap();

        let err = EdgeStore::create(
            &store,
            NewEdge {
                from_state: b,
                from_output: "o".into(),
                to_state: a,
                to_input_name: "b_o".into(),
                status: grid_domain::EdgeStatus::Pending,
                in_digest: String::new(),
                mock_value: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { .. }));
    }
}
