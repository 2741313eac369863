use async_trait::async_trait;

use grid_domain::{Edge, EdgeId, EdgeStatus, LabelValue, Labels, LockInfo, OutputCacheEntry, State, StateGuid};

use crate::error::StoreError;

/// Bundle returned by `update_content_and_refresh_outputs` (§4.3 step 5):
/// the updated row plus the parsed outputs, so the caller can schedule
/// the edge-status worker without re-parsing the blob.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub state: State,
    pub parsed: grid_domain::ParsedState,
}

/// A single label-equality test used to build a [`StateFilter`].
///
/// Only equality is supported today — the distilled contract calls for
/// "a boolean label expression" without specifying an operator set, and
/// conjunctive equality is the only shape the render/status call sites
/// actually need.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelOp {
    Eq(LabelValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelPredicate {
    pub key: String,
    pub op: LabelOp,
}

/// Boolean expression over a state's labels, accepted by `list_filtered`.
/// All predicates must match (conjunction) — there is no OR/NOT today.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateFilter {
    pub all_of: Vec<LabelPredicate>,
}

impl StateFilter {
    pub fn matches(&self, labels: &Labels) -> bool {
        self.all_of.iter().all(|p| match labels.get(&p.key) {
            Some(v) => match &p.op {
                LabelOp::Eq(expected) => v == expected,
            },
            None => false,
        })
    }
}

/// Durable state records: immutable guid, mutable logic id, raw blob,
/// lock metadata, labels (§3 of the data model). Both backends share
/// one implementation of the five-step write pipeline via
/// `state::plan_cache_refresh`.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn create(&self, guid: StateGuid, logic_id: &str) -> Result<State, StoreError>;
    async fn get_by_guid(&self, guid: StateGuid) -> Result<Option<State>, StoreError>;
    async fn get_by_logic_id(&self, logic_id: &str) -> Result<Option<State>, StoreError>;
    async fn list(&self) -> Result<Vec<State>, StoreError>;
    async fn list_filtered(&self, filter: &StateFilter) -> Result<Vec<State>, StoreError>;
    async fn update_labels(&self, guid: StateGuid, labels: Labels) -> Result<State, StoreError>;
    async fn delete(&self, guid: StateGuid) -> Result<(), StoreError>;

    async fn lock(&self, guid: StateGuid, lock_info: LockInfo) -> Result<(), StoreError>;
    async fn unlock(&self, guid: StateGuid, lock_id: &str) -> Result<(), StoreError>;
    /// Administrative override — clears the lock regardless of holder.
    /// Gated behind a distinct API method, never triggered by an empty
    /// `lock_id` on the ordinary unlock path (§4.4).
    async fn force_unlock(&self, guid: StateGuid) -> Result<(), StoreError>;

    /// §4.3's central atomic operation. `supplied_lock_id` is required
    /// iff the state is currently locked.
    async fn update_content_and_refresh_outputs(
        &self,
        guid: StateGuid,
        new_blob: Vec<u8>,
        supplied_lock_id: Option<&str>,
    ) -> Result<WriteOutcome, StoreError>;

    async fn output_cache(&self, guid: StateGuid) -> Result<Vec<OutputCacheEntry>, StoreError>;
    async fn get_output_cache_entry(
        &self,
        guid: StateGuid,
        output_key: &str,
    ) -> Result<Option<OutputCacheEntry>, StoreError>;

    /// Attach a manual schema to an output, surviving future writes that
    /// stop producing it (§3 "orphan" rule).
    async fn set_output_schema(
        &self,
        guid: StateGuid,
        output_key: &str,
        schema_json: serde_json::Value,
    ) -> Result<OutputCacheEntry, StoreError>;
}

/// One incoming edge eager-loaded with its producer's state row and,
/// if one exists, the producer's current output-cache entry for the
/// edge's `from_output` (§4.2's eager-load variant). `producer` is
/// never absent: the FK from `edges.from_state` to `states.guid` is
/// `ON DELETE CASCADE`, so an edge only exists while its producer does,
/// and the join is read from one consistent snapshot.
#[derive(Debug, Clone)]
pub struct EdgeWithProducer {
    pub edge: Edge,
    pub producer: State,
    pub producer_output: Option<OutputCacheEntry>,
}

/// Everything needed to insert a new edge before the store assigns it an id.
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub from_state: StateGuid,
    pub from_output: String,
    pub to_state: StateGuid,
    pub to_input_name: String,
    pub status: EdgeStatus,
    pub in_digest: String,
    pub mock_value: Option<Vec<u8>>,
}

/// Durable adjacency list of edges (§4.2). `would_create_cycle` is
/// shared with the Graph Engine's traversal so the insert-time guard
/// and the application-layer pre-check run identical code.
#[async_trait]
pub trait EdgeStore: Send + Sync + 'static {
    async fn create(&self, edge: NewEdge) -> Result<Edge, StoreError>;
    async fn get(&self, id: EdgeId) -> Result<Option<Edge>, StoreError>;
    async fn update(&self, edge: Edge) -> Result<(), StoreError>;
    async fn delete(&self, id: EdgeId) -> Result<(), StoreError>;

    async fn outgoing(&self, producer: StateGuid) -> Result<Vec<Edge>, StoreError>;
    async fn incoming(&self, consumer: StateGuid) -> Result<Vec<Edge>, StoreError>;
    async fn by_output(&self, output_name: &str) -> Result<Vec<Edge>, StoreError>;
    async fn all(&self) -> Result<Vec<Edge>, StoreError>;

    /// Eager-load variant of `incoming`: joins each edge with its
    /// producer's state row and the producer's output-cache entry for
    /// `from_output`, all from a single consistent snapshot (§4.2).
    /// Used by graph-projection call sites (e.g. `dependency_graph`) to
    /// avoid one `get_by_guid` round-trip per distinct producer.
    async fn incoming_with_producers(&self, consumer: StateGuid) -> Result<Vec<EdgeWithProducer>, StoreError>;

    /// Is `from` reachable from `to` in the currently committed graph?
    /// True means inserting `from -> to` would close a cycle.
    async fn would_create_cycle(&self, from: StateGuid, to: StateGuid) -> Result<bool, StoreError>;
}
