use std::collections::{HashMap, HashSet, VecDeque};

use grid_domain::{Edge, EdgeStatus, StateGuid};

/// Per-state health verdict (§4.5 state-status rollup). Never persisted —
/// always derived fresh from the current edge snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No incoming edge is red, and no upstream producer is red either.
    Clean,
    /// This state's own incoming edges are all healthy, but something it
    /// transitively depends on is red.
    PotentiallyStale,
    /// At least one incoming edge is unhealthy.
    Stale,
}

/// Counts over a state's incoming edges, grouped the same way the sorted
/// view is grouped: pending first, then the dirty/unknown bucket, then
/// clean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounts {
    pub pending: usize,
    pub dirty: usize,
    pub clean: usize,
}

/// Result of rolling up one state's incoming edges (§4.5).
#[derive(Debug, Clone)]
pub struct StateStatus {
    pub state: StateGuid,
    pub verdict: Verdict,
    pub counts: BucketCounts,
    /// Incoming edges sorted pending-first, then dirty/unknown, then clean;
    /// ties within a bucket broken by the producer's logical id.
    pub incoming: Vec<Edge>,
}

/// Sort rank used for both the bucket counts and the incoming-edge
/// ordering. Lower sorts first.
fn bucket_rank(status: EdgeStatus) -> u8 {
    match status {
        EdgeStatus::Pending => 0,
        EdgeStatus::Dirty
        | EdgeStatus::Mock
        | EdgeStatus::MissingOutput
        | EdgeStatus::SchemaInvalid => 1,
        EdgeStatus::Clean => 2,
    }
}

/// Roll up the status of `root` over the full committed edge snapshot.
///
/// `producer_logic_ids` is used only to break sort ties within a bucket;
/// a missing entry falls back to the producer's guid string so the
/// ordering stays total even for states the caller didn't bother to
/// resolve.
pub fn state_status(
    root: StateGuid,
    all_edges: &[Edge],
    producer_logic_ids: &HashMap<StateGuid, String>,
) -> StateStatus {
    let mut incoming_by_consumer: HashMap<StateGuid, Vec<&Edge>> = HashMap::new();
    let mut forward: HashMap<StateGuid, Vec<StateGuid>> = HashMap::new();
    for edge in all_edges {
        incoming_by_consumer.entry(edge.to_state).or_default().push(edge);
        forward.entry(edge.from_state).or_default().push(edge.to_state);
    }

    let is_red = |guid: StateGuid| -> bool {
        incoming_by_consumer
            .get(&guid)
            .map(|edges| edges.iter().any(|e| e.status.is_red()))
            .unwrap_or(false)
    };

    // Multi-source BFS over the forward adjacency, seeded from every red
    // state. Anything reached (including through other red states) that
    // is not itself red is "potentially stale".
    let red_roots: Vec<StateGuid> = {
        let mut consumers: HashSet<StateGuid> = incoming_by_consumer.keys().copied().collect();
        consumers.extend(forward.keys().copied());
        consumers.into_iter().filter(|g| is_red(*g)).collect()
    };

    let mut visited: HashSet<StateGuid> = HashSet::new();
    let mut queue: VecDeque<StateGuid> = VecDeque::new();
    for &r in &red_roots {
        if visited.insert(r) {
            queue.push_back(r);
        }
    }
    while let Some(node) = queue.pop_front() {
        if let Some(consumers) = forward.get(&node) {
            for &next in consumers {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    let verdict = if is_red(root) {
        Verdict::Stale
    } else if visited.contains(&root) {
        Verdict::PotentiallyStale
    } else {
        Verdict::Clean
    };

    let mut incoming: Vec<Edge> = incoming_by_consumer
        .get(&root)
        .map(|edges| edges.iter().map(|e| (*e).clone()).collect())
        .unwrap_or_default();

    incoming.sort_by(|a, b| {
        let rank_a = bucket_rank(a.status);
        let rank_b = bucket_rank(b.status);
        rank_a.cmp(&rank_b).then_with(|| {
            let name_a = producer_logic_ids
                .get(&a.from_state)
                .cloned()
                .unwrap_or_else(|| a.from_state.to_string());
            let name_b = producer_logic_ids
                .get(&b.from_state)
                .cloned()
                .unwrap_or_else(|| b.from_state.to_string());
            name_a.cmp(&name_b)
        })
    });

    let mut counts = BucketCounts::default();
    for edge in &incoming {
        match bucket_rank(edge.status) {
            0 => counts.pending += 1,
            1 => counts.dirty += 1,
            _ => counts.clean += 1,
        }
    }

    StateStatus {
        state: root,
        verdict,
        counts,
        incoming,
    }
}
