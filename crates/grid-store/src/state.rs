use chrono::{DateTime, Utc};

use grid_domain::{OutputCacheEntry, ParsedState, StateGuid};

/// Result of planning step 4 of `update_content_and_refresh_outputs`
/// (§4.3): which output-cache rows to upsert and which stale rows to
/// drop. Rows not mentioned in either list — manually-schema-bearing
/// orphans — are left untouched by the caller.
#[derive(Debug, Clone, Default)]
pub struct CacheRefreshPlan {
    pub upserts: Vec<OutputCacheEntry>,
    pub delete_keys: Vec<String>,
}

/// Pure planning step shared by both backends: given the cache rows a
/// state currently has and the outputs just parsed out of its new
/// blob, decide what the cache should look like afterward.
///
/// - Every key in `parsed.outputs` gets an upsert, carrying forward any
///   manual schema/validation fields already recorded for that key.
/// - A key that was cached but is no longer produced is deleted, unless
///   it carries a manual schema — those rows are retained as orphans
///   with their old `state_serial`, since the output may return.
pub fn plan_cache_refresh(
    guid: StateGuid,
    existing: &[OutputCacheEntry],
    parsed: &ParsedState,
    now: DateTime<Utc>,
) -> CacheRefreshPlan {
    let mut upserts = Vec::with_capacity(parsed.outputs.len());

    for (key, output) in &parsed.outputs {
        let prior = existing.iter().find(|e| &e.output_key == key);
        let entry = match prior {
            Some(p) => OutputCacheEntry {
                state_guid: guid,
                output_key: key.clone(),
                sensitive: output.sensitive,
                state_serial: parsed.serial,
                schema_json: p.schema_json.clone(),
                schema_source: p.schema_source,
                validation_status: p.validation_status,
                validation_error: p.validation_error.clone(),
                validated_at: p.validated_at,
                created_at: p.created_at,
                updated_at: now,
            },
            None => OutputCacheEntry {
                state_guid: guid,
                output_key: key.clone(),
                sensitive: output.sensitive,
                state_serial: parsed.serial,
                schema_json: None,
                schema_source: None,
                validation_status: None,
                validation_error: None,
                validated_at: None,
                created_at: now,
                updated_at: now,
            },
        };
        upserts.push(entry);
    }

    let delete_keys = existing
        .iter()
        .filter(|e| !parsed.outputs.contains_key(&e.output_key) && !e.is_manual_orphan_candidate())
        .map(|e| e.output_key.clone())
        .collect();

    CacheRefreshPlan { upserts, delete_keys }
}
