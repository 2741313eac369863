use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use grid_domain::{EdgeStatus, StateGuid};
use grid_service::DependencyGraph;
use tracing::debug;

use crate::block::splice;
use crate::error::RenderError;
use crate::hcl::mock_expr;

/// How producer addresses are constructed. The renderer doesn't know
/// the HTTP backend's own address; it's handed a base URL and appends
/// each producer's guid as the state key, mirroring how `grid-cli`
/// configures a `terraform_remote_state` "http" backend.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub backend_base_url: String,
}

impl RenderConfig {
    pub fn backend_address(&self, producer: StateGuid) -> String {
        format!("{}/{}", self.backend_base_url.trim_end_matches('/'), producer)
    }
}

/// Render the body of the managed block (sentinels excluded) for one
/// consumer's dependency graph: one `terraform_remote_state` data
/// source per distinct producer, then a `locals` block binding each
/// edge's alias to its producer output (or, for mock edges, to the
/// mock value inlined verbatim).
pub fn render_block_body(graph: &DependencyGraph, config: &RenderConfig) -> String {
    let mut producers = graph.producers.clone();
    producers.sort_by(|a, b| a.logic_id.cmp(&b.logic_id));

    let mut out = String::new();
    for producer in &producers {
        out.push_str(&format!(
            "data \"terraform_remote_state\" \"{}\" {{\n  backend = \"http\"\n  config = {{\n    address = \"{}\"\n  }}\n}}\n\n",
            producer.logic_id,
            config.backend_address(producer.guid),
        ));
    }

    let logic_id_by_guid: HashMap<StateGuid, &str> = producers
        .iter()
        .map(|p| (p.guid, p.logic_id.as_str()))
        .collect();

    let mut locals: Vec<(String, String)> = graph
        .edges
        .iter()
        .map(|edge| {
            let rhs = if edge.status == EdgeStatus::Mock {
                match &edge.mock_value {
                    Some(bytes) => mock_expr(bytes),
                    None => "null".to_string(),
                }
            } else {
                let producer_name = logic_id_by_guid
                    .get(&edge.from_state)
                    .copied()
                    .unwrap_or("unknown_producer");
                format!(
                    "data.terraform_remote_state.{}.outputs.{}",
                    producer_name, edge.from_output
                )
            };
            (edge.to_input_name.clone(), rhs)
        })
        .collect();
    locals.sort_by(|a, b| a.0.cmp(&b.0));

    out.push_str("locals {\n");
    for (name, rhs) in &locals {
        out.push_str(&format!("  {} = {}\n", name, rhs));
    }
    out.push_str("}\n");
    out
}

/// Render `graph` and splice it into the managed block of `path`,
/// writing the whole file atomically (temp file + rename) so a reader
/// never observes a half-written file. On error the existing file, if
/// any, is left untouched because the rename only happens after the
/// full contents are written and fsynced.
///
/// This performs blocking filesystem I/O; callers in an async context
/// should run it inside `spawn_blocking`.
pub fn render_to_file(
    graph: &DependencyGraph,
    config: &RenderConfig,
    path: &Path,
) -> Result<(), RenderError> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(RenderError::Io {
                path: path.display().to_string(),
                source: err,
            })
        }
    };

    let body = render_block_body(graph, config);
    let spliced = splice(&existing, &body);

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        uuid::Uuid::new_v4()
    );
    let temp_path = path.with_file_name(temp_name);

    write_atomic(&temp_path, path, spliced.as_bytes())?;
    debug!(path = %path.display(), "rendered managed block");
    Ok(())
}

fn write_atomic(temp_path: &Path, path: &Path, data: &[u8]) -> Result<(), RenderError> {
    let io_err = |source: std::io::Error| RenderError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut file = std::fs::File::create(temp_path).map_err(io_err)?;
    file.write_all(data).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    std::fs::rename(temp_path, path).map_err(io_err)?;

    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }

    Ok(())
}
