//! Sentinel-bounded splicing: replace the text between
//! `BEGIN_SENTINEL`/`END_SENTINEL` with a freshly rendered block,
//! leaving everything outside those markers untouched.

pub const BEGIN_SENTINEL: &str = "# BEGIN MANAGED BLOCK";
pub const END_SENTINEL: &str = "# END MANAGED BLOCK";

/// Splice `block_body` into `existing`, replacing any prior managed
/// block in place. If no managed block is present yet, the new one is
/// appended, separated from existing content by a blank line.
pub fn splice(existing: &str, block_body: &str) -> String {
    let block = format!("{BEGIN_SENTINEL}\n{block_body}{END_SENTINEL}\n");
    match find_sentinels(existing) {
        Some((start, end)) => format!("{}{}{}", &existing[..start], block, &existing[end..]),
        None if existing.is_empty() => block,
        None if existing.ends_with('\n') => format!("{existing}\n{block}"),
        None => format!("{existing}\n\n{block}"),
    }
}

/// Locate the byte range of an existing managed block, including the
/// trailing newline after `END_SENTINEL` if one is present.
fn find_sentinels(content: &str) -> Option<(usize, usize)> {
    let start = content.find(BEGIN_SENTINEL)?;
    let after_begin = start + BEGIN_SENTINEL.len();
    let end_offset = content[after_begin..].find(END_SENTINEL)?;
    let end = after_begin + end_offset + END_SENTINEL.len();
    let end = if content[end..].starts_with('\n') { end + 1 } else { end };
    Some((start, end))
}
