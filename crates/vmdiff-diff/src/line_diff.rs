//! Line-level diff: unified patch text between two line sequences.
//!
//! Uses the `similar` crate (Myers diff algorithm) for the edit script and
//! renders it in unified format: two path headers, then one `@@` header per
//! hunk, each followed by ` `/`-`/`+` prefixed lines.

use similar::{Algorithm, ChangeTag, DiffOp, DiffTag, TextDiff};

/// How many unchanged lines to keep around each change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Context {
    /// Keep up to this many lines on either side of a change.
    Lines(usize),
    /// Keep every line, producing a single hunk.
    Full,
}

/// Compute a unified diff between two line sequences.
///
/// Lines are given without trailing newlines and the result carries none.
/// Returns an empty vector when the sequences are identical.
pub fn unified_diff(
    old: &[String],
    new: &[String],
    from_file: &str,
    to_file: &str,
    context: Context,
) -> Vec<String> {
    let old_refs: Vec<&str> = old.iter().map(String::as_str).collect();
    let new_refs: Vec<&str> = new.iter().map(String::as_str).collect();

    let text_diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&old_refs, &new_refs);

    if text_diff.ops().iter().all(|op| op.tag() == DiffTag::Equal) {
        return Vec::new();
    }

    let radius = match context {
        Context::Lines(n) => n,
        Context::Full => old.len().max(new.len()),
    };

    let mut out = vec![format!("--- {from_file}"), format!("+++ {to_file}")];

    for group in text_diff.grouped_ops(radius) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        out.push(hunk_header(first, last));

        for op in &group {
            for change in text_diff.iter_changes(op) {
                let prefix = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                out.push(format!("{prefix}{}", change.value()));
            }
        }
    }

    out
}

fn hunk_header(first: &DiffOp, last: &DiffOp) -> String {
    let old = format_range(first.old_range().start, last.old_range().end);
    let new = format_range(first.new_range().start, last.new_range().end);
    format!("@@ -{old} +{new} @@")
}

/// Render a half-open, zero-based line range as a unified range.
///
/// Single lines print as `N`, empty ranges point at the line before them.
fn format_range(start: usize, end: usize) -> String {
    let length = end.saturating_sub(start);
    match length {
        1 => format!("{}", start + 1),
        0 => format!("{start},0"),
        _ => format!("{},{length}", start + 1),
    }
}
