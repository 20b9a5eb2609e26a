//! Entity key helpers.
//!
//! Two key spaces share one tree: filesystem keys are absolute POSIX paths
//! (always starting with `/`), process keys are decimal process ids. The
//! helpers here are the only place that inspects key shape.

/// Key of the filesystem root node.
pub const ROOT_PATH: &str = "/";

/// Key of the synthetic root that every process hangs under.
pub const PROCESS_ROOT_KEY: &str = "Processes";

/// Returns `true` for process keys (non-empty, ASCII digits only).
pub fn is_process_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// Normalize a filesystem key to POSIX form.
///
/// Windows-style keys (`\Windows\System32`) become `/Windows/System32`.
/// Repeated and trailing separators are collapsed. The empty key maps to
/// the root.
pub fn normalize_path(key: &str) -> String {
    let posix = if key.starts_with('\\') {
        key.replace('\\', "/")
    } else {
        key.to_string()
    };

    let parts: Vec<&str> = posix.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return ROOT_PATH.to_string();
    }
    let mut out = String::with_capacity(posix.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// The path components of a filesystem key, root excluded.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|p| !p.is_empty()).collect()
}

/// Parent path of a filesystem key. The root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => ROOT_PATH,
        Some(idx) => &path[..idx],
    }
}

/// Every proper ancestor of a filesystem key, nearest first, root last.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    while current != ROOT_PATH {
        current = parent_path(current);
        out.push(current);
    }
    out
}

/// Last path component, or `/` for the root.
pub fn file_name(path: &str) -> &str {
    components(path).last().copied().unwrap_or(ROOT_PATH)
}
