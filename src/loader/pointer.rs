//! JSON Pointer (RFC 6901) helpers over `serde_json::Value`.

use serde_json::Value;

/// Escape a key for use as a pointer segment (`~` → `~0`, `/` → `~1`).
pub fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Decode a pointer segment (handles `~1` and `~0`, in that order).
pub fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Append an escaped segment to a pointer.
pub fn join(pointer: &str, segment: &str) -> String {
    format!("{}/{}", pointer, escape(segment))
}

/// Look up a pointer such as `/components/schemas/Pet` in `root`.
///
/// The empty pointer designates the root itself.
pub fn lookup<'v>(root: &'v Value, pointer: &str) -> Option<&'v Value> {
    if pointer.is_empty() {
        return Some(root);
    }
    let rest = pointer.strip_prefix('/')?;
    rest.split('/').try_fold(root, |current, raw| {
        let segment = unescape(raw);
        match current {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

/// Render a pointer as a slash-separated path without the leading slash.
pub fn display(pointer: &str) -> &str {
    pointer.strip_prefix('/').unwrap_or(pointer)
}
