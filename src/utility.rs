//! Utility functions useful throughout the codebase.

use std::path::Path;

/// Renders a hexadecimal string (an address or a digest) in clipped form for
/// diagnostics, keeping the leading `0x` and the first eight significant
/// characters. This allows for more-compact printing.
#[must_use]
pub fn clip_hex(value: &str) -> String {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    if stripped.len() <= 8 {
        return value.to_string();
    }
    format!("0x{}…", &stripped[0..8])
}

/// Renders `path` relative to `root` where possible, falling back to the
/// unmodified path when it does not live under the root.
///
/// Storage slots record their declaring source file this way so that the same
/// project checked out at different locations produces identical layouts.
#[must_use]
pub fn relative_to(path: &str, root: &Path) -> String {
    Path::new(path)
        .strip_prefix(root)
        .map_or_else(|_| path.to_string(), |p| p.to_string_lossy().into_owned())
}
