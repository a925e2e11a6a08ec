//! Mapping of hierarchical identifiers onto single path segments

/// Placeholder for '/'
pub const SLASH_PLACEHOLDER: char = '#';

/// Placeholder for '\'
pub const BACKSLASH_PLACEHOLDER: char = '@';

/// Turn a namespace (or any identifier) into one flat path segment
///
/// `/` becomes `#` and `\` becomes `@`; every other character is kept.
/// `root/cimv2` and `root\cimv2` therefore land in different directories.
pub fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' => SLASH_PLACEHOLDER,
            '\\' => BACKSLASH_PLACEHOLDER,
            other => other,
        })
        .collect()
}

/// True if `sanitize(id)` names an entry inside its parent directory
///
/// Empty, `.` and `..` would resolve to the parent itself or above it.
pub fn is_path_segment(id: &str) -> bool {
    !matches!(sanitize(id).as_str(), "" | "." | "..")
}
