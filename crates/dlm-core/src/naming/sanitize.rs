//! File-name sanitization for local filesystems.

/// Longest name most filesystems accept (Linux NAME_MAX).
const NAME_MAX: usize = 255;

/// Makes a server- or URL-supplied name safe to create in a directory.
///
/// Path separators, NUL, control characters and whitespace become `_`; runs of
/// `_` collapse; leading/trailing dots, spaces and underscores are trimmed;
/// the result is cut to `NAME_MAX` bytes on a char boundary.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if matches!(c, '/' | '\\' | '\0') || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_' || c == ' ');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
