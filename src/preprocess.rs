//! Bootstrap source rewriting.
//!
//! The V8 snapshot serializer trips over top-level function declarations
//! (`outer_scope_info()->IsScopeInfo() || is_toplevel()` in
//! `SharedFunctionInfo::FlushCompiled`). Wrapping the bootstrap body in an
//! IIFE avoids that, but the trailing `//# sourceMappingURL=` comment has to
//! stay on the last line or source maps stop lining up.

use anyhow::{anyhow, bail, Result};

/// Token that introduces the trailing source map comment.
pub const MARKER: &str = "//#";

const SOURCE_MAPPING_URL: &str = "sourceMappingURL";

/// Wrap `source` in an immediately-invoked function, keeping the trailing
/// marker comment as the final line.
pub fn wrap(source: &str) -> Result<String> {
    let offset = source
        .rfind(MARKER)
        .ok_or_else(|| anyhow!("bootstrap source has no trailing `{MARKER}` source map comment"))?;

    let (body, tail) = source.split_at(offset);
    let wrapped = format!("(function() {{{body}\n}})();\n{tail}");

    let last = last_line(&wrapped);
    if !(last.starts_with(MARKER) && last.contains(SOURCE_MAPPING_URL)) {
        bail!("source map comment is not the last line after wrapping (last line: {last:?})");
    }

    Ok(wrapped)
}

/// Last line of `text`, ignoring a single trailing line terminator.
fn last_line(text: &str) -> &str {
    let text = text
        .strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(text);
    text.rsplit('\n').next().unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAP: &str = "//# sourceMappingURL=x.map";

    #[test]
    fn test_wrap_minimal_source() {
        let wrapped = wrap("42;\n//# sourceMappingURL=x.map\n").unwrap();
        assert_eq!(
            wrapped,
            "(function() {42;\n\n})();\n//# sourceMappingURL=x.map\n"
        );
        assert_eq!(last_line(&wrapped), MAP);
    }

    #[test]
    fn test_wrap_without_trailing_newline() {
        let wrapped = wrap("function f() {}\n//# sourceMappingURL=main.js.map").unwrap();
        assert!(wrapped.starts_with("(function() {function f() {}"));
        assert!(wrapped.ends_with("})();\n//# sourceMappingURL=main.js.map"));
    }

    #[test]
    fn test_wrap_missing_marker_fails() {
        let err = wrap("42;\n").unwrap_err();
        assert!(err.to_string().contains("source map comment"));
    }

    #[test]
    fn test_wrap_marker_mid_body_fails() {
        // The last `//#` is followed by more code, so it is not a trailing marker.
        let err = wrap("a();\n//# sourceMappingURL=x.map\nb();\n").unwrap_err();
        assert!(err.to_string().contains("not the last line"));
    }

    #[test]
    fn test_wrap_marker_without_url_fails() {
        assert!(wrap("a();\n//# sourceURL=boot.js\n").is_err());
    }

    #[test]
    fn test_wrap_keeps_crlf_marker_last() {
        let wrapped = wrap("a();\r\n//# sourceMappingURL=x.map\r\n").unwrap();
        assert_eq!(last_line(&wrapped), MAP);
    }

    #[test]
    fn test_rewrap_keeps_marker_last() {
        let once = wrap("let x = 1;\n//# sourceMappingURL=x.map\n").unwrap();
        let twice = wrap(&once).unwrap();
        assert_eq!(last_line(&twice), MAP);
        assert!(twice.starts_with("(function() {(function() {"));
    }

    proptest! {
        #[test]
        fn wrapped_source_ends_with_marker(
            body in "[a-z0-9;=+ (){}\n]{0,64}",
            url in "[a-z]{1,12}\\.map",
            newline in proptest::bool::ANY,
        ) {
            let marker = format!("//# sourceMappingURL={url}");
            let source = format!("{body}\n{marker}{}", if newline { "\n" } else { "" });
            let wrapped = wrap(&source).unwrap();
            prop_assert_eq!(last_line(&wrapped), marker.as_str());
        }

        #[test]
        fn unmarked_source_is_rejected(body in "[a-z0-9;=+ (){}\n/]{0,64}") {
            prop_assume!(!body.contains(MARKER));
            prop_assert!(wrap(&body).is_err());
        }
    }
}
