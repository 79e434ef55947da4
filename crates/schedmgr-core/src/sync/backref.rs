//! Back-reference marker carried in external event descriptions.
//!
//! The external calendar tags each mirrored event with `[schedmgr:<id>]` so a
//! pulled event can be traced back to the local record it came from.

const MARKER_OPEN: &str = "[schedmgr:";
const MARKER_CLOSE: char = ']';

pub fn back_reference_marker(id: &str) -> String {
    format!("{MARKER_OPEN}{id}{MARKER_CLOSE}")
}

/// Local id embedded in `description`, if any. The first well-formed marker
/// wins.
pub fn parse_back_reference(description: &str) -> Option<String> {
    let mut rest = description;
    while let Some(start) = rest.find(MARKER_OPEN) {
        let after = &rest[start + MARKER_OPEN.len()..];
        let Some(end) = after.find(MARKER_CLOSE) else {
            return None;
        };
        let id = after[..end].trim();
        if !id.is_empty() {
            return Some(id.to_string());
        }
        rest = &after[end + 1..];
    }
    None
}

/// `description` with every marker removed and surrounding whitespace
/// trimmed.
pub fn strip_back_reference(description: &str) -> String {
    let mut out = String::with_capacity(description.len());
    let mut rest = description;
    while let Some(start) = rest.find(MARKER_OPEN) {
        let after = &rest[start + MARKER_OPEN.len()..];
        match after.find(MARKER_CLOSE) {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_round_trips() {
        let marker = back_reference_marker("a1");
        assert_eq!(marker, "[schedmgr:a1]");
        assert_eq!(parse_back_reference(&format!("Notes\n\n{marker}")).as_deref(), Some("a1"));
    }

    #[test]
    fn parse_skips_empty_and_unterminated_markers() {
        assert_eq!(parse_back_reference("[schedmgr:] [schedmgr:b2]").as_deref(), Some("b2"));
        assert_eq!(parse_back_reference("[schedmgr:a1"), None);
        assert_eq!(parse_back_reference("no marker"), None);
    }

    #[test]
    fn strip_removes_markers_only() {
        assert_eq!(strip_back_reference("Bring laptop\n[schedmgr:a1]"), "Bring laptop");
        assert_eq!(strip_back_reference("[schedmgr:a1]"), "");
        assert_eq!(strip_back_reference("keep [schedmgr:x] this"), "keep  this");
        assert_eq!(strip_back_reference("broken [schedmgr:x"), "broken [schedmgr:x");
    }
}
