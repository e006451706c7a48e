//! Extraction of structured file-operation blocks from model output.
//!
//! Agents are prompted to end their output with a JSON object of the form
//! `{"fileOps":[{"type":"create","path":"a.ts","diff":"..."}]}`. The block
//! can appear anywhere in free text, possibly more than once; the last
//! well-formed block wins. Malformed blocks are ignored, never an error.

use std::path::{Component, Path};

use serde_json::{Map, Value};

use crate::types::FileOp;

const MARKER: &str = "\"fileOps\"";

/// Extract the ops from the last well-formed `fileOps` block in `text`.
///
/// Individual entries that are not valid ops are dropped. Returns `None`
/// when no block parses or when no valid op survives.
pub fn extract_file_ops(text: &str) -> Option<Vec<FileOp>> {
    let last_marker = text.rfind(MARKER)?;
    let mut last_block = None;

    // Scan left to right. A parsed object is skipped whole unless it still
    // contains the marker, so every byte is re-read at most once per
    // nesting level.
    let mut pos = 0;
    while let Some(offset) = text[pos..last_marker].find('{') {
        let start = pos + offset;
        pos = match parse_object(&text[start..]) {
            Some((mut obj, len)) => match obj.remove("fileOps") {
                Some(Value::Array(entries)) => {
                    last_block = Some(entries);
                    start + len
                }
                _ if text[start..start + len].contains(MARKER) => start + 1,
                _ => start + len,
            },
            None => start + 1,
        };
        if pos >= last_marker {
            break;
        }
    }

    let ops: Vec<FileOp> = last_block?
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<FileOp>(entry).ok())
        .collect();
    if ops.is_empty() {
        None
    } else {
        Some(ops)
    }
}

/// Parse one JSON object at the start of `slice`, ignoring whatever text
/// follows it. Returns the object and its length in bytes.
fn parse_object(slice: &str) -> Option<(Map<String, Value>, usize)> {
    let mut stream = serde_json::Deserializer::from_str(slice).into_iter::<Value>();
    match stream.next()? {
        Ok(Value::Object(obj)) => Some((obj, stream.byte_offset())),
        _ => None,
    }
}

/// Reject paths that could escape a repository root: absolute paths and any
/// path containing a `..` segment.
pub fn check_relative_path(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("empty path".to_string());
    }
    let p = Path::new(path);
    if p.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
        return Err(format!("absolute path not allowed: {path}"));
    }
    let traverses = p.components().any(|c| matches!(c, Component::ParentDir))
        || path.split(['/', '\\']).any(|seg| seg == "..");
    if traverses {
        return Err(format!("parent traversal not allowed: {path}"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileOpType;

    #[test]
    fn trailing_block_is_extracted() {
        let text = r#"Creating src/x.ts...done
{"fileOps":[{"type":"create","path":"a.ts","diff":"x"}]}"#;
        let ops = extract_file_ops(text).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_type, FileOpType::Create);
        assert_eq!(ops[0].path, "a.ts");
        assert_eq!(ops[0].diff, "x");
    }

    #[test]
    fn last_block_wins() {
        let text = r#"first {"fileOps":[{"type":"create","path":"one.ts","diff":""}]}
then {"fileOps":[{"type":"delete","path":"two.ts","diff":""},{"type":"modify","path":"three.ts","diff":"@@"}]} end"#;
        let ops = extract_file_ops(text).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].path, "two.ts");
        assert_eq!(ops[1].op_type, FileOpType::Modify);
    }

    #[test]
    fn malformed_last_block_falls_back_to_earlier() {
        let text = r#"{"fileOps":[{"type":"create","path":"ok.ts","diff":"1"}]}
{"fileOps":[{"type":"create","path":"#;
        let ops = extract_file_ops(text).unwrap();
        assert_eq!(ops[0].path, "ok.ts");
    }

    #[test]
    fn block_inside_wrapper_object_and_prose_braces() {
        let text = r#"Plan {step one} done.
{"summary":"adds {x}","result":{"fileOps":[{"type":"create","path":"w.ts","diff":""}]}}"#;
        let ops = extract_file_ops(text).unwrap();
        assert_eq!(ops[0].path, "w.ts");
    }

    #[test]
    fn long_output_with_many_objects_keeps_earlier_block() {
        let mut text = String::from(r#"{"fileOps":[{"type":"create","path":"keep.ts","diff":""}]}"#);
        for i in 0..20_000 {
            text.push_str(&format!(r#" {{"step":{i},"detail":{{"ok":true}}}}"#));
        }
        text.push_str(r#" {"fileOps":[{"type":"create","path":"#);
        let ops = extract_file_ops(&text).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "keep.ts");
    }

    #[test]
    fn invalid_entries_are_dropped() {
        let text = r#"{"fileOps":[{"type":"rename","path":"a","diff":""},{"type":"create","path":7,"diff":""},{"type":"modify","path":"b.rs","diff":"d"}]}"#;
        let ops = extract_file_ops(text).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "b.rs");
    }

    #[test]
    fn no_block_or_garbage_is_none() {
        assert!(extract_file_ops("just prose").is_none());
        assert!(extract_file_ops(r#"{"fileOps": "nope"}"#).is_none());
        assert!(extract_file_ops(r#"{"fileOps": [}"#).is_none());
        assert!(extract_file_ops(r#"{"fileOps": []}"#).is_none());
    }

    #[test]
    fn path_checks() {
        assert!(check_relative_path("src/lib.rs").is_ok());
        assert!(check_relative_path("/etc/passwd").is_err());
        assert!(check_relative_path("../secret").is_err());
        assert!(check_relative_path("src/../../x").is_err());
        assert!(check_relative_path("").is_err());
    }
}
