//! The parse tree every format is normalized into.
//!
//! Maps keep document order (`serde_json` is built with `preserve_order`), so
//! a tree serialized back to YAML or JSON reads in the same order as the
//! uploaded file.

pub type ParseTree = serde_json::Value;
pub type TreeMap = serde_json::Map<String, ParseTree>;

pub fn tree_kind_name(v: &ParseTree) -> &'static str {
    match v {
        ParseTree::Null => "null",
        ParseTree::Bool(_) => "bool",
        ParseTree::Number(_) => "number",
        ParseTree::String(_) => "string",
        ParseTree::Array(_) => "array",
        ParseTree::Object(_) => "object",
    }
}

/// Path segment escaping for the path-keyed maps in a conversion result
/// (JSON pointer rules).
pub fn push_path_segment(path: &mut String, segment: &str) {
    path.push('/');
    for ch in segment.chars() {
        match ch {
            '~' => path.push_str("~0"),
            '/' => path.push_str("~1"),
            _ => path.push(ch),
        }
    }
}

/// Inserts `value` under `key`, turning a repeated key into a list.
pub fn insert_grouped(map: &mut TreeMap, key: &str, value: ParseTree) {
    match map.get_mut(key) {
        Some(ParseTree::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = ParseTree::Array(vec![first, value]);
        }
        None => {
            map.insert(key.to_string(), value);
        }
    }
}

pub fn leaf_count(v: &ParseTree) -> usize {
    match v {
        ParseTree::Array(items) => items.iter().map(leaf_count).sum(),
        ParseTree::Object(map) => map.values().map(leaf_count).sum(),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_are_pointer_escaped() {
        let mut path = String::new();
        push_path_segment(&mut path, "PayloadContent");
        push_path_segment(&mut path, "a/b~c");
        assert_eq!(path, "/PayloadContent/a~1b~0c");
    }

    #[test]
    fn leaf_count_walks_nested_values() {
        let tree = serde_json::json!({"a": [1, 2, {"b": null}], "c": {}});
        assert_eq!(leaf_count(&tree), 3);
        assert_eq!(tree_kind_name(&tree), "object");
    }
}
