use cfgscrub_domain::{
    FileKind, ParseError, ParseErrorCode, ParseTree, TreeMap, insert_grouped, tree_kind_name,
};

use crate::cascade::{ParseInput, ParseStrategy};

fn input_text(input: &ParseInput) -> Result<&str, ParseError> {
    std::str::from_utf8(crate::sniff::strip_bom(&input.bytes))
        .map_err(|e| ParseError::new(ParseErrorCode::InvalidEncoding, e.to_string()))
}

fn require_container(tree: ParseTree) -> Result<ParseTree, ParseError> {
    match tree {
        ParseTree::Object(_) | ParseTree::Array(_) => Ok(tree),
        other => Err(ParseError::new(
            ParseErrorCode::WrongShape,
            format!("top-level {} is not a map or list", tree_kind_name(&other)),
        )),
    }
}

#[derive(Debug)]
pub struct JsonStrategy;

impl ParseStrategy for JsonStrategy {
    fn id(&self) -> &'static str {
        "json"
    }

    fn yields(&self) -> FileKind {
        FileKind::Json
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        let text = input_text(input)?;
        let tree: ParseTree = serde_json::from_str(text).map_err(ParseError::syntax)?;
        require_container(tree)
    }
}

#[derive(Debug)]
pub struct YamlStrategy;

impl ParseStrategy for YamlStrategy {
    fn id(&self) -> &'static str {
        "yaml"
    }

    fn yields(&self) -> FileKind {
        FileKind::Yaml
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        let text = input_text(input)?;
        let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(ParseError::syntax)?;
        require_container(yaml_to_tree(value))
    }
}

pub fn yaml_to_tree(value: serde_yaml::Value) -> ParseTree {
    match value {
        serde_yaml::Value::Null => ParseTree::Null,
        serde_yaml::Value::Bool(b) => ParseTree::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ParseTree::from(i)
            } else if let Some(u) = n.as_u64() {
                ParseTree::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(ParseTree::Number)
                    .unwrap_or_else(|| ParseTree::String(n.to_string()))
            }
        }
        serde_yaml::Value::String(s) => ParseTree::String(s),
        serde_yaml::Value::Sequence(items) => {
            ParseTree::Array(items.into_iter().map(yaml_to_tree).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = TreeMap::new();
            for (k, v) in mapping {
                map.insert(yaml_key(k), yaml_to_tree(v));
            }
            ParseTree::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_tree(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// INI sections, `key=value` and `key: value` lines, and wpa_supplicant style
/// `name={ ... }` blocks. Values stay strings.
#[derive(Debug)]
pub struct KeyValueStrategy;

impl ParseStrategy for KeyValueStrategy {
    fn id(&self) -> &'static str {
        "key_value"
    }

    fn yields(&self) -> FileKind {
        FileKind::KeyValue
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        parse_key_value(input_text(input)?)
    }
}

pub fn parse_key_value(text: &str) -> Result<ParseTree, ParseError> {
    let mut root = TreeMap::new();
    let mut section: Option<(String, TreeMap)> = None;
    let mut block: Option<(String, TreeMap)> = None;
    let mut pairs = 0_usize;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some((name, mut fields)) = block.take() {
            if line == "}" {
                let target = match section.as_mut() {
                    Some((_, m)) => m,
                    None => &mut root,
                };
                insert_grouped(target, &name, ParseTree::Object(fields));
            } else {
                if let Some((k, v)) = split_pair(line) {
                    fields.insert(k, ParseTree::String(v));
                    pairs += 1;
                }
                block = Some((name, fields));
            }
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') && line.len() > 2 {
            if let Some((name, fields)) = section.take() {
                insert_grouped(&mut root, &name, ParseTree::Object(fields));
            }
            section = Some((line[1..line.len() - 1].trim().to_string(), TreeMap::new()));
            continue;
        }

        if let Some(name) = line.strip_suffix('{') {
            let name = name.trim_end().trim_end_matches('=').trim();
            if !name.is_empty() {
                block = Some((name.to_string(), TreeMap::new()));
                continue;
            }
        }

        match split_pair(line) {
            Some((k, v)) => {
                let target = match section.as_mut() {
                    Some((_, m)) => m,
                    None => &mut root,
                };
                target.insert(k, ParseTree::String(v));
                pairs += 1;
            }
            None => {
                return Err(ParseError::syntax(format!(
                    "line {} is not a key/value pair",
                    line_no + 1
                )));
            }
        }
    }

    if let Some((name, _)) = block {
        return Err(ParseError::syntax(format!("block {name} is never closed")));
    }
    if let Some((name, fields)) = section {
        insert_grouped(&mut root, &name, ParseTree::Object(fields));
    }
    if pairs == 0 {
        return Err(ParseError::new(ParseErrorCode::WrongShape, "no key/value pairs"));
    }
    Ok(ParseTree::Object(root))
}

fn split_pair(line: &str) -> Option<(String, String)> {
    let idx = line.find(['=', ':'])?;
    let key = line[..idx].trim();
    if key.is_empty() || (key.contains(char::is_whitespace) && !key.starts_with('"')) {
        return None;
    }
    let value = line[idx + 1..].trim();
    Some((unquote(key).to_string(), unquote(value).to_string()))
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wpa_supplicant_blocks_become_grouped_maps() {
        let tree = parse_key_value(
            "ctrl_interface=/var/run/wpa\n# comment\nnetwork={\n  ssid=\"Home\"\n  psk=\"hunter22\"\n}\nnetwork={\n  ssid=\"Guest\"\n  key_mgmt=NONE\n}\n",
        )
        .expect("parse");
        assert_eq!(
            tree,
            json!({
                "ctrl_interface": "/var/run/wpa",
                "network": [
                    {"ssid": "Home", "psk": "hunter22"},
                    {"ssid": "Guest", "key_mgmt": "NONE"}
                ]
            })
        );
    }

    #[test]
    fn ini_sections_nest_their_pairs() {
        let tree = parse_key_value("[eap]\nmethod = PEAP\nidentity: alice\n; note\n[radius]\nsecret=xyz\n")
            .expect("parse");
        assert_eq!(tree["eap"]["method"], json!("PEAP"));
        assert_eq!(tree["eap"]["identity"], json!("alice"));
        assert_eq!(tree["radius"]["secret"], json!("xyz"));
    }

    #[test]
    fn prose_is_not_key_value() {
        assert!(parse_key_value("hello world\n").is_err());
        assert!(parse_key_value("# only comments\n").is_err());
    }

    #[test]
    fn yaml_keys_are_stringified() {
        let value: serde_yaml::Value = serde_yaml::from_str("1: one\ntrue: yes\nnested: {a: [1, 2.5]}\n")
            .expect("yaml");
        let tree = yaml_to_tree(value);
        assert_eq!(tree["1"], json!("one"));
        assert_eq!(tree["true"], json!("yes"));
        assert_eq!(tree["nested"]["a"], json!([1, 2.5]));
    }
}
