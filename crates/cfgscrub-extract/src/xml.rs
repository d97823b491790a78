//! Lenient XML tree builder.
//!
//! Mismatched end tags are accepted, unknown entities are kept literally and a
//! document cut off before its closing tags is closed implicitly. Documents
//! rooted at `<plist>` are read with property-list semantics; anything else is
//! mapped element by element (`@attr`, `#text`, children grouped by name).

use cfgscrub_domain::{
    CascadeLimits, FileKind, ParseError, ParseErrorCode, ParseTree, TreeMap, insert_grouped,
};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::cascade::{ParseInput, ParseStrategy};

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Node::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub tree: ParseTree,
    pub is_plist: bool,
    /// The input ended with elements still open.
    pub truncated: bool,
}

pub fn parse_lenient(text: &str, limits: &CascadeLimits) -> Result<XmlDocument, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut roots: Vec<Element> = Vec::new();
    let mut truncated = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() >= limits.max_xml_depth as usize {
                    return Err(ParseError::new(
                        ParseErrorCode::LimitExceeded,
                        format!("nesting deeper than {}", limits.max_xml_depth),
                    ));
                }
                stack.push(open_element(&e, limits)?);
            }
            Ok(Event::Empty(e)) => {
                let el = open_element(&e, limits)?;
                attach(&mut stack, &mut roots, el, limits)?;
            }
            Ok(Event::End(_)) => {
                // End names are not checked; whatever is open closes.
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut roots, el, limits)?;
                }
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(t) => t.into_owned(),
                    Err(_) => String::from_utf8_lossy(e.as_ref()).into_owned(),
                };
                push_text(&mut stack, text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_text(&mut stack, text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(quick_xml::Error::UnexpectedEof(_)) if !stack.is_empty() || !roots.is_empty() => {
                truncated = true;
                break;
            }
            Err(err) => {
                return Err(ParseError::syntax(format!(
                    "{err} at byte {}",
                    reader.buffer_position()
                )));
            }
        }
        buf.clear();
    }

    if !stack.is_empty() {
        truncated = true;
    }
    while let Some(el) = stack.pop() {
        attach(&mut stack, &mut roots, el, limits)?;
    }

    if roots.is_empty() {
        return Err(ParseError::new(
            ParseErrorCode::WrongShape,
            "no root element",
        ));
    }

    let is_plist = roots[0].name == "plist";
    let tree = if is_plist {
        plist_root_value(&roots[0])
    } else {
        let mut map = TreeMap::new();
        for root in &roots {
            insert_grouped(&mut map, &root.name, element_value(root));
        }
        ParseTree::Object(map)
    };

    Ok(XmlDocument {
        tree,
        is_plist,
        truncated,
    })
}

fn open_element(e: &BytesStart<'_>, limits: &CascadeLimits) -> Result<Element, ParseError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes().with_checks(false).flatten() {
        if attrs.len() >= limits.max_xml_attributes as usize {
            return Err(ParseError::new(
                ParseErrorCode::LimitExceeded,
                format!("<{name}> has more than {} attributes", limits.max_xml_attributes),
            ));
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [Element],
    roots: &mut Vec<Element>,
    el: Element,
    limits: &CascadeLimits,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            if parent.children.len() >= limits.max_xml_children as usize {
                return Err(ParseError::new(
                    ParseErrorCode::LimitExceeded,
                    format!("<{}> has more than {} children", parent.name, limits.max_xml_children),
                ));
            }
            parent.children.push(Node::Element(el));
        }
        None => roots.push(el),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Text(text));
    }
}

fn element_value(el: &Element) -> ParseTree {
    let text = el.text();
    let has_children = el.child_elements().next().is_some();
    if el.attrs.is_empty() && !has_children {
        if text.is_empty() {
            return ParseTree::Null;
        }
        return ParseTree::String(text);
    }

    let mut map = TreeMap::new();
    for (k, v) in &el.attrs {
        map.insert(format!("@{k}"), ParseTree::String(v.clone()));
    }
    if !text.is_empty() {
        map.insert("#text".to_string(), ParseTree::String(text));
    }
    for child in el.child_elements() {
        insert_grouped(&mut map, &child.name, element_value(child));
    }
    ParseTree::Object(map)
}

fn plist_root_value(root: &Element) -> ParseTree {
    let values: Vec<&Element> = root.child_elements().collect();
    match values.as_slice() {
        [] => ParseTree::Object(TreeMap::new()),
        [single] => plist_value(single),
        many => ParseTree::Array(many.iter().map(|e| plist_value(e)).collect()),
    }
}

fn plist_value(el: &Element) -> ParseTree {
    match el.name.as_str() {
        "dict" => {
            let mut map = TreeMap::new();
            let mut pending: Option<String> = None;
            for child in el.child_elements() {
                if child.name == "key" {
                    if let Some(dangling) = pending.replace(child.text()) {
                        map.insert(dangling, ParseTree::Null);
                    }
                } else if let Some(key) = pending.take() {
                    map.insert(key, plist_value(child));
                }
            }
            if let Some(dangling) = pending {
                map.insert(dangling, ParseTree::Null);
            }
            ParseTree::Object(map)
        }
        "array" => ParseTree::Array(el.child_elements().map(plist_value).collect()),
        "string" | "date" => ParseTree::String(el.text()),
        "data" => ParseTree::String(el.text().split_whitespace().collect()),
        "integer" => {
            let text = el.text();
            let t = text.trim();
            if let Ok(n) = t.parse::<i64>() {
                ParseTree::from(n)
            } else if let Ok(n) = t.parse::<u64>() {
                ParseTree::from(n)
            } else {
                ParseTree::String(text)
            }
        }
        "real" => {
            let text = el.text();
            text.trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(ParseTree::Number)
                .unwrap_or(ParseTree::String(text))
        }
        "true" => ParseTree::Bool(true),
        "false" => ParseTree::Bool(false),
        _ => element_value(el),
    }
}

#[derive(Debug)]
pub struct XmlStrategy;

impl ParseStrategy for XmlStrategy {
    fn id(&self) -> &'static str {
        "xml"
    }

    fn yields(&self) -> FileKind {
        FileKind::Xml
    }

    fn parse(&self, input: &ParseInput) -> Result<ParseTree, ParseError> {
        let text = String::from_utf8_lossy(crate::sniff::strip_bom(&input.bytes));
        parse_lenient(&text, &input.limits).map(|doc| doc.tree)
    }
}
