//! Projection of recognized network profiles onto one output schema, so an
//! Apple Wi-Fi payload and a Hotspot 2.0 management tree can be compared side
//! by side.

use core::fmt;

use cfgscrub_domain::ParseTree;
use serde::Serialize;

pub const APPLE_WIFI_PAYLOAD: &str = "com.apple.wifi.managed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    AppleWifi,
    Hotspot2MgmtTree,
    Generic,
}

impl MappingSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppleWifi => "apple_wifi",
            Self::Hotspot2MgmtTree => "hotspot2_mgmt_tree",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedProfile {
    pub source: MappingSource,
    pub friendly_name: Option<String>,
    pub domain: Option<String>,
    pub realm: Option<String>,
    pub eap_method: Option<String>,
    pub organization_identifiers: Vec<String>,
    pub roaming_consortiums: Vec<String>,
    pub ssid: Option<String>,
}

impl MappedProfile {
    fn empty(source: MappingSource) -> Self {
        Self {
            source,
            friendly_name: None,
            domain: None,
            realm: None,
            eap_method: None,
            organization_identifiers: Vec::new(),
            roaming_consortiums: Vec::new(),
            ssid: None,
        }
    }

    fn resolved_fields(&self) -> usize {
        [
            self.friendly_name.is_some(),
            self.domain.is_some(),
            self.realm.is_some(),
            self.eap_method.is_some(),
            !self.organization_identifiers.is_empty(),
            !self.roaming_consortiums.is_empty(),
        ]
        .into_iter()
        .filter(|b| *b)
        .count()
    }

    pub fn to_tree(&self) -> ParseTree {
        serde_json::to_value(self).unwrap_or(ParseTree::Null)
    }
}

pub fn map_profile(tree: &ParseTree) -> Option<MappedProfile> {
    apple_wifi(tree)
        .or_else(|| mgmt_tree(tree))
        .or_else(|| generic(tree))
}

pub fn eap_method_name(v: &ParseTree) -> Option<String> {
    let raw = scalar_text(v)?;
    let Ok(n) = raw.trim().parse::<u32>() else {
        return Some(raw);
    };
    let name = match n {
        13 => "EAP-TLS",
        17 => "LEAP",
        18 => "EAP-SIM",
        21 => "EAP-TTLS",
        23 => "EAP-AKA",
        25 => "PEAP",
        43 => "EAP-FAST",
        50 => "EAP-AKA'",
        other => return Some(format!("EAP-{other}")),
    };
    Some(name.to_string())
}

fn scalar_text(v: &ParseTree) -> Option<String> {
    match v {
        ParseTree::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        ParseTree::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_list(v: &ParseTree) -> Vec<String> {
    match v {
        ParseTree::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other)
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn find_wifi_payload(tree: &ParseTree) -> Option<&ParseTree> {
    let is_wifi = |v: &ParseTree| v.get("PayloadType").and_then(ParseTree::as_str) == Some(APPLE_WIFI_PAYLOAD);
    if is_wifi(tree) {
        return Some(tree);
    }
    match tree.get("PayloadContent")? {
        ParseTree::Array(items) => items.iter().find(|&v| is_wifi(v)),
        single => is_wifi(single).then_some(single),
    }
}

fn apple_wifi(tree: &ParseTree) -> Option<MappedProfile> {
    let payload = find_wifi_payload(tree)?;
    let field = |key: &str| payload.get(key).and_then(scalar_text);

    let mut out = MappedProfile::empty(MappingSource::AppleWifi);
    out.friendly_name = field("DisplayedOperatorName")
        .or_else(|| field("PayloadDisplayName"))
        .or_else(|| tree.get("PayloadDisplayName").and_then(scalar_text));
    out.domain = field("DomainName");
    out.realm = payload
        .get("NAIRealmNames")
        .map(text_list)
        .and_then(|realms| realms.into_iter().next());
    out.eap_method = payload
        .pointer("/EAPClientConfiguration/AcceptEAPTypes")
        .and_then(|types| match types {
            ParseTree::Array(items) => items.first(),
            single => Some(single),
        })
        .and_then(eap_method_name);
    out.roaming_consortiums = payload
        .get("RoamingConsortiumOIs")
        .map(text_list)
        .unwrap_or_default();
    out.ssid = field("SSID_STR");
    Some(out)
}

fn find_key<'a>(tree: &'a ParseTree, key: &str) -> Option<&'a ParseTree> {
    match tree {
        ParseTree::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        ParseTree::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

/// `NodeName`/`Value` pairs of an OMA-DM management tree, in document order.
fn flatten_nodes(node: &ParseTree, out: &mut Vec<(String, ParseTree)>) {
    match node {
        ParseTree::Array(items) => items.iter().for_each(|n| flatten_nodes(n, out)),
        ParseTree::Object(map) => {
            if let Some(name) = map.get("NodeName").and_then(scalar_text)
                && let Some(value) = map.get("Value")
            {
                out.push((name, value.clone()));
            }
            if let Some(children) = map.get("Node") {
                flatten_nodes(children, out);
            }
        }
        _ => {}
    }
}

fn mgmt_tree(tree: &ParseTree) -> Option<MappedProfile> {
    let root = find_key(tree, "MgmtTree")?;
    let mut pairs = Vec::new();
    flatten_nodes(root.get("Node")?, &mut pairs);

    let first = |name: &str| {
        pairs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    };
    let all = |name: &str| -> Vec<String> {
        pairs
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| text_list(v))
            .collect()
    };

    let mut out = MappedProfile::empty(MappingSource::Hotspot2MgmtTree);
    out.friendly_name = first("FriendlyName").and_then(scalar_text);
    out.domain = first("FQDN").and_then(scalar_text);
    out.realm = first("Realm").and_then(scalar_text);
    out.eap_method = first("EAPType").and_then(eap_method_name);
    out.organization_identifiers = all("HomeOI");
    out.roaming_consortiums = all("RoamingConsortiumOI");
    Some(out)
}

fn collect_leaves(tree: &ParseTree, out: &mut Vec<(String, ParseTree)>) {
    match tree {
        ParseTree::Object(map) => {
            for (k, v) in map {
                match v {
                    ParseTree::Object(_) => collect_leaves(v, out),
                    ParseTree::Array(items) if items.iter().any(|i| i.is_object()) => {
                        collect_leaves(v, out)
                    }
                    _ => out.push((k.to_ascii_lowercase(), v.clone())),
                }
            }
        }
        ParseTree::Array(items) => items.iter().for_each(|v| collect_leaves(v, out)),
        _ => {}
    }
}

fn generic(tree: &ParseTree) -> Option<MappedProfile> {
    let mut leaves = Vec::new();
    collect_leaves(tree, &mut leaves);
    let lookup = |names: &[&str]| {
        leaves
            .iter()
            .find(|(k, _)| names.contains(&k.as_str()))
            .map(|(_, v)| v)
    };

    let mut out = MappedProfile::empty(MappingSource::Generic);
    out.friendly_name = lookup(&["friendlyname", "displayedoperatorname"]).and_then(scalar_text);
    out.domain = lookup(&["domain", "fqdn", "domainname"]).and_then(scalar_text);
    out.realm = lookup(&["realm", "nairealm"]).and_then(scalar_text);
    out.eap_method = lookup(&["eapmethod", "eaptype"]).and_then(eap_method_name);
    out.organization_identifiers = lookup(&["organizationidentifiers", "homeoi"])
        .map(text_list)
        .unwrap_or_default();
    out.roaming_consortiums = lookup(&["roamingconsortiums", "roamingconsortiumoi", "roamingconsortiumois"])
        .map(text_list)
        .unwrap_or_default();
    out.ssid = lookup(&["ssid", "ssid_str"]).and_then(scalar_text);

    (out.resolved_fields() >= 2).then_some(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn eap_numbers_map_to_names() {
        assert_eq!(eap_method_name(&json!(21)).as_deref(), Some("EAP-TTLS"));
        assert_eq!(eap_method_name(&json!("13")).as_deref(), Some("EAP-TLS"));
        assert_eq!(eap_method_name(&json!(99)).as_deref(), Some("EAP-99"));
        assert_eq!(eap_method_name(&json!("PEAP")).as_deref(), Some("PEAP"));
        assert_eq!(eap_method_name(&json!(null)), None);
    }

    #[test]
    fn comma_separated_lists_are_split() {
        assert_eq!(text_list(&json!("5A03BA, 4096")), vec!["5A03BA", "4096"]);
        assert_eq!(text_list(&json!(["AA", 12])), vec!["AA", "12"]);
    }

    #[test]
    fn generic_needs_two_fields() {
        assert!(generic(&json!({"realm": "example.com"})).is_none());
        let mapped = generic(&json!({"net": {"Realm": "example.com", "FQDN": "hs.example.com"}}))
            .expect("two fields resolve");
        assert_eq!(mapped.domain.as_deref(), Some("hs.example.com"));
        assert_eq!(mapped.source, MappingSource::Generic);
    }
}
