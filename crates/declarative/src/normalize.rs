//! State normalization - canonical comparison form of property values
//!
//! Providers rarely echo values back in the shape they were submitted: a
//! port list of one comes back as a bare number, numbers come back as
//! strings, duplicates get collapsed. Every property declares a
//! [`Normalization`] strategy, and both the desired and the observed value go
//! through it before comparison.
//!
//! Normalized values are only ever compared. They are never sent to a
//! provider or persisted.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// How a property value is canonicalized before comparison
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Compare the structure verbatim
    #[default]
    Exact,
    /// Numbers and booleans compare by their string form (`5` == `"5"`)
    Scalar,
    /// Object whose leaf values compare as [`Normalization::Scalar`]
    StringMap,
    /// Structured rule entry; the named fields hold port specifiers
    Rule { port_fields: Vec<String> },
}

impl Normalization {
    /// Rule normalization over the given port fields.
    pub fn rule(port_fields: &[&str]) -> Self {
        Self::Rule {
            port_fields: port_fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

/// Canonical form of a property value
///
/// Equality, ordering and hashing go through the canonical JSON text
/// (object keys sorted), so two values are equal exactly when their
/// canonical forms are byte-identical.
#[derive(Debug, Clone)]
pub struct NormalizedValue {
    value: Value,
    canonical: String,
}

impl NormalizedValue {
    fn new(value: Value) -> Self {
        let value = sort_keys(&value);
        let canonical = value.to_string();
        Self { value, canonical }
    }

    /// Canonical form of a whole set: its elements as a sorted array.
    pub fn from_set(set: &BTreeSet<Self>) -> Self {
        Self::new(Value::Array(set.iter().map(|v| v.value.clone()).collect()))
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Canonical text of the value
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for NormalizedValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for NormalizedValue {}

impl Hash for NormalizedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for NormalizedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NormalizedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Normalize a single value with the given strategy.
///
/// Never fails; malformed values are rejected earlier by validation.
pub fn normalize(strategy: &Normalization, value: &Value) -> NormalizedValue {
    let normalized = match strategy {
        Normalization::Exact => value.clone(),
        Normalization::Scalar => coerce_scalar(value),
        Normalization::StringMap => match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), coerce_scalar(v)))
                    .collect(),
            ),
            other => coerce_scalar(other),
        },
        Normalization::Rule { port_fields } => normalize_rule(value, port_fields),
    };
    NormalizedValue::new(normalized)
}

/// Normalize every element of a set-valued property.
///
/// A bare scalar or object counts as a list of one and null as the empty
/// list. Duplicates collapse because the result is a set.
pub fn normalize_set(strategy: &Normalization, value: &Value) -> BTreeSet<NormalizedValue> {
    match value {
        Value::Null => BTreeSet::new(),
        Value::Array(items) => items.iter().map(|item| normalize(strategy, item)).collect(),
        single => BTreeSet::from([normalize(strategy, single)]),
    }
}

/// Rebuild objects with keys in sorted order, whatever map backend serde_json uses.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Numbers and booleans to their string form, recursively through arrays.
fn coerce_scalar(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(coerce_scalar).collect()),
        other => other.clone(),
    }
}

/// Canonicalize the port fields of one rule.
///
/// Works on a copy: the caller's rule is never touched. For every port field
/// present: entries are coerced to integers where possible, null and empty
/// entries dropped, duplicates removed and the rest sorted. A single
/// remaining entry collapses to a bare scalar; an empty result removes the
/// field.
pub fn normalize_rule(rule: &Value, port_fields: &[String]) -> Value {
    let Value::Object(fields) = rule else {
        return rule.clone();
    };

    let mut copy: Map<String, Value> = fields.clone();
    for field in port_fields {
        let Some(spec) = copy.remove(field) else {
            continue;
        };

        let entries: Vec<&Value> = match &spec {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        let mut ports: BTreeMap<PortKey, Value> = BTreeMap::new();
        for entry in entries {
            if let Some((key, port)) = canonical_port(entry) {
                ports.entry(key).or_insert(port);
            }
        }

        let mut ports: Vec<Value> = ports.into_values().collect();
        match ports.len() {
            0 => {}
            1 => {
                copy.insert(field.clone(), ports.remove(0));
            }
            _ => {
                copy.insert(field.clone(), Value::Array(ports));
            }
        }
    }
    Value::Object(copy)
}

/// Sort key for port entries: numbers first, ascending, then everything else
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PortKey {
    Number(i64),
    Text(String),
}

fn canonical_port(entry: &Value) -> Option<(PortKey, Value)> {
    match entry {
        Value::Null => None,
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some((PortKey::Number(i), Value::from(i))),
            None => Some((PortKey::Text(n.to_string()), entry.clone())),
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<i64>() {
                Ok(i) => Some((PortKey::Number(i), Value::from(i))),
                Err(_) => Some((
                    PortKey::Text(trimmed.to_string()),
                    Value::String(trimmed.to_string()),
                )),
            }
        }
        Value::Array(items) if items.is_empty() => None,
        other => Some((PortKey::Text(other.to_string()), other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule() -> Normalization {
        Normalization::rule(&["port"])
    }

    #[test]
    fn test_port_duplicates_collapse_to_scalar() {
        let normalized = normalize(&rule(), &json!({"protocol": "tcp", "port": ["22", "22", 22]}));
        assert_eq!(normalized.value(), &json!({"protocol": "tcp", "port": 22}));
    }

    #[test]
    fn test_port_of_only_nulls_is_removed() {
        let normalized = normalize(&rule(), &json!({"protocol": "tcp", "port": [null]}));
        assert_eq!(normalized.value(), &json!({"protocol": "tcp"}));
    }

    #[test]
    fn test_port_holes_and_empty_strings_are_dropped() {
        let normalized = normalize(&rule(), &json!({"port": [443, null, "", "80"]}));
        assert_eq!(normalized.value(), &json!({"port": [80, 443]}));
    }

    #[test]
    fn test_port_order_does_not_matter() {
        let a = normalize(&rule(), &json!({"port": [443, 80], "cidr": "0.0.0.0/0"}));
        let b = normalize(&rule(), &json!({"cidr": "0.0.0.0/0", "port": ["80", 443, 80]}));
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_bare_port_matches_list_of_one() {
        let a = normalize(&rule(), &json!({"port": 22}));
        let b = normalize(&rule(), &json!({"port": ["22"]}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_numeric_ports_are_kept() {
        let normalized = normalize(&rule(), &json!({"port": ["8000-8100", 22]}));
        assert_eq!(normalized.value(), &json!({"port": [22, "8000-8100"]}));
    }

    #[test]
    fn test_rule_without_port_is_unchanged() {
        let value = json!({"protocol": "icmp", "cidr": "10.0.0.0/8"});
        assert_eq!(normalize(&rule(), &value).value(), &value);
    }

    #[test]
    fn test_other_rule_fields_require_exact_match() {
        let a = normalize(&rule(), &json!({"cidr": ["10.0.0.0/8", "10.0.0.0/8"]}));
        let b = normalize(&rule(), &json!({"cidr": "10.0.0.0/8"}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalization_does_not_mutate_input() {
        let value = json!({"port": ["22", "22"]});
        let before = value.clone();
        let _ = normalize(&rule(), &value);
        assert_eq!(value, before);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            json!({"port": ["22", "22", 22]}),
            json!({"port": [null]}),
            json!({"port": [443, "80", null, "x"], "protocol": "tcp"}),
            json!({"security_group": "other"}),
        ];
        for input in inputs {
            let once = normalize(&rule(), &input);
            let twice = normalize(&rule(), once.value());
            assert_eq!(once, twice, "not idempotent for {input}");
        }

        let scalar = normalize(&Normalization::Scalar, &json!(5));
        assert_eq!(normalize(&Normalization::Scalar, scalar.value()), scalar);
    }

    #[test]
    fn test_set_treats_bare_value_as_list_of_one() {
        let bare = normalize_set(&rule(), &json!({"port": 22}));
        let list = normalize_set(&rule(), &json!([{"port": "22"}, {"port": [22, 22]}]));
        assert_eq!(bare, list);
        assert!(normalize_set(&rule(), &Value::Null).is_empty());
    }

    #[test]
    fn test_from_set_is_sorted_array() {
        let set = normalize_set(&Normalization::Scalar, &json!(["b", "a", "b"]));
        assert_eq!(NormalizedValue::from_set(&set).value(), &json!(["a", "b"]));
    }

    #[test]
    fn test_scalar_coerces_numbers_and_booleans() {
        assert_eq!(
            normalize(&Normalization::Scalar, &json!(5)),
            normalize(&Normalization::Scalar, &json!("5"))
        );
        assert_eq!(
            normalize(&Normalization::Scalar, &json!(false)),
            normalize(&Normalization::Scalar, &json!("false"))
        );
        assert_ne!(
            normalize(&Normalization::Scalar, &json!("us-east-1")),
            normalize(&Normalization::Scalar, &json!("us-west-2"))
        );
    }

    #[test]
    fn test_string_map_ignores_key_order_and_coerces_leaves() {
        let a = normalize(&Normalization::StringMap, &json!({"team": "web", "tier": 1}));
        let b = normalize(&Normalization::StringMap, &json!({"tier": "1", "team": "web"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_exact_keeps_types() {
        assert_ne!(
            normalize(&Normalization::Exact, &json!(5)),
            normalize(&Normalization::Exact, &json!("5"))
        );
    }
}
