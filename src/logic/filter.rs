use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Instance;

/// Filter expression over instance property bags, deserialized from
/// JSON. Consumed by the read-only query layer; never mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterExpr {
    /// Logical AND - all conditions must hold
    All { all: Vec<FilterExpr> },
    /// Logical OR - any condition must hold
    Any { any: Vec<FilterExpr> },
    /// Logical NOT
    Not { not: Box<FilterExpr> },
    Eq { eq: (PropertyPath, Value) },
    Ne { ne: (PropertyPath, Value) },
    Gt { gt: (PropertyPath, Value) },
    Gte { gte: (PropertyPath, Value) },
    Lt { lt: (PropertyPath, Value) },
    Lte { lte: (PropertyPath, Value) },
    In { r#in: (PropertyPath, Vec<Value>) },
    NotIn { not_in: (PropertyPath, Vec<Value>) },
    /// Substring check on a string property
    Contains { contains: (PropertyPath, String) },
    Exists { exists: PropertyPath },
    NotExists { not_exists: PropertyPath },
    /// Structured containment: the instance document contains the given
    /// partial document, e.g. `{"matches": {"properties": {"type": "x"}}}`.
    Matches { matches: Value },
}

/// Path into an instance: `$.prop` reads the property bag; the reserved
/// paths `$.__euid`, `$.__discriminator`, `$.__template` and
/// `$.__status` read row metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPath(pub String);

impl PropertyPath {
    pub fn extract(&self, instance: &Instance) -> Result<Option<Value>> {
        let path = &self.0;
        match path.as_str() {
            "$.__euid" => return Ok(Some(Value::String(instance.euid.to_string()))),
            "$.__discriminator" => {
                return Ok(Some(Value::String(instance.discriminator.clone())))
            }
            "$.__template" => return Ok(Some(Value::String(instance.template_code.clone()))),
            "$.__status" => return Ok(Some(Value::String(instance.status.clone()))),
            _ => {}
        }
        let prop_name = path
            .strip_prefix("$.")
            .ok_or_else(|| anyhow!("invalid property path: {}", path))?;
        Ok(instance.properties.get(prop_name).cloned())
    }
}

/// Recursive subset match: `partial` is contained in `document` when
/// every key/element of `partial` appears in `document` with a value
/// that itself contains the corresponding partial value.
pub fn json_contains(document: &Value, partial: &Value) -> bool {
    match (document, partial) {
        (Value::Object(doc), Value::Object(part)) => part
            .iter()
            .all(|(key, value)| doc.get(key).is_some_and(|d| json_contains(d, value))),
        (Value::Array(doc), Value::Array(part)) => part
            .iter()
            .all(|value| doc.iter().any(|d| json_contains(d, value))),
        _ => document == partial,
    }
}

/// Project an instance into the document shape `Matches` queries see.
fn instance_document(instance: &Instance) -> Value {
    serde_json::json!({
        "euid": instance.euid.to_string(),
        "discriminator": instance.discriminator,
        "template": instance.template_code,
        "status": instance.status,
        "properties": instance.properties,
    })
}

pub fn evaluate_filter(instance: &Instance, filter: &FilterExpr) -> Result<bool> {
    match filter {
        FilterExpr::All { all } => {
            for expr in all {
                if !evaluate_filter(instance, expr)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        FilterExpr::Any { any } => {
            for expr in any {
                if evaluate_filter(instance, expr)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        FilterExpr::Not { not } => Ok(!evaluate_filter(instance, not)?),
        FilterExpr::Eq { eq: (path, value) } => Ok(path.extract(instance)?.as_ref() == Some(value)),
        FilterExpr::Ne { ne: (path, value) } => Ok(path.extract(instance)?.as_ref() != Some(value)),
        FilterExpr::Gt { gt: (path, value) } => {
            compare(path.extract(instance)?.as_ref(), value, |ord| ord.is_gt())
        }
        FilterExpr::Gte { gte: (path, value) } => {
            compare(path.extract(instance)?.as_ref(), value, |ord| ord.is_ge())
        }
        FilterExpr::Lt { lt: (path, value) } => {
            compare(path.extract(instance)?.as_ref(), value, |ord| ord.is_lt())
        }
        FilterExpr::Lte { lte: (path, value) } => {
            compare(path.extract(instance)?.as_ref(), value, |ord| ord.is_le())
        }
        FilterExpr::In { r#in: (path, values) } => Ok(path
            .extract(instance)?
            .map(|v| values.contains(&v))
            .unwrap_or(false)),
        FilterExpr::NotIn { not_in: (path, values) } => Ok(path
            .extract(instance)?
            // a missing property is trivially not in the list
            .map(|v| !values.contains(&v))
            .unwrap_or(true)),
        FilterExpr::Contains { contains: (path, substring) } => {
            match path.extract(instance)? {
                Some(Value::String(s)) => Ok(s.contains(substring)),
                _ => Ok(false),
            }
        }
        FilterExpr::Exists { exists: path } => Ok(path.extract(instance)?.is_some()),
        FilterExpr::NotExists { not_exists: path } => Ok(path.extract(instance)?.is_none()),
        FilterExpr::Matches { matches } => Ok(json_contains(&instance_document(instance), matches)),
    }
}

/// Ordered comparison: numbers numerically, strings lexicographically
/// (numeric when both sides parse), everything else incomparable.
fn compare<F>(left: Option<&Value>, right: &Value, accept: F) -> Result<bool>
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let ordering = match (left, right) {
        (Some(Value::Number(l)), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(lf), Some(rf)) => lf.partial_cmp(&rf),
            _ => None,
        },
        (Some(Value::String(l)), Value::String(r)) => {
            match (l.parse::<f64>(), r.parse::<f64>()) {
                (Ok(lf), Ok(rf)) => lf.partial_cmp(&rf),
                _ => Some(l.as_str().cmp(r.as_str())),
            }
        }
        (Some(Value::Number(l)), Value::String(r)) => match (l.as_f64(), r.parse::<f64>()) {
            (Some(lf), Ok(rf)) => lf.partial_cmp(&rf),
            _ => None,
        },
        (Some(Value::String(l)), Value::Number(r)) => match (l.parse::<f64>(), r.as_f64()) {
            (Ok(lf), Some(rf)) => lf.partial_cmp(&rf),
            _ => None,
        },
        _ => None,
    };
    Ok(ordering.map(accept).unwrap_or(false))
}

/// Filter a list of instances in memory; the primary query-layer entry.
pub fn filter_instances(instances: Vec<Instance>, filter: &FilterExpr) -> Vec<Instance> {
    instances
        .into_iter()
        .filter(|instance| evaluate_filter(instance, filter).unwrap_or(false))
        .collect()
}

pub fn parse_filter_expr(value: Value) -> Result<FilterExpr> {
    serde_json::from_value(value).map_err(|e| anyhow!("failed to parse filter expression: {}", e))
}
