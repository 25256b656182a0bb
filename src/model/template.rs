use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::CoreError;
use crate::model::{InternalRef, RelationshipType};

/// Identity key of a template: (category, type, subtype, version).
/// Version is a MAJOR.MINOR string, e.g. "1.0".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateKey {
    pub category: String,
    #[serde(rename = "type")]
    pub template_type: String,
    pub subtype: String,
    pub version: String,
}

impl TemplateKey {
    pub fn new(
        category: impl Into<String>,
        template_type: impl Into<String>,
        subtype: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            template_type: template_type.into(),
            subtype: subtype.into(),
            version: version.into(),
        }
    }

    /// Canonical code string `{category}/{type}/{subtype}/{version}/`.
    /// The trailing slash is significant.
    pub fn code(&self) -> String {
        format!(
            "{}/{}/{}/{}/",
            self.category, self.template_type, self.subtype, self.version
        )
    }

    /// Parse a code string back into a key. Requires exactly four
    /// non-empty segments and the trailing slash.
    pub fn parse_code(code: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidTemplateDefinition {
            reason: format!("malformed template code {:?}", code),
        };
        let body = code.strip_suffix('/').ok_or_else(invalid)?;
        let segments: Vec<&str> = body.split('/').collect();
        if segments.len() != 4 || segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }
        Ok(Self::new(segments[0], segments[1], segments[2], segments[3]))
    }

    /// Polymorphic discriminator recorded on every instance row.
    pub fn discriminator(&self) -> String {
        format!("{}_instance", self.category)
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Rule for auto-creating child instances when a parent is materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiationLayout {
    pub name: String,
    /// Template code of the child template.
    pub target: String,
    pub count: usize,
    /// Naming pattern stored into the child's `name` property;
    /// supports `{parent}` (parent EUID) and `{n}` (1-based index).
    pub naming_pattern: String,
    pub relationship_type: RelationshipType,
}

/// A named, versioned blueprint. Never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Internal reference used by instance rows to join back here.
    pub internal: InternalRef,
    pub name: String,
    #[serde(flatten)]
    pub key: TemplateKey,
    pub is_singleton: bool,
    /// Registered EUID prefix for instances of this template.
    pub id_prefix: String,
    /// Default property map applied to new instances.
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instantiation_layouts: Vec<InstantiationLayout>,
    /// Capability metadata consumed by callers, opaque to this core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_groups: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<serde_json::Value>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn code(&self) -> String {
        self.key.code()
    }

    pub fn layout(&self, name: &str) -> Option<&InstantiationLayout> {
        self.instantiation_layouts.iter().find(|l| l.name == name)
    }

    /// Content equality ignoring the internal reference and attribution,
    /// used to make re-registration of an identical definition a no-op.
    pub fn same_definition(&self, def: &TemplateDefinition) -> bool {
        self.is_singleton == def.is_singleton
            && self.id_prefix == def.id_prefix
            && self.properties == def.properties
            && self.instantiation_layouts == def.instantiation_layouts
            && self.action_groups == def.action_groups
            && self.actions == def.actions
    }
}

/// One version entry of the template document format: the fields a
/// configuration file supplies, without name/version (those are the
/// document keys) and without store-assigned fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub category: String,
    #[serde(rename = "type")]
    pub template_type: String,
    pub subtype: String,
    #[serde(default)]
    pub is_singleton: bool,
    pub id_prefix: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub instantiation_layouts: Vec<InstantiationLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_groups: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<serde_json::Value>,
}

impl TemplateDefinition {
    pub fn key(&self, version: &str) -> TemplateKey {
        TemplateKey::new(
            self.category.clone(),
            self.template_type.clone(),
            self.subtype.clone(),
            version,
        )
    }
}

/// Language-neutral template document: top-level key is the template
/// name, nested by version string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateDocument(pub HashMap<String, HashMap<String, TemplateDefinition>>);

impl TemplateDocument {
    /// Flatten into (name, version, definition) triples, sorted by name
    /// then version so document loading is deterministic.
    pub fn entries(&self) -> Vec<(String, String, TemplateDefinition)> {
        let mut out: Vec<_> = self
            .0
            .iter()
            .flat_map(|(name, versions)| {
                versions
                    .iter()
                    .map(|(version, def)| (name.clone(), version.clone(), def.clone()))
            })
            .collect();
        out.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        out
    }
}
