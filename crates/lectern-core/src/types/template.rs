//! Export templates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ExportSettings;

/// A file copied next to the intermediate markup before compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateAsset {
    /// File name relative to the compile directory.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A named, versioned rendering recipe.
///
/// `skeleton` is LaTeX with `{{title}}`, `{{body}}` and optional `{{meta.<key>}}`
/// and `{{settings.<name>}}` placeholders. `slots` maps block slot names to fragments; `fallback` renders
/// any block without a matching slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub description: String,
    pub skeleton: String,
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<TemplateAsset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Settings used when an export job does not override them.
    #[serde(default)]
    pub default_settings: ExportSettings,
}

fn default_fallback() -> String {
    "{{text}}\n\n".to_string()
}

impl Template {
    /// Create a template with no slot rules.
    pub fn new(id: impl Into<String>, name: impl Into<String>, skeleton: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: 1,
            description: String::new(),
            skeleton: skeleton.into(),
            slots: BTreeMap::new(),
            fallback: default_fallback(),
            assets: Vec::new(),
            tags: Vec::new(),
            default_settings: ExportSettings::default(),
        }
    }

    /// Builder: set the version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Builder: add a slot rule.
    pub fn with_slot(mut self, slot: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.slots.insert(slot.into(), fragment.into());
        self
    }

    /// Builder: set the generic fallback fragment.
    pub fn with_fallback(mut self, fragment: impl Into<String>) -> Self {
        self.fallback = fragment.into();
        self
    }

    /// Builder: attach an asset.
    pub fn with_asset(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.assets.push(TemplateAsset {
            name: name.into(),
            bytes,
        });
        self
    }

    /// Builder: set the default export settings.
    pub fn with_default_settings(mut self, settings: ExportSettings) -> Self {
        self.default_settings = settings;
        self
    }

    /// Builder: add tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Key used to lock a version: `<id>@<version>`.
    pub fn version_key(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    /// SHA-256 over the rendering-relevant content (everything but tags and description).
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.skeleton.as_bytes());
        for (slot, fragment) in &self.slots {
            hasher.update(slot.as_bytes());
            hasher.update([0u8]);
            hasher.update(fragment.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.fallback.as_bytes());
        for asset in &self.assets {
            hasher.update(asset.name.as_bytes());
            hasher.update(&asset.bytes);
        }
        if let Ok(settings) = serde_json::to_vec(&self.default_settings) {
            hasher.update(settings);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_ignores_tags() {
        let a = Template::new("t", "T", "{{body}}").with_slot("paragraph", "{{text}}\n");
        let b = a.clone().with_tags(vec!["slides".into()]);
        assert_eq!(a.content_digest(), b.content_digest());

        let c = a.clone().with_slot("paragraph", "\\textit{{{text}}}\n");
        assert_ne!(a.content_digest(), c.content_digest());

        let d = a.clone().with_default_settings(ExportSettings::default().with_table_of_contents(true));
        assert_ne!(a.content_digest(), d.content_digest());
    }

    #[test]
    fn test_fallback_default_on_deserialize() {
        let t: Template =
            serde_json::from_str(r#"{"id":"x","name":"X","version":2,"skeleton":"{{body}}"}"#).unwrap();
        assert_eq!(t.fallback, "{{text}}\n\n");
        assert_eq!(t.version_key(), "x@2");
    }
}
