//! Structural schema for greenhouse submissions.
//!
//! The schema is a declarative JSON definition loaded once at startup
//! (`SCHEMA_PATH`). It describes the element tree a submission must follow,
//! the simple types of attribute and text values, and identity constraints
//! (unique keys and key references) between elements.
//!
//! Validation happens in two steps: the raw text must parse as well-formed
//! XML ([`SchemaError::Malformed`]) and the parsed tree must then satisfy the
//! definition ([`SchemaError::Violation`]). A validator whose definition could
//! not be loaded answers every request with [`SchemaError::Unavailable`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use roxmltree::{Document, Node, ParsingOptions};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, error, info};

// ---

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{0}")]
    Malformed(String),

    #[error("{0}")]
    Violation(String),

    #[error("schema definition is not available")]
    Unavailable,
}

/// Value types for attributes and text content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimpleType {
    /// Any text.
    #[default]
    String,
    /// Non-empty text without whitespace.
    Token,
    /// Identifier safe to use as a file stem: `[A-Za-z0-9_][A-Za-z0-9_.-]*`.
    Id,
    /// Plain decimal number, optional sign, no exponent.
    Decimal,
    /// ISO-8601 date-time, with or without an offset.
    DateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDef {
    // ---
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type")]
    pub value_type: SimpleType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    #[default]
    Empty,
    Text {
        #[serde(default, rename = "type")]
        value_type: SimpleType,
    },
    Sequence {
        children: Vec<Particle>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementDef {
    // ---
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub content: Content,
}

/// One slot in a sequence: an element and how often it may repeat.
///
/// `max_occurs` is `None` when the JSON says `"unbounded"`.
#[derive(Debug, Clone, Deserialize)]
pub struct Particle {
    // ---
    pub element: ElementDef,
    #[serde(default = "one")]
    pub min_occurs: u32,
    #[serde(default = "one_bounded", deserialize_with = "de_max_occurs")]
    pub max_occurs: Option<u32>,
}

/// Values of `field` on the elements reached by `selector` must be unique.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyDef {
    // ---
    pub name: String,
    pub selector: String,
    pub field: String,
}

/// Values of `field` on the elements reached by `selector` must exist in
/// the key named by `refer`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyRefDef {
    // ---
    pub name: String,
    pub refer: String,
    pub selector: String,
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDefinition {
    // ---
    pub root: ElementDef,
    #[serde(default)]
    pub keys: Vec<KeyDef>,
    #[serde(default)]
    pub keyrefs: Vec<KeyRefDef>,
}

fn one() -> u32 {
    1
}

fn one_bounded() -> Option<u32> {
    Some(1)
}

fn de_max_occurs<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if s == "unbounded" => Ok(None),
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid max_occurs: {n}"))),
        other => Err(D::Error::custom(format!("invalid max_occurs: {other}"))),
    }
}

impl SchemaDefinition {
    /// Read and check a definition file.
    pub fn from_file(path: &Path) -> Result<Self> {
        // ---
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read schema definition '{}'", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("invalid schema definition '{}'", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        // ---
        let definition: SchemaDefinition = serde_json::from_str(text)?;
        definition.check()?;
        Ok(definition)
    }

    /// Reject definitions that could never validate anything sensibly.
    fn check(&self) -> Result<()> {
        // ---
        check_element(&self.root)?;

        let mut key_names = HashSet::new();
        for key in &self.keys {
            if key.selector.trim().is_empty() || key.field.is_empty() {
                bail!("key '{}' needs a selector and a field", key.name);
            }
            if !key_names.insert(key.name.as_str()) {
                bail!("duplicate key name '{}'", key.name);
            }
        }
        for keyref in &self.keyrefs {
            if !key_names.contains(keyref.refer.as_str()) {
                bail!(
                    "keyref '{}' refers to unknown key '{}'",
                    keyref.name,
                    keyref.refer
                );
            }
            if keyref.selector.trim().is_empty() || keyref.field.is_empty() {
                bail!("keyref '{}' needs a selector and a field", keyref.name);
            }
        }
        Ok(())
    }
}

fn check_element(def: &ElementDef) -> Result<()> {
    // ---
    if def.name.is_empty() {
        return Err(anyhow!("element definition without a name"));
    }
    if let Content::Sequence { children } = &def.content {
        for particle in children {
            if let Some(max) = particle.max_occurs {
                if max == 0 || particle.min_occurs > max {
                    bail!(
                        "element <{}> has min_occurs {} above max_occurs {}",
                        particle.element.name,
                        particle.min_occurs,
                        max
                    );
                }
            }
            check_element(&particle.element)?;
        }
    }
    Ok(())
}

// ---

/// Validates raw submissions against a loaded [`SchemaDefinition`].
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    definition: Option<SchemaDefinition>,
}

impl SchemaValidator {
    pub fn new(definition: SchemaDefinition) -> Self {
        Self {
            definition: Some(definition),
        }
    }

    /// A validator that fails every request with [`SchemaError::Unavailable`].
    pub fn unavailable() -> Self {
        Self { definition: None }
    }

    /// Load the definition from disk.
    ///
    /// A missing or invalid definition is logged and produces an unavailable
    /// validator instead of failing startup.
    pub fn load(path: &Path) -> Self {
        // ---
        match SchemaDefinition::from_file(path) {
            Ok(definition) => {
                info!(path = %path.display(), "schema definition loaded");
                Self::new(definition)
            }
            Err(e) => {
                let detail = format!("{e:#}");
                error!(path = %path.display(), error = %detail, "failed to load schema definition");
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.definition.is_some()
    }

    /// Parse `text` and check it against the schema.
    pub fn validate<'a>(&self, text: &'a str) -> std::result::Result<Document<'a>, SchemaError> {
        // ---
        let definition = self.definition.as_ref().ok_or(SchemaError::Unavailable)?;

        if text.trim().is_empty() {
            return Err(SchemaError::Malformed("document is empty".to_string()));
        }

        let doc = parse_document(text)
            .map_err(|e| SchemaError::Malformed(format!("not well-formed XML: {e}")))?;

        validate_element(&doc, doc.root_element(), &definition.root)?;
        validate_identity(&doc, definition)?;

        debug!("schema validation passed");
        Ok(doc)
    }
}

/// Parse XML the way every stage reads it. A DOCTYPE is allowed.
pub(crate) fn parse_document(text: &str) -> std::result::Result<Document<'_>, roxmltree::Error> {
    // ---
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options)
}

/// Every text piece of `node` joined; comments and processing instructions
/// between them are dropped.
pub(crate) fn element_text(node: Node) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect()
}

fn violation(doc: &Document, node: Node, message: String) -> SchemaError {
    // ---
    let pos = doc.text_pos_at(node.range().start);
    SchemaError::Violation(format!("line {}: {}", pos.row, message))
}

fn validate_element(
    doc: &Document,
    node: Node,
    def: &ElementDef,
) -> std::result::Result<(), SchemaError> {
    // ---
    let name = node.tag_name().name();
    if name != def.name {
        return Err(violation(
            doc,
            node,
            format!("expected element <{}>, found <{}>", def.name, name),
        ));
    }

    for attr in node.attributes() {
        if !def.attributes.iter().any(|a| a.name == attr.name()) {
            return Err(violation(
                doc,
                node,
                format!("attribute '{}' is not allowed on <{}>", attr.name(), name),
            ));
        }
    }
    for attr_def in &def.attributes {
        match node.attribute(attr_def.name.as_str()) {
            Some(value) => {
                if let Err(reason) = check_simple_type(attr_def.value_type, value) {
                    return Err(violation(
                        doc,
                        node,
                        format!("attribute '{}' of <{}> {}", attr_def.name, name, reason),
                    ));
                }
            }
            None if attr_def.required => {
                return Err(violation(
                    doc,
                    node,
                    format!("missing required attribute '{}' on <{}>", attr_def.name, name),
                ));
            }
            None => {}
        }
    }

    let has_text = node
        .children()
        .any(|c| c.is_text() && c.text().is_some_and(|t| !t.trim().is_empty()));

    match &def.content {
        Content::Empty => {
            if node.children().any(|c| c.is_element()) || has_text {
                return Err(violation(doc, node, format!("<{}> must be empty", name)));
            }
        }
        Content::Text { value_type } => {
            if let Some(child) = node.children().find(|c| c.is_element()) {
                return Err(violation(
                    doc,
                    child,
                    format!(
                        "element <{}> is not allowed inside <{}>",
                        child.tag_name().name(),
                        name
                    ),
                ));
            }
            let text = element_text(node);
            if let Err(reason) = check_simple_type(*value_type, &text) {
                return Err(violation(doc, node, format!("content of <{}> {}", name, reason)));
            }
        }
        Content::Sequence { children } => {
            if has_text {
                return Err(violation(
                    doc,
                    node,
                    format!("<{}> may only contain elements", name),
                ));
            }
            validate_sequence(doc, node, children)?;
        }
    }
    Ok(())
}

fn validate_sequence(
    doc: &Document,
    parent: Node,
    particles: &[Particle],
) -> std::result::Result<(), SchemaError> {
    // ---
    let elements: Vec<Node> = parent.children().filter(|c| c.is_element()).collect();
    let parent_name = parent.tag_name().name();
    let mut pos = 0;

    for particle in particles {
        let mut count = 0u32;
        while pos < elements.len()
            && elements[pos].tag_name().name() == particle.element.name
            && particle.max_occurs.map_or(true, |max| count < max)
        {
            validate_element(doc, elements[pos], &particle.element)?;
            count += 1;
            pos += 1;
        }
        if count < particle.min_occurs {
            let message = match elements.get(pos) {
                Some(found) => format!(
                    "expected element <{}> in <{}>, found <{}>",
                    particle.element.name,
                    parent_name,
                    found.tag_name().name()
                ),
                None => format!(
                    "missing required element <{}> in <{}>",
                    particle.element.name, parent_name
                ),
            };
            let at = elements.get(pos).copied().unwrap_or(parent);
            return Err(violation(doc, at, message));
        }
    }

    if let Some(extra) = elements.get(pos) {
        return Err(violation(
            doc,
            *extra,
            format!(
                "unexpected element <{}> in <{}>",
                extra.tag_name().name(),
                parent_name
            ),
        ));
    }
    Ok(())
}

/// Elements reached from the root by a `/`-separated path of element names.
fn select<'a, 'input>(root: Node<'a, 'input>, selector: &str) -> Vec<Node<'a, 'input>> {
    // ---
    let mut current = vec![root];
    for step in selector.split('/').filter(|s| !s.is_empty()) {
        current = current
            .iter()
            .flat_map(|n| n.children())
            .filter(|c| c.is_element() && c.tag_name().name() == step)
            .collect();
    }
    current
}

fn validate_identity(
    doc: &Document,
    definition: &SchemaDefinition,
) -> std::result::Result<(), SchemaError> {
    // ---
    let root = doc.root_element();
    let mut key_values: HashMap<&str, HashSet<&str>> = HashMap::new();

    for key in &definition.keys {
        let values = key_values.entry(key.name.as_str()).or_default();
        for node in select(root, &key.selector) {
            let Some(value) = node.attribute(key.field.as_str()) else {
                return Err(violation(
                    doc,
                    node,
                    format!(
                        "<{}> lacks attribute '{}' required by key '{}'",
                        node.tag_name().name(),
                        key.field,
                        key.name
                    ),
                ));
            };
            if !values.insert(value) {
                return Err(violation(
                    doc,
                    node,
                    format!("duplicate value '{}' for key '{}'", value, key.name),
                ));
            }
        }
    }

    for keyref in &definition.keyrefs {
        let known = key_values.get(keyref.refer.as_str());
        for node in select(root, &keyref.selector) {
            if let Some(value) = node.attribute(keyref.field.as_str()) {
                if !known.is_some_and(|k| k.contains(value)) {
                    return Err(violation(
                        doc,
                        node,
                        format!(
                            "'{}' does not match any value of key '{}' ({})",
                            value, keyref.refer, keyref.name
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_simple_type(value_type: SimpleType, raw: &str) -> std::result::Result<(), String> {
    // ---
    match value_type {
        SimpleType::String => Ok(()),
        SimpleType::Token => {
            if raw.is_empty() || raw.chars().any(char::is_whitespace) {
                Err(format!("must be a non-empty token, got '{raw}'"))
            } else {
                Ok(())
            }
        }
        SimpleType::Id => {
            if is_valid_id(raw) {
                Ok(())
            } else {
                Err(format!("is not a valid identifier: '{raw}'"))
            }
        }
        SimpleType::Decimal => {
            if is_decimal(raw.trim()) {
                Ok(())
            } else {
                Err(format!("is not a decimal number: '{}'", raw.trim()))
            }
        }
        SimpleType::DateTime => {
            if is_valid_timestamp(raw.trim()) {
                Ok(())
            } else {
                Err(format!("is not a date-time: '{}'", raw.trim()))
            }
        }
    }
}

/// `[A-Za-z0-9_][A-Za-z0-9_.-]*`
pub(crate) fn is_valid_id(s: &str) -> bool {
    // ---
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn is_decimal(s: &str) -> bool {
    // ---
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    (!int_part.is_empty() || !frac_part.is_empty())
        && int_part.chars().all(|c| c.is_ascii_digit())
        && frac_part.chars().all(|c| c.is_ascii_digit())
}

fn is_valid_timestamp(s: &str) -> bool {
    // ---
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}
