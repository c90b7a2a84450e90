//! Label taxonomy: the fields a backend must fill and their allowed values.
//!
//! A taxonomy is loaded once per run (built-in default or a JSON file) and
//! validated up front so that the response validator can rely on every
//! choice field having a default that belongs to its own allowed set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("taxonomy has no fields")]
    Empty,
    #[error("invalid field name {0:?}: use ASCII letters, digits and underscores")]
    InvalidName(String),
    #[error("duplicate field name {0:?}")]
    DuplicateField(String),
    #[error("field {field:?}: default {default:?} is not among its allowed values")]
    DefaultNotAllowed { field: String, default: String },
    #[error("field {0:?}: allowed value set is empty")]
    NoAllowedValues(String),
    #[error("taxonomy JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a field's raw value is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Closed set; anything else becomes `default`.
    Choice { allowed: Vec<String>, default: String },
    /// Free text, truncated to `max_chars` characters.
    Text { max_chars: usize },
    /// List of short strings, truncated to `max_items`.
    Keywords { max_items: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelField {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl LabelField {
    pub fn choice(name: &str, allowed: &[&str], default: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Choice {
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
                default: default.to_string(),
            },
        }
    }

    pub fn text(name: &str, max_chars: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text { max_chars },
        }
    }

    pub fn keywords(name: &str, max_items: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Keywords { max_items },
        }
    }
}

impl FieldKind {
    /// Map a raw choice value onto the canonical allowed value, or the default.
    ///
    /// Matching ignores surrounding whitespace and ASCII case. Returns `None`
    /// for non-choice fields.
    pub fn resolve_choice<'a>(&'a self, raw: Option<&str>) -> Option<&'a str> {
        let FieldKind::Choice { allowed, default } = self else {
            return None;
        };
        let hit = raw.map(str::trim).and_then(|raw| {
            allowed
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(raw))
        });
        Some(hit.unwrap_or(default).as_str())
    }
}

/// The ordered set of label fields for one classification task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub fields: Vec<LabelField>,
}

impl Taxonomy {
    /// Build and validate a taxonomy.
    pub fn new(fields: Vec<LabelField>) -> Result<Self, TaxonomyError> {
        let taxonomy = Self { fields };
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    /// Parse and validate a taxonomy from JSON.
    pub fn from_json(json: &str) -> Result<Self, TaxonomyError> {
        let taxonomy: Taxonomy = serde_json::from_str(json)?;
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    pub fn validate(&self) -> Result<(), TaxonomyError> {
        if self.fields.is_empty() {
            return Err(TaxonomyError::Empty);
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(TaxonomyError::InvalidName(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(TaxonomyError::DuplicateField(field.name.clone()));
            }
            if let FieldKind::Choice { allowed, default } = &field.kind {
                if allowed.is_empty() {
                    return Err(TaxonomyError::NoAllowedValues(field.name.clone()));
                }
                if !allowed.contains(default) {
                    return Err(TaxonomyError::DefaultNotAllowed {
                        field: field.name.clone(),
                        default: default.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&LabelField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields with a closed value set, in declaration order.
    pub fn choice_fields(&self) -> impl Iterator<Item = &LabelField> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Choice { .. }))
    }

    /// User-generated-content taxonomy used when no taxonomy file is given.
    pub fn default_ugc() -> Self {
        Self {
            fields: vec![
                LabelField::choice("sentiment", &["positive", "neutral", "negative"], "neutral"),
                LabelField::choice(
                    "intent",
                    &[
                        "purchase_consider",
                        "usage_report",
                        "recipe_share",
                        "question",
                        "complaint",
                        "other",
                    ],
                    "other",
                ),
                LabelField::choice(
                    "life_stage",
                    &["single", "couple", "child_raising", "empty_nest", "senior", "unknown"],
                    "unknown",
                ),
                LabelField::choice(
                    "cooking_skill",
                    &["beginner", "intermediate", "advanced", "unknown"],
                    "unknown",
                ),
                LabelField::choice(
                    "emotion",
                    &[
                        "anxiety",
                        "relief",
                        "satisfaction",
                        "guilt",
                        "excitement",
                        "frustration",
                        "neutral",
                    ],
                    "neutral",
                ),
                LabelField::choice(
                    "with_whom",
                    &["solo", "family", "kids", "guest", "unknown"],
                    "unknown",
                ),
                LabelField::text("why_motivation", 50),
                LabelField::keywords("paired_keywords", 3),
            ],
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
