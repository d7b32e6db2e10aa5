use serde::{Deserialize, Serialize};

/// Label prefixed to the features block of every embedding text.
pub const FEATURES_LABEL: &str = "Характеристики: ";

// =============================================================================
// Catalog records
// =============================================================================

/// One catalog entry as produced by a catalog source.
///
/// Every field is optional at this stage: sources are tolerant and emit
/// whatever they could extract. Admission to the index requires both `id`
/// and `name` (see [`ProductRecord::is_admissible`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRecord {
    /// Caller-supplied unique identifier.
    pub id: Option<String>,
    /// Product display name.
    pub name: Option<String>,
    pub category: Option<String>,
    /// Opaque display text, never parsed as a number.
    pub price: Option<String>,
    pub description: Option<String>,
    pub features: Option<String>,
}

impl ProductRecord {
    /// Convenience constructor for a record with only the required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_features(mut self, features: impl Into<String>) -> Self {
        self.features = Some(features.into());
        self
    }

    /// A record is admissible when it has a non-blank `id` and `name`.
    pub fn is_admissible(&self) -> bool {
        non_blank(&self.id).is_some() && non_blank(&self.name).is_some()
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

fn or_empty(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}

// =============================================================================
// Index units
// =============================================================================

/// Metadata retained verbatim alongside each vector and returned with hits.
///
/// Missing optional fields are stored as empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price: String,
}

/// A record prepared for embedding: the text to embed plus its metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableUnit {
    /// The only text handed to the embedding provider.
    pub embedding_text: String,
    pub metadata: ProductMetadata,
}

impl IndexableUnit {
    /// Derive the unit for a record, or `None` if the record is not admissible.
    pub fn from_record(record: &ProductRecord) -> Option<Self> {
        let id = non_blank(&record.id)?;
        let name = non_blank(&record.name)?;

        let embedding_text = format!(
            "{}\n\n{}\n\n{}{}",
            name,
            or_empty(&record.description),
            FEATURES_LABEL,
            or_empty(&record.features),
        );

        Some(Self {
            embedding_text,
            metadata: ProductMetadata {
                id: id.to_string(),
                name: name.to_string(),
                category: or_empty(&record.category).to_string(),
                price: or_empty(&record.price).to_string(),
            },
        })
    }
}

/// A stored entry: the vector, the text it was computed from, and metadata.
///
/// Owned by the index once inserted; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub vector: Vec<f32>,
    pub embedding_text: String,
    pub metadata: ProductMetadata,
}
