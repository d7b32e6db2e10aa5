//! Catalog sources: where product records come from.
//!
//! The search core only needs a sequence of [`ProductRecord`]s. The shipped
//! [`MarkdownCatalog`] reads the labelled-markdown format used by the shop's
//! `base.md`; [`StaticCatalog`] wraps an in-memory list.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::ProductRecord;

/// Anything that can produce the full list of catalog records.
pub trait CatalogSource: Send + Sync {
    fn produce(&self) -> Result<Vec<ProductRecord>>;
}

/// An in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    records: Vec<ProductRecord>,
}

impl StaticCatalog {
    pub fn new(records: Vec<ProductRecord>) -> Self {
        Self { records }
    }
}

impl CatalogSource for StaticCatalog {
    fn produce(&self) -> Result<Vec<ProductRecord>> {
        Ok(self.records.clone())
    }
}

/// A markdown file with products separated by `---` lines.
///
/// Each block carries bold labels, in Russian or English:
///
/// ```text
/// **ID:** P-001
/// **Название:** Смартфон Galaxy
/// **Категория:** Электроника
/// **Цена:** 49 990 ₽
/// **Описание:** Free text, may span
/// several lines.
/// **Характеристики:** Everything up to the end of the block.
/// ```
#[derive(Debug, Clone)]
pub struct MarkdownCatalog {
    path: PathBuf,
}

impl MarkdownCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for MarkdownCatalog {
    fn produce(&self) -> Result<Vec<ProductRecord>> {
        let content = std::fs::read_to_string(&self.path)?;
        let records = parse_markdown(&content);
        info!(
            path = %self.path.display(),
            count = records.len(),
            "Parsed markdown catalog"
        );
        Ok(records)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Block titles that mark the document header rather than a product.
const HEADER_MARKERS: &[&str] = &["База товаров", "Product Catalog"];

struct FieldPatterns {
    id: Regex,
    name: Regex,
    category: Regex,
    price: Regex,
    description: Regex,
    features: Regex,
}

static FIELDS: LazyLock<FieldPatterns> = LazyLock::new(|| {
    let line = |labels: &str| {
        Regex::new(&format!(r"\*\*(?:{labels}):\*\*[ \t]*(.+)")).expect("Invalid field regex")
    };

    FieldPatterns {
        id: line("ID"),
        name: line("Название|Name"),
        category: line("Категория|Category"),
        price: line("Цена|Price"),
        description: Regex::new(
            r"(?s)\*\*(?:Описание|Description):\*\*\s*(.+?)\s*(?:\*\*(?:Характеристики|Features):\*\*|\z)",
        )
        .expect("Invalid description regex"),
        features: Regex::new(r"(?s)\*\*(?:Характеристики|Features):\*\*\s*(.+)")
            .expect("Invalid features regex"),
    }
});

/// Split markdown into product blocks and extract labelled fields.
///
/// Every non-empty, non-header block yields a record, even one missing its
/// `id` or `name`; admission is decided later by the ingestion pipeline.
pub fn parse_markdown(content: &str) -> Vec<ProductRecord> {
    split_blocks(content)
        .into_iter()
        .filter(|block| !block.trim().is_empty())
        .filter(|block| !HEADER_MARKERS.iter().any(|m| block.contains(m)))
        .map(|block| parse_block(&block))
        .collect()
}

fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if line.trim() == "---" {
            blocks.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    blocks.push(current);
    blocks
}

fn parse_block(block: &str) -> ProductRecord {
    let fields = &*FIELDS;
    let record = ProductRecord {
        id: capture(&fields.id, block),
        name: capture(&fields.name, block),
        category: capture(&fields.category, block),
        price: capture(&fields.price, block),
        description: capture(&fields.description, block),
        features: capture(&fields.features, block),
    };
    if !record.is_admissible() {
        debug!(block = %block.trim(), "Catalog block lacks id or name");
    }
    record
}

fn capture(re: &Regex, block: &str) -> Option<String> {
    re.captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "# База товаров\n\
\n\
---\n\
**ID:** P-001\n\
**Название:** Смартфон Galaxy S\n\
**Категория:** Электроника\n\
**Цена:** 49 990 ₽\n\
**Описание:** Флагманский смартфон\n\
с отличной камерой.\n\
**Характеристики:** 6.1\" экран\n\
128 ГБ памяти\n\
---\n\
**ID:** P-002\n\
**Name:** Kettle\n\
**Category:** Kitchen\n\
**Price:** $30\n\
**Description:** Electric kettle\n\
**Features:** 1.7 l\n\
---\n\
**Категория:** Без ID\n\
**Описание:** Запись без идентификатора\n";

    #[test]
    fn test_parse_skips_header_and_keeps_products() {
        let records = parse_markdown(SAMPLE);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id.as_deref(), Some("P-001"));
        assert_eq!(records[1].id.as_deref(), Some("P-002"));
    }

    #[test]
    fn test_parse_russian_labels() {
        let records = parse_markdown(SAMPLE);
        let phone = &records[0];
        assert_eq!(phone.name.as_deref(), Some("Смартфон Galaxy S"));
        assert_eq!(phone.category.as_deref(), Some("Электроника"));
        assert_eq!(phone.price.as_deref(), Some("49 990 ₽"));
        assert_eq!(
            phone.description.as_deref(),
            Some("Флагманский смартфон\nс отличной камерой.")
        );
        assert_eq!(phone.features.as_deref(), Some("6.1\" экран\n128 ГБ памяти"));
    }

    #[test]
    fn test_parse_english_labels() {
        let records = parse_markdown(SAMPLE);
        let kettle = &records[1];
        assert_eq!(kettle.name.as_deref(), Some("Kettle"));
        assert_eq!(kettle.category.as_deref(), Some("Kitchen"));
        assert_eq!(kettle.price.as_deref(), Some("$30"));
        assert_eq!(kettle.description.as_deref(), Some("Electric kettle"));
        assert_eq!(kettle.features.as_deref(), Some("1.7 l"));
    }

    #[test]
    fn test_block_without_id_is_emitted_but_not_admissible() {
        let records = parse_markdown(SAMPLE);
        let orphan = &records[2];
        assert!(orphan.id.is_none());
        assert!(!orphan.is_admissible());
        assert_eq!(orphan.description.as_deref(), Some("Запись без идентификатора"));
    }

    #[test]
    fn test_description_without_features_runs_to_block_end() {
        let records = parse_markdown("**ID:** 1\n**Name:** A\n**Description:** only text\n");
        assert_eq!(records[0].description.as_deref(), Some("only text"));
        assert!(records[0].features.is_none());
    }

    #[test]
    fn test_empty_label_value_is_missing() {
        let records = parse_markdown("**ID:**\n**Name:** A\n");
        assert!(records[0].id.is_none());
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_markdown("").is_empty());
        assert!(parse_markdown("---\n\n---\n").is_empty());
    }

    #[test]
    fn test_markdown_catalog_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = MarkdownCatalog::new(file.path());
        let records = catalog.produce().unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_markdown_catalog_missing_file() {
        let catalog = MarkdownCatalog::new("/does/not/exist/base.md");
        assert!(catalog.produce().is_err());
    }

    #[test]
    fn test_static_catalog() {
        let catalog = StaticCatalog::new(vec![ProductRecord::new("1", "A")]);
        assert_eq!(catalog.produce().unwrap().len(), 1);
    }
}
