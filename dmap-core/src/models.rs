//! Core data models for catalog metadata, samples and classifications.
//!
//! These are in-memory artifacts of one sampling run. All of them are
//! serializable so the scan report can carry them without conversion.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fully qualified table location: database, schema and table, in that order.
///
/// The three components are fixed at construction; the path is never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TablePath {
    /// Database (catalog) name
    pub database: String,
    /// Schema within the database
    pub schema: String,
    /// Table or view name
    pub table: String,
}

impl TablePath {
    /// Creates a table path from its components.
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Path components in order.
    pub fn components(&self) -> [&str; 3] {
        [&self.database, &self.schema, &self.table]
    }
}

impl std::fmt::Display for TablePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// A single column as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMetadata {
    /// Schema of the owning table
    pub schema: String,
    /// Owning table
    pub table: String,
    /// Column name
    pub name: String,
    /// Declared type, verbatim from the source system
    pub data_type: String,
}

impl AttributeMetadata {
    /// Creates attribute metadata.
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A table and its attributes in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Schema the table belongs to
    pub schema: String,
    /// Table or view name
    pub name: String,
    /// Columns in catalog order, unique by name
    pub attributes: Vec<AttributeMetadata>,
}

impl TableMetadata {
    /// Creates a table with no attributes.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute unless one with the same name already exists.
    ///
    /// Returns false when the attribute was a duplicate.
    pub fn push_attribute(&mut self, attribute: AttributeMetadata) -> bool {
        if self.attributes.iter().any(|a| a.name == attribute.name) {
            return false;
        }
        self.attributes.push(attribute);
        true
    }

    /// Attribute names in catalog order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}

/// Tables of one schema, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// Schema name
    pub name: String,
    /// Tables keyed by name
    pub tables: BTreeMap<String, TableMetadata>,
}

/// Root of the catalog tree for one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Database the catalog was read from
    pub database: String,
    /// Schemas keyed by name
    pub schemas: BTreeMap<String, SchemaMetadata>,
}

impl Metadata {
    /// Creates an empty catalog for `database`.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schemas: BTreeMap::new(),
        }
    }

    /// Ensures the table exists, creating its schema entry if needed.
    pub fn add_table(&mut self, schema: &str, table: &str) -> &mut TableMetadata {
        self.schemas
            .entry(schema.to_string())
            .or_insert_with(|| SchemaMetadata {
                name: schema.to_string(),
                tables: BTreeMap::new(),
            })
            .tables
            .entry(table.to_string())
            .or_insert_with(|| TableMetadata::new(schema, table))
    }

    /// Adds an attribute, creating its schema and table on first use.
    ///
    /// Returns false if the (schema, table, attribute) triple was already
    /// present; the tree is left unchanged in that case.
    pub fn add_attribute(&mut self, attribute: AttributeMetadata) -> bool {
        let schema = attribute.schema.clone();
        let table = attribute.table.clone();
        self.add_table(&schema, &table).push_attribute(attribute)
    }

    /// Looks up one table.
    pub fn table(&self, schema: &str, table: &str) -> Option<&TableMetadata> {
        self.schemas.get(schema)?.tables.get(table)
    }

    /// Iterates over every table of every schema.
    pub fn tables(&self) -> impl Iterator<Item = &TableMetadata> {
        self.schemas.values().flat_map(|s| s.tables.values())
    }

    /// Total number of tables.
    pub fn table_count(&self) -> usize {
        self.schemas.values().map(|s| s.tables.len()).sum()
    }

    /// Full path of a table in this catalog.
    pub fn table_path(&self, table: &TableMetadata) -> TablePath {
        TablePath::new(&self.database, &table.schema, &table.name)
    }
}

/// A sampled value. Drivers decode each column into one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Canonical string form fed to classifiers.
    ///
    /// Byte sequences are read as text; `Null` has no string form.
    pub fn canonical_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Text(v) => Some(v.clone()),
            Value::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// One sampled row: attribute name to value.
pub type SampleResult = BTreeMap<String, Value>;

/// Converts a row into the string map a classifier consumes.
pub fn canonical_row(row: &SampleResult) -> BTreeMap<String, String> {
    row.iter()
        .filter_map(|(name, value)| value.canonical_string().map(|v| (name.clone(), v)))
        .collect()
}

/// Sampled rows of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Table the rows were read from
    pub path: TablePath,
    /// Rows in the order the repository returned them
    pub results: Vec<SampleResult>,
}

impl Sample {
    /// Creates a sample.
    pub fn new(path: TablePath, results: Vec<SampleResult>) -> Self {
        Self { path, results }
    }

    /// Number of sampled rows.
    pub fn row_count(&self) -> usize {
        self.results.len()
    }
}

/// Set of label names; unique and unordered by meaning, sorted for output.
pub type LabelSet = BTreeSet<String>;

/// Location of one attribute: its table path plus the attribute name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributePath {
    /// Table holding the attribute
    #[serde(flatten)]
    pub table: TablePath,
    /// Attribute (column) name
    pub attribute: String,
}

impl AttributePath {
    /// Creates an attribute path.
    pub fn new(table: TablePath, attribute: impl Into<String>) -> Self {
        Self {
            table,
            attribute: attribute.into(),
        }
    }

    /// Path components in order: database, schema, table, attribute.
    pub fn components(&self) -> [&str; 4] {
        let [database, schema, table] = self.table.components();
        [database, schema, table, &self.attribute]
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.attribute)
    }
}

/// Labels applicable to one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Classified attribute
    pub path: AttributePath,
    /// Non-empty union of labels seen in any sampled row
    pub labels: LabelSet,
}

/// Rule body of a label. Only classifiers interpret it.
///
/// A rule matches when every pattern it defines matches: `value` against
/// the canonical string value, `attribute` against the attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    /// Pattern for the canonical string value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Pattern for the attribute name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// A named sensitive-data category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Unique label name, as reported
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Free-form grouping tags (PII, PCI, ...)
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Matching rule
    pub rule: LabelRule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_rejects_duplicate_attribute() {
        let mut metadata = Metadata::new("db");
        assert!(metadata.add_attribute(AttributeMetadata::new("s", "t", "id", "int")));
        assert!(metadata.add_attribute(AttributeMetadata::new("s", "t", "name", "text")));
        assert!(!metadata.add_attribute(AttributeMetadata::new("s", "t", "id", "bigint")));

        let table = metadata.table("s", "t").unwrap();
        assert_eq!(table.attributes.len(), 2);
        assert_eq!(table.attributes[0].data_type, "int");
        let names: Vec<&str> = table.attribute_names().collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_metadata_table_iteration() {
        let mut metadata = Metadata::new("db");
        metadata.add_table("a", "t1");
        metadata.add_table("a", "t1");
        metadata.add_table("b", "t2");

        assert_eq!(metadata.table_count(), 2);
        let paths: Vec<String> = metadata
            .tables()
            .map(|t| metadata.table_path(t).to_string())
            .collect();
        assert_eq!(paths, vec!["db.a.t1", "db.b.t2"]);
    }

    #[test]
    fn test_canonical_string() {
        assert_eq!(Value::Null.canonical_string(), None);
        assert_eq!(Value::Bool(true).canonical_string().unwrap(), "true");
        assert_eq!(Value::Int(-42).canonical_string().unwrap(), "-42");
        assert_eq!(Value::Float(3.5).canonical_string().unwrap(), "3.5");
        assert_eq!(
            Value::Bytes(b"123-45-6789".to_vec())
                .canonical_string()
                .unwrap(),
            "123-45-6789"
        );
    }

    #[test]
    fn test_canonical_row_skips_null() {
        let mut row = SampleResult::new();
        row.insert("age".to_string(), Value::Int(30));
        row.insert("nickname".to_string(), Value::Null);

        let canonical = canonical_row(&row);
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical["age"], "30");
    }

    #[test]
    fn test_paths() {
        let table = TablePath::new("db", "s", "t");
        assert_eq!(table.components(), ["db", "s", "t"]);

        let attribute = AttributePath::new(table, "ssn");
        assert_eq!(attribute.components(), ["db", "s", "t", "ssn"]);
        assert_eq!(attribute.to_string(), "db.s.t.ssn");
    }

    #[test]
    fn test_value_serialization_is_untagged() {
        let mut row = SampleResult::new();
        row.insert("a".to_string(), Value::Int(1));
        row.insert("b".to_string(), Value::Text("x".to_string()));
        row.insert("c".to_string(), Value::Null);

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"a":1,"b":"x","c":null}"#);
    }
}
