//! Persisted field catalog rows.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Normalized type of a remote field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Anything without a more specific mapping.
    Text,
    /// Whole numbers.
    Integer,
    /// Decimal numbers; money and number variants collapse here.
    Double,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
}

impl FieldType {
    /// Returns the persisted name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Double => "double",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }

    /// Returns true for types whose values are validated as numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Double)
    }

    /// Returns true for types whose values are validated as numbers or dates.
    pub fn is_typed(&self) -> bool {
        !matches!(self, FieldType::Text)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(FieldType::Text),
            "integer" => Ok(FieldType::Integer),
            "double" => Ok(FieldType::Double),
            "date" => Ok(FieldType::Date),
            "datetime" => Ok(FieldType::DateTime),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

/// One catalog row: a remote field and where it lives physically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    /// Catalog row id (assigned by the store on insert).
    pub id: i64,
    /// Stable identifier assigned by the remote system.
    pub remote_field_id: String,
    /// Committed human label.
    pub friendly_name: String,
    /// Label observed remotely but not yet applied to the physical schema.
    pub pending_friendly_name: Option<String>,
    /// Normalized type.
    pub field_type: FieldType,
    /// Destination table.
    pub physical_table: String,
    /// Destination column.
    pub physical_column: String,
    /// Whether the remote field holds a list.
    pub is_multiple: bool,
    /// Soft-delete marker.
    pub is_deleted: bool,
    /// Set while a rename awaits the schema evolver.
    pub needs_rename: bool,
    /// Last time the row changed, as stored.
    pub last_updated: Option<String>,
}

impl FieldDescriptor {
    /// Creates a descriptor for a field seen for the first time.
    pub fn new(
        remote_field_id: impl Into<String>,
        friendly_name: impl Into<String>,
        field_type: FieldType,
        physical_table: impl Into<String>,
        physical_column: impl Into<String>,
        is_multiple: bool,
    ) -> Self {
        Self {
            id: 0,
            remote_field_id: remote_field_id.into(),
            friendly_name: friendly_name.into(),
            pending_friendly_name: None,
            field_type,
            physical_table: physical_table.into(),
            physical_column: physical_column.into(),
            is_multiple,
            is_deleted: false,
            needs_rename: false,
            last_updated: None,
        }
    }

    /// The label the physical column should reflect once pending renames commit.
    pub fn effective_name(&self) -> &str {
        self.pending_friendly_name
            .as_deref()
            .unwrap_or(&self.friendly_name)
    }
}
