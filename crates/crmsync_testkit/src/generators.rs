//! Property-based test generators using proptest.
//!
//! Provides strategies for remote labels, identifiers and field metadata
//! shaped like what a real CRM reports.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Remote type names that end up in the catalog.
pub const CATALOGED_TYPES: &[&str] = &[
    "string", "integer", "double", "money", "number", "date", "datetime", "enumeration", "crm_status",
    "user", "url",
];

/// Remote type names excluded from the catalog.
pub const EXCLUDED_TYPES: &[&str] = &["boolean", "bool", "file", "disk_file", "webdav", "attachment"];

/// Strategy for human labels, including accents, punctuation and HTML entities.
pub fn label_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            prop::string::string_regex("[A-Za-z0-9]{1,8}").expect("Invalid regex"),
            Just("Ação".to_string()),
            Just("Préço".to_string()),
            Just("nº".to_string()),
            Just("&amp;".to_string()),
            Just("(R$)".to_string()),
            Just("-".to_string()),
            Just("Ü".to_string()),
        ],
        1..5,
    )
    .prop_map(|parts| parts.join(" "))
}

/// Strategy for remote field identifiers, user-defined or built-in.
pub fn remote_field_id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("UF_CRM_[0-9]{1,10}").expect("Invalid regex"),
        prop::string::string_regex("[A-Z][A-Z_]{1,15}").expect("Invalid regex"),
        prop::string::string_regex("[a-z][a-zA-Z]{1,15}").expect("Invalid regex"),
    ]
}

/// Strategy for remote type names that are kept by the catalog.
pub fn cataloged_type_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(CATALOGED_TYPES)
}

/// Strategy for field metadata as returned by a field listing.
pub fn field_meta_strategy() -> impl Strategy<Value = Value> {
    (cataloged_type_strategy(), label_strategy(), any::<bool>()).prop_map(
        |(field_type, title, multiple)| {
            json!({ "type": field_type, "title": title, "isMultiple": multiple })
        },
    )
}
