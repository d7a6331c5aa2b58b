//! Physical identifier derivation.

use crmsync_store::{SOURCE_ID_COLUMN, SYNCED_AT_COLUMN};

/// Prefix of per-entity catalog tables.
pub const CATALOG_TABLE_PREFIX: &str = "idx_";

/// Prefix of per-entity physical data tables.
pub const DATA_TABLE_PREFIX: &str = "tbl_";

/// Turns a free-form label into a lower-case SQL identifier fragment.
///
/// HTML entities are decoded and Latin accents transliterated first; every
/// remaining character outside `[A-Za-z0-9_]` becomes `_`, runs of `_`
/// collapse and leading or trailing `_` are trimmed.
pub fn sanitize(text: &str) -> String {
    let decoded = decode_entities(text);
    let mut out = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        let c = transliterate(c).unwrap_or(c);
        let c = if c.is_ascii_alphanumeric() || c == '_' {
            c.to_ascii_lowercase()
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// Prefix given to derived columns that would shadow a bookkeeping column.
pub const RESERVED_COLUMN_PREFIX: &str = "field_";

/// Derives the physical column of a field from its label and remote identifier.
///
/// Always `sanitize(label) + "_" + sanitize(id)`; the separator stays even
/// when the label sanitizes to nothing, so `SOURCE_ID` with a non-Latin label
/// becomes `_source_id`. A result equal to a bookkeeping column is prefixed
/// with [`RESERVED_COLUMN_PREFIX`].
pub fn physical_column(friendly_name: &str, remote_field_id: &str) -> String {
    let column = format!("{}_{}", sanitize(friendly_name), sanitize(remote_field_id));
    if column == SOURCE_ID_COLUMN || column == SYNCED_AT_COLUMN {
        return format!("{RESERVED_COLUMN_PREFIX}{column}");
    }
    column
}

fn transliterate(c: char) -> Option<char> {
    let ascii = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' | 'ª' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'º' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        _ => return None,
    };
    Some(ascii)
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "aacute" => 'á',
        "eacute" => 'é',
        "iacute" => 'í',
        "oacute" => 'ó',
        "uacute" => 'ú',
        "atilde" => 'ã',
        "otilde" => 'õ',
        "ccedil" => 'ç',
        "acirc" => 'â',
        "ecirc" => 'ê',
        "ocirc" => 'ô',
        _ => return None,
    };
    Some(c)
}
