//! Cell cleanup and delimiter splitting.
//!
//! Spreadsheet values arrive messy: numeric cells render as "25.0",
//! text carries stray tabs and newlines, and identifier columns pack
//! several ids behind one delimiter that also appears inside the ids
//! themselves. Everything here is a pure function of its inputs.

use graft_types::CellValue;

/// Renders one cell as a clean scalar string.
///
/// Line breaks and tabs become spaces, surrounding whitespace is
/// trimmed, and numeric values (typed, or stored as text) render
/// without a spurious fractional part. Returns `None` for empty cells
/// and whitespace-only text.
#[must_use]
pub fn clean_scalar(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Empty => None,
        CellValue::Bool(b) => Some(b.to_string()),
        CellValue::Number(n) => Some(render_number(*n)),
        CellValue::Text(text) => {
            let cleaned = flatten_whitespace(text);
            if cleaned.is_empty() {
                return None;
            }
            match cleaned.parse::<f64>() {
                Ok(n) if n.is_finite() => Some(render_number(n)),
                _ => Some(cleaned),
            }
        }
    }
}

/// Splits one cell into clean, distinct, lower-cased values.
///
/// Splits on `delimiter`, trims each piece, lower-cases it, and drops
/// empty pieces; duplicates keep their first occurrence. A missing or
/// empty cell yields no values.
///
/// When the cell opens with one of `protected_prefixes`, a delimiter
/// only splits where the following piece again opens with a known
/// prefix. This keeps delimiters that appear inside identifiers (such
/// as `m_code(1;2)`) from tearing the identifier apart.
#[must_use]
pub fn normalize(
    cell: Option<&CellValue>,
    delimiter: &str,
    protected_prefixes: &[String],
) -> Vec<String> {
    let Some(scalar) = cell.and_then(clean_scalar) else {
        return Vec::new();
    };
    debug_assert!(!delimiter.is_empty());

    let pieces = if protected_prefixes
        .iter()
        .any(|p| starts_with_prefix(&scalar, p))
    {
        split_protected(&scalar, delimiter, protected_prefixes)
    } else {
        scalar.split(delimiter).map(str::to_string).collect()
    };

    let mut values = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let value = piece.trim().to_lowercase();
        if value.is_empty() || values.contains(&value) {
            continue;
        }
        values.push(value);
    }
    values
}

/// Case-insensitive prefix check that never panics on a non-boundary.
#[must_use]
pub fn starts_with_prefix(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Splits only at delimiters followed (after optional whitespace) by a
/// known prefix. Delimiters inside an identifier survive.
fn split_protected(value: &str, delimiter: &str, prefixes: &[String]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut cursor = 0;
    while let Some(found) = value[cursor..].find(delimiter) {
        let at = cursor + found;
        let rest = value[at + delimiter.len()..].trim_start();
        if prefixes.iter().any(|p| starts_with_prefix(rest, p)) {
            parts.push(value[start..at].to_string());
            start = at + delimiter.len();
        }
        cursor = at + delimiter.len();
    }
    parts.push(value[start..].to_string());
    parts
}

/// Integral numbers render without the fractional part: 25.0 -> "25".
fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn flatten_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
