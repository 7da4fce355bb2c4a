//! Conversion between relational values and store text.
//!
//! Outbound, a key or scalar value becomes one string and an array value is
//! decomposed into its elements. Inbound, a reply becomes the text of one
//! column: integers as decimal digits, strings as-is, and multi-bulk replies
//! as a brace-delimited array literal such as `{"a","b",NULL,5}`.

use keyrel_db::Reply;
use keyrel_types::{ScalarType, Value};

use crate::error::EngineError;

/// Render a non-array value as store text.
///
/// # Errors
///
/// Returns [`EngineError::NullValue`] for NULL and
/// [`EngineError::ValueShape`] for arrays.
pub fn encode_scalar(value: &Value) -> Result<String, EngineError> {
    match value {
        Value::Null => Err(EngineError::NullValue),
        Value::Text(text) => Ok(text.clone()),
        Value::Integer(n) => Ok(n.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Array(_) => Err(EngineError::ValueShape(
            "cannot store an array in a scalar column".to_owned(),
        )),
    }
}

/// Split an array value into element texts for a collection write.
///
/// Every element must be non-NULL and match `element`; integers are
/// accepted where floats are expected.
///
/// # Errors
///
/// Fails with [`EngineError::NullValue`] for a NULL array,
/// [`EngineError::ValueShape`] for a non-array or mistyped element,
/// [`EngineError::EmptyArray`] for zero elements and
/// [`EngineError::NullElement`] for a NULL element.
pub fn decompose_array(value: &Value, element: ScalarType) -> Result<Vec<String>, EngineError> {
    let items = match value {
        Value::Null => return Err(EngineError::NullValue),
        Value::Array(items) => items,
        _ => {
            return Err(EngineError::ValueShape(
                "cannot insert into this type of table - needs an array".to_owned(),
            ));
        }
    };
    if items.is_empty() {
        return Err(EngineError::EmptyArray);
    }

    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let matches_type = match (item, element) {
                (Value::Null, _) => return Err(EngineError::NullElement(position)),
                (Value::Array(_), _) => return Err(EngineError::NestedArray),
                (Value::Text(_), ScalarType::Text)
                | (Value::Integer(_), ScalarType::Integer | ScalarType::Float)
                | (Value::Float(_), ScalarType::Float)
                | (Value::Boolean(_), ScalarType::Boolean) => true,
                _ => false,
            };
            if !matches_type {
                return Err(EngineError::ValueShape(format!(
                    "array element {position} is not of type {element}"
                )));
            }
            encode_scalar(item)
        })
        .collect()
}

/// Text of one column materialized from a reply.
///
/// Returns `None` for replies that do not produce a row (nil, status, and
/// error replies); callers skip such keys.
///
/// # Errors
///
/// Returns [`EngineError::Encoding`] for non-UTF-8 strings and
/// [`EngineError::NestedArray`] for arrays inside arrays.
pub fn reply_text(reply: &Reply) -> Result<Option<String>, EngineError> {
    match reply {
        Reply::Integer(n) => Ok(Some(n.to_string())),
        Reply::String(bytes) => utf8(bytes).map(|text| Some(text.to_owned())),
        Reply::Array(elements) => render_array(elements).map(Some),
        Reply::Nil | Reply::Status(_) | Reply::Error(_) => Ok(None),
    }
}

/// Text of a non-composite reply element, as used for singleton rows.
///
/// # Errors
///
/// Returns [`EngineError::Encoding`] for non-UTF-8 strings.
pub fn element_text(reply: &Reply) -> Result<Option<String>, EngineError> {
    match reply {
        Reply::Integer(n) => Ok(Some(n.to_string())),
        Reply::String(bytes) => utf8(bytes).map(|text| Some(text.to_owned())),
        Reply::Status(text) => Ok(Some(text.clone())),
        Reply::Nil | Reply::Array(_) | Reply::Error(_) => Ok(None),
    }
}

/// Render reply elements as an array literal.
///
/// Strings are double-quoted with `"` and `\` escaped by a backslash,
/// integers appear as bare digits, and any other element is `NULL`.
///
/// # Errors
///
/// Returns [`EngineError::NestedArray`] if an element is itself an array.
pub fn render_array(elements: &[Reply]) -> Result<String, EngineError> {
    let mut out = String::from("{");
    for (position, element) in elements.iter().enumerate() {
        if position > 0 {
            out.push(',');
        }
        match element {
            Reply::String(bytes) => {
                out.push('"');
                for c in utf8(bytes)?.chars() {
                    if matches!(c, '"' | '\\') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            Reply::Integer(n) => out.push_str(&n.to_string()),
            Reply::Array(_) => return Err(EngineError::NestedArray),
            Reply::Nil | Reply::Status(_) | Reply::Error(_) => out.push_str("NULL"),
        }
    }
    out.push('}');
    Ok(out)
}

fn utf8(bytes: &[u8]) -> Result<&str, EngineError> {
    std::str::from_utf8(bytes).map_err(|e| EngineError::Encoding(e.to_string()))
}
