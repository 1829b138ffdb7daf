//! Type projector - field value ↔ column representation
//!
//! Write rules, first match wins:
//! 1. enabled custom conversion of the value's record type
//! 2. `Any` / union: the value as-is
//! 3. literal: its string form
//! 4. list of records: reference to another table; list of anything else: JSON of strings
//! 5. record: reference to another table
//! 6. scalar: the base row value is kept
//!
//! Read rules invert these, resolving references through a caller-supplied loader.

use crate::record::{FieldType, RecordValue};
use crate::value::Value;
use crate::{Error, Result};

/// Outcome of projecting one field
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// The column holds this value
    Store(Value),
    /// The base row value stays
    Keep,
    /// The column references rows of a foreign table; the caller upserts
    /// the nested records and stores their keys
    Reference(Nested),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    One(RecordValue),
    Many(Vec<RecordValue>),
}

/// Apply the value's custom conversion, if its type declares one.
///
/// A list converts element-wise when its first element's type has an enabled
/// conversion; every element must then share that type.
pub fn special_conversion(value: &Value) -> Result<Option<Value>> {
    match value {
        Value::Record(record) => match record.record_type().hooks().converter() {
            Some(convert) => convert(record).map(Some),
            None => Ok(None),
        },
        Value::List(items) => {
            let Some(Value::Record(first)) = items.first() else {
                return Ok(None);
            };
            let Some(convert) = first.record_type().hooks().converter() else {
                return Ok(None);
            };
            let first_type = first.record_type();
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Record(record) if record.record_type() == first_type => converted.push(convert(record)?),
                    other => {
                        return Err(Error::Validation(format!(
                            "not all values in the list are of type '{}': found {}",
                            first_type,
                            other.kind()
                        )));
                    }
                }
            }
            Ok(Some(Value::List(converted)))
        }
        _ => Ok(None),
    }
}

/// Decide how a field value is represented in the row
pub fn project(ty: &FieldType, value: &Value) -> Result<Projection> {
    if let Some(converted) = special_conversion(value)? {
        return Ok(Projection::Store(converted));
    }

    match ty {
        FieldType::Any | FieldType::Union(_) => Ok(Projection::Store(value.clone())),
        FieldType::Literal(_) => Ok(Projection::Store(Value::Text(value.to_display_string()))),
        FieldType::List(element) => {
            let items = match value {
                Value::List(items) => items,
                other => return Err(Error::InputType(format!("expected a list, found {}", other.kind()))),
            };
            if let FieldType::Record(_) = element.as_ref() {
                let records = items
                    .iter()
                    .map(|item| match item {
                        Value::Record(record) => Ok(record.clone()),
                        other => Err(Error::InputType(format!(
                            "expected a list of records, found element {}",
                            other.kind()
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Projection::Reference(Nested::Many(records)))
            } else {
                let strings = items.iter().map(|item| Value::Text(item.to_display_string())).collect();
                Ok(Projection::Store(Value::List(strings)))
            }
        }
        FieldType::Record(expected) => match value {
            Value::Record(record) => Ok(Projection::Reference(Nested::One(record.clone()))),
            other => Err(Error::InputType(format!(
                "expected a {} record, found {}",
                expected,
                other.kind()
            ))),
        },
        _ => Ok(Projection::Keep),
    }
}

/// Decode a stored column back into a field value.
///
/// `foreign_table` is set when the column is registered as a foreign key;
/// `resolve(table, key)` loads the referenced record.
pub fn unproject<F>(ty: &FieldType, stored: Value, foreign_table: Option<&str>, mut resolve: F) -> Result<Value>
where
    F: FnMut(&str, Value) -> Result<Value>,
{
    if let Some(table) = foreign_table {
        match ty {
            FieldType::List(element) if matches!(element.as_ref(), FieldType::Record(_)) => {
                let keys = match decode_json_list(stored)? {
                    Value::List(keys) => keys,
                    other => return Ok(other),
                };
                let records = keys
                    .into_iter()
                    .map(|key| resolve(table, key))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Value::List(records));
            }
            FieldType::Record(_) if !stored.is_null() => return resolve(table, stored),
            _ => {}
        }
    }

    match ty {
        FieldType::List(element) => match decode_json_list(stored)? {
            Value::List(items) => Ok(Value::List(
                items
                    .into_iter()
                    .map(|item| element.coerce(&item).unwrap_or(item))
                    .collect(),
            )),
            other => Ok(other),
        },
        FieldType::Union(members) => Ok(decode_union(members, stored)),
        _ => Ok(stored),
    }
}

fn decode_json_list(stored: Value) -> Result<Value> {
    match stored {
        Value::Text(text) => Value::parse_json(&text),
        other => Ok(other),
    }
}

/// Resolve a stored value against the members of a union.
///
/// Null short-circuits when the union is optional. Native values that already
/// match a member are kept. Text, which may be the string form of any member,
/// is constructed into each member in declaration order. If nothing fits the
/// raw value comes back unchanged.
pub fn decode_union(members: &[FieldType], value: Value) -> Value {
    if value.is_null() {
        return value;
    }
    if !matches!(value, Value::Text(_)) && members.iter().any(|m| m.accepts(&value)) {
        return value;
    }
    members
        .iter()
        .filter(|m| !matches!(m, FieldType::Null))
        .find_map(|m| m.coerce(&value))
        .unwrap_or(value)
}
