//! Record types - the schema-description interface
//!
//! Every storable type implements [`Record`]: it names itself with a stable
//! key, lists its fields with their declared [`FieldType`], and converts to and
//! from the dynamic [`RecordValue`]. No runtime reflection is involved; the
//! field list is the whole schema.
//!
//! Optional capabilities are declared through [`Hooks`]:
//! - [`SpecialInsert`]: replace the field projection with a custom storable form
//! - [`StorableForm`]: override the whole base row of an instance

use crate::value::{FromValue, Value};
use crate::{Error, Result};
use indexmap::IndexMap;

/// A storable record type.
///
/// `from_record` is the constructor: it receives the decoded field mapping and
/// runs whatever validation or coercion the type needs.
pub trait Record: Sized {
    /// Stable identity key, persisted in the table registry
    const TYPE_NAME: &'static str;

    /// Declared fields, in column order
    fn fields() -> Vec<FieldDef>;

    /// Current field values
    fn to_record(&self) -> RecordValue;

    /// Build an instance from a field mapping
    fn from_record(record: RecordValue) -> Result<Self>;

    /// Declared capabilities
    fn hooks() -> Hooks {
        Hooks::default()
    }

    fn record_type() -> RecordType {
        RecordType::of::<Self>()
    }
}

/// Opt-in custom conversion of a field value into its storable form.
///
/// When enabled it preempts every other projection rule, both for a single
/// value and for a homogeneous list of values of the type.
pub trait SpecialInsert: Record {
    const ENABLED: bool = true;

    fn convert(&self) -> Value;
}

/// Whole-instance override of the row written for a record.
pub trait StorableForm: Record {
    fn storable_form(&self) -> RecordValue;
}

pub type Converter = fn(&RecordValue) -> Result<Value>;
pub type StorableFn = fn(&RecordValue) -> Result<RecordValue>;

fn convert_with<T: SpecialInsert>(record: &RecordValue) -> Result<Value> {
    Ok(T::from_record(record.clone())?.convert())
}

fn storable_with<T: StorableForm>(record: &RecordValue) -> Result<RecordValue> {
    Ok(T::from_record(record.clone())?.storable_form())
}

/// Type-erased capability table of a record type
#[derive(Debug, Clone, Copy, Default)]
pub struct Hooks {
    convert: Option<Converter>,
    storable: Option<StorableFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn special_insert<T: SpecialInsert>(mut self) -> Self {
        if T::ENABLED {
            self.convert = Some(convert_with::<T>);
        }
        self
    }

    pub fn storable_form<T: StorableForm>(mut self) -> Self {
        self.storable = Some(storable_with::<T>);
        self
    }

    pub fn converter(&self) -> Option<Converter> {
        self.convert
    }

    pub fn storable(&self) -> Option<StorableFn> {
        self.storable
    }
}

/// Handle to a record type: its name, field list and hooks.
///
/// Two handles are equal when their names are equal.
#[derive(Clone, Copy)]
pub struct RecordType {
    name: &'static str,
    fields: fn() -> Vec<FieldDef>,
    hooks: fn() -> Hooks,
}

impl RecordType {
    pub fn of<T: Record>() -> Self {
        Self {
            name: T::TYPE_NAME,
            fields: T::fields,
            hooks: T::hooks,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> Vec<FieldDef> {
        (self.fields)()
    }

    pub fn hooks(&self) -> Hooks {
        (self.hooks)()
    }

    /// Record types referenced by this type's fields (one level deep)
    pub fn nested_types(&self) -> Vec<RecordType> {
        let mut out = Vec::new();
        for field in self.fields() {
            field.ty.collect_record_types(&mut out);
        }
        out
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RecordType {}

impl std::fmt::Debug for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordType({})", self.name)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Declared type of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Boolean,
    /// Dynamically typed, stored verbatim
    Any,
    /// The `None` member of an optional
    Null,
    /// One of a fixed set of string values
    Literal(&'static [&'static str]),
    /// Ordered alternatives; decoding tries them in declaration order
    Union(Vec<FieldType>),
    /// Homogeneous sequence
    List(Box<FieldType>),
    /// Nested record, stored as a reference to another table
    Record(RecordType),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Union(vec![inner, FieldType::Null])
    }

    pub fn list(element: FieldType) -> Self {
        FieldType::List(Box::new(element))
    }

    pub fn record<T: Record>() -> Self {
        FieldType::Record(RecordType::of::<T>())
    }

    /// Does the value already have this type's native shape?
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Any, _) => true,
            (FieldType::Null, Value::Null) => true,
            (FieldType::Text, Value::Text(_)) => true,
            (FieldType::Integer, Value::Integer(_)) => true,
            (FieldType::Real, Value::Real(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Literal(allowed), Value::Text(s)) => allowed.contains(&s.as_str()),
            (FieldType::List(element), Value::List(items)) => items.iter().all(|v| element.accepts(v)),
            (FieldType::Record(ty), Value::Record(record)) => record.record_type() == *ty,
            (FieldType::Union(members), v) => members.iter().any(|m| m.accepts(v)),
            _ => false,
        }
    }

    /// Attempt to construct a value of this type from `value`
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            FieldType::Any => Some(value.clone()),
            FieldType::Null => value.is_null().then_some(Value::Null),
            FieldType::Text => match value {
                Value::Null | Value::Record(_) => None,
                other => Some(Value::Text(other.to_display_string())),
            },
            FieldType::Integer => i64::from_value(value.clone()).ok().map(Value::Integer),
            FieldType::Real => f64::from_value(value.clone()).ok().map(Value::Real),
            FieldType::Boolean => bool::from_value(value.clone()).ok().map(Value::Bool),
            FieldType::Literal(allowed) => {
                let text = value.to_display_string();
                allowed.contains(&text.as_str()).then_some(Value::Text(text))
            }
            FieldType::List(element) => {
                let items = match value {
                    Value::List(items) => items.clone(),
                    Value::Text(text) => match Value::parse_json(text).ok()? {
                        Value::List(items) => items,
                        _ => return None,
                    },
                    _ => return None,
                };
                items
                    .iter()
                    .map(|item| element.coerce(item))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::List)
            }
            FieldType::Record(ty) => match value {
                Value::Record(record) if record.record_type() == *ty => Some(value.clone()),
                _ => None,
            },
            FieldType::Union(members) => members.iter().find_map(|m| m.coerce(value)),
        }
    }

    fn collect_record_types(&self, out: &mut Vec<RecordType>) {
        match self {
            FieldType::Record(ty) => out.push(*ty),
            FieldType::List(element) => element.collect_record_types(out),
            FieldType::Union(members) => {
                for member in members {
                    member.collect_record_types(out);
                }
            }
            _ => {}
        }
    }
}

/// A declared field: `(name, declared type, default)`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, default: None }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Field mapping of one record, tagged with its record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    ty: RecordType,
    fields: IndexMap<String, Value>,
}

impl RecordValue {
    pub fn new(ty: RecordType) -> Self {
        Self {
            ty,
            fields: IndexMap::new(),
        }
    }

    pub fn of<T: Record>() -> Self {
        Self::new(RecordType::of::<T>())
    }

    /// Builder-style field assignment
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn record_type(&self) -> RecordType {
        self.ty
    }

    pub fn type_name(&self) -> &'static str {
        self.ty.name()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The value of the primary-key field
    pub fn key(&self, primary_key: &str) -> Result<Value> {
        self.fields.get(primary_key).cloned().ok_or_else(|| {
            Error::InputType(format!(
                "record of type '{}' has no primary key field '{}'",
                self.ty, primary_key
            ))
        })
    }

    /// Remove a field and extract it as `T`. A missing field reads as null.
    pub fn take<T: FromValue>(&mut self, name: &str) -> Result<T> {
        let value = self.take_value(name);
        T::from_value(value).map_err(|e| self.field_error(name, e))
    }

    pub fn take_value(&mut self, name: &str) -> Value {
        self.fields.shift_remove(name).unwrap_or_default()
    }

    /// Remove a nested-record field and build it
    pub fn take_record<T: Record>(&mut self, name: &str) -> Result<T> {
        match self.take_value(name) {
            Value::Record(record) => T::from_record(record),
            other => Err(self.field_error(
                name,
                Error::Validation(format!("expected {} record, found {}", T::TYPE_NAME, other.kind())),
            )),
        }
    }

    pub fn take_records<T: Record>(&mut self, name: &str) -> Result<Vec<T>> {
        match self.take_value(name) {
            Value::List(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Record(record) => T::from_record(record),
                    other => Err(self.field_error(
                        name,
                        Error::Validation(format!("expected {} record, found {}", T::TYPE_NAME, other.kind())),
                    )),
                })
                .collect(),
            other => Err(self.field_error(
                name,
                Error::Validation(format!("expected list of {}, found {}", T::TYPE_NAME, other.kind())),
            )),
        }
    }

    fn field_error(&self, name: &str, error: Error) -> Error {
        match error {
            Error::Validation(msg) => Error::Validation(format!("{}.{}: {}", self.ty, name, msg)),
            other => other,
        }
    }
}
