//! Record types shared by the unit tests

use crate::record::{FieldDef, FieldType, Hooks, Record, RecordValue, SpecialInsert, StorableForm};
use crate::value::Value;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub uuid: String,
    pub name: String,
}

impl Person {
    pub fn new(uuid: &str, name: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: name.to_string(),
        }
    }
}

impl Record for Person {
    const TYPE_NAME: &'static str = "testing::Person";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("name", FieldType::Text),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("name", &self.name)
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            name: record.take("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Employee {
    pub uuid: String,
    pub person: Person,
}

impl Employee {
    pub fn new(uuid: &str, person: Person) -> Self {
        Self {
            uuid: uuid.to_string(),
            person,
        }
    }
}

impl Record for Employee {
    const TYPE_NAME: &'static str = "testing::Employee";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("person", FieldType::record::<Person>()),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("person", self.person.to_record())
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            person: record.take_record("person")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Baz {
    pub uuid: String,
    pub employee: Employee,
}

impl Record for Baz {
    const TYPE_NAME: &'static str = "testing::Baz";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("employee", FieldType::record::<Employee>()),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("employee", self.employee.to_record())
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            employee: record.take_record("employee")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub uuid: String,
    pub members: Vec<Person>,
}

impl Record for Team {
    const TYPE_NAME: &'static str = "testing::Team";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("members", FieldType::list(FieldType::record::<Person>())),
        ]
    }

    fn to_record(&self) -> RecordValue {
        let members: Vec<Value> = self.members.iter().map(|p| Value::Record(p.to_record())).collect();
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("members", Value::List(members))
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            members: record.take_records("members")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Car {
    pub series_number: String,
    pub model: String,
}

impl Record for Car {
    const TYPE_NAME: &'static str = "testing::Car";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("series_number", FieldType::Text),
            FieldDef::new("model", FieldType::Text),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("series_number", &self.series_number)
            .with("model", &self.model)
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            series_number: record.take("series_number")?,
            model: record.take("model")?,
        })
    }
}

/// Every scalar kind plus a list and an optional with a default
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub uuid: String,
    pub ex_str: String,
    pub ex_int: i64,
    pub ex_float: f64,
    pub ex_bool: bool,
    pub ex_list: Vec<String>,
    pub ex_date: Option<String>,
}

impl Example {
    pub fn sample(uuid: &str, ex_str: &str, ex_int: i64) -> Self {
        Self {
            uuid: uuid.to_string(),
            ex_str: ex_str.to_string(),
            ex_int,
            ex_float: ex_int as f64 / 3.0,
            ex_bool: ex_int % 2 == 0,
            ex_list: vec![ex_str.to_string(), "".to_string(), "ünïcode".to_string()],
            ex_date: Some("2024-05-01T12:00:00".to_string()),
        }
    }
}

impl Record for Example {
    const TYPE_NAME: &'static str = "testing::Example";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("ex_str", FieldType::Text),
            FieldDef::new("ex_int", FieldType::Integer),
            FieldDef::new("ex_float", FieldType::Real),
            FieldDef::new("ex_bool", FieldType::Boolean),
            FieldDef::new("ex_list", FieldType::list(FieldType::Text)),
            FieldDef::new("ex_date", FieldType::optional(FieldType::Text)).with_default(Value::Null),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("ex_str", &self.ex_str)
            .with("ex_int", self.ex_int)
            .with("ex_float", self.ex_float)
            .with("ex_bool", self.ex_bool)
            .with("ex_list", self.ex_list.clone())
            .with("ex_date", self.ex_date.clone())
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            ex_str: record.take("ex_str")?,
            ex_int: record.take("ex_int")?,
            ex_float: record.take("ex_float")?,
            ex_bool: record.take("ex_bool")?,
            ex_list: record.take("ex_list")?,
            ex_date: record.take("ex_date")?,
        })
    }
}

pub const GREETINGS: &[&str] = &["hello", "hi", "hey"];

#[derive(Debug, Clone, PartialEq)]
pub enum StrOrInt {
    Str(String),
    Int(i64),
}

/// Literal, any, optional and union fields
#[derive(Debug, Clone, PartialEq)]
pub struct Extended {
    pub uuid: String,
    pub ex_literal: String,
    pub ex_list_any: Vec<String>,
    pub ex_any: Value,
    pub ex_optional: Option<String>,
    pub ex_union: StrOrInt,
}

impl Record for Extended {
    const TYPE_NAME: &'static str = "testing::Extended";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("ex_literal", FieldType::Literal(GREETINGS)),
            FieldDef::new("ex_list_any", FieldType::list(FieldType::Any)),
            FieldDef::new("ex_any", FieldType::Any),
            FieldDef::new("ex_optional", FieldType::optional(FieldType::Text)),
            FieldDef::new("ex_union", FieldType::Union(vec![FieldType::Text, FieldType::Integer])),
        ]
    }

    fn to_record(&self) -> RecordValue {
        let ex_union = match &self.ex_union {
            StrOrInt::Str(s) => Value::from(s),
            StrOrInt::Int(i) => Value::from(*i),
        };
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("ex_literal", &self.ex_literal)
            .with("ex_list_any", self.ex_list_any.clone())
            .with("ex_any", self.ex_any.clone())
            .with("ex_optional", self.ex_optional.clone())
            .with("ex_union", ex_union)
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        let ex_literal: String = record.take("ex_literal")?;
        if !GREETINGS.contains(&ex_literal.as_str()) {
            return Err(Error::Validation(format!("'{}' is not a greeting", ex_literal)));
        }
        let ex_union = match record.take_value("ex_union") {
            Value::Text(s) => StrOrInt::Str(s),
            Value::Integer(i) => StrOrInt::Int(i),
            other => return Err(Error::Validation(format!("ex_union: unexpected {}", other.kind()))),
        };
        Ok(Self {
            uuid: record.take("uuid")?,
            ex_literal,
            ex_list_any: record.take("ex_list_any")?,
            ex_any: record.take_value("ex_any"),
            ex_optional: record.take("ex_optional")?,
            ex_union,
        })
    }
}

/// Stored as `"_<name>"` through its custom conversion
#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    pub name: String,
}

impl Hello {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }

    /// Accepts either a record or the converted `"_<name>"` text
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Record(record) => Hello::from_record(record),
            Value::Text(text) => Ok(Hello::new(text.strip_prefix('_').unwrap_or(&text))),
            other => Err(Error::Validation(format!("can not build Hello from {}", other.kind()))),
        }
    }
}

impl Record for Hello {
    const TYPE_NAME: &'static str = "testing::Hello";

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new("name", FieldType::Text)]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>().with("name", &self.name)
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self { name: record.take("name")? })
    }

    fn hooks() -> Hooks {
        Hooks::new().special_insert::<Self>()
    }
}

impl SpecialInsert for Hello {
    fn convert(&self) -> Value {
        Value::Text(format!("_{}", self.name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct World {
    pub uuid: String,
    pub hello: Hello,
}

impl World {
    pub fn new(uuid: &str, hello: Hello) -> Self {
        Self {
            uuid: uuid.to_string(),
            hello,
        }
    }
}

impl Record for World {
    const TYPE_NAME: &'static str = "testing::World";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("hello", FieldType::record::<Hello>()),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("hello", self.hello.to_record())
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            hello: Hello::from_value(record.take_value("hello"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Greetings {
    pub uuid: String,
    pub data: Vec<Hello>,
}

impl Record for Greetings {
    const TYPE_NAME: &'static str = "testing::Greetings";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("data", FieldType::list(FieldType::record::<Hello>())),
        ]
    }

    fn to_record(&self) -> RecordValue {
        let data: Vec<Value> = self.data.iter().map(|h| Value::Record(h.to_record())).collect();
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("data", Value::List(data))
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        let data = match record.take_value("data") {
            Value::List(items) => items.into_iter().map(Hello::from_value).collect::<Result<Vec<_>>>()?,
            other => return Err(Error::Validation(format!("data: value is not a list ({})", other.kind()))),
        };
        Ok(Self {
            uuid: record.take("uuid")?,
            data,
        })
    }
}

/// Normalizes its email in the stored row
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub uuid: String,
    pub email: String,
}

impl Record for Account {
    const TYPE_NAME: &'static str = "testing::Account";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("email", FieldType::Text),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("email", &self.email)
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            email: record.take("email")?,
        })
    }

    fn hooks() -> Hooks {
        Hooks::new().storable_form::<Self>()
    }
}

impl StorableForm for Account {
    fn storable_form(&self) -> RecordValue {
        self.to_record().with("email", self.email.to_lowercase())
    }
}

/// Declares a conversion but switches it off, so it stores like any nested record
#[derive(Debug, Clone, PartialEq)]
pub struct Muted {
    pub uuid: String,
    pub name: String,
}

impl Muted {
    pub fn new(uuid: &str, name: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: name.to_string(),
        }
    }
}

impl Record for Muted {
    const TYPE_NAME: &'static str = "testing::Muted";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("name", FieldType::Text),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("name", &self.name)
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            name: record.take("name")?,
        })
    }

    fn hooks() -> Hooks {
        Hooks::new().special_insert::<Self>()
    }
}

impl SpecialInsert for Muted {
    const ENABLED: bool = false;

    fn convert(&self) -> Value {
        Value::Text(format!("_{}", self.name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub uuid: String,
    pub muted: Muted,
}

impl Record for Stage {
    const TYPE_NAME: &'static str = "testing::Stage";

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("uuid", FieldType::Text),
            FieldDef::new("muted", FieldType::record::<Muted>()),
        ]
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::of::<Self>()
            .with("uuid", &self.uuid)
            .with("muted", self.muted.to_record())
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            uuid: record.take("uuid")?,
            muted: record.take_record("muted")?,
        })
    }
}
