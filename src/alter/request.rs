//! Alteration request shapes and their canonical form.
//!
//! Clients describe a column change in one of three shapes:
//!
//! * [`RequestShape::DefaultDict`]: the object carries a
//!   `column_default_dict` key (`{"value": ..., "is_dynamic": ...}`), a
//!   string `type` and a sibling `type_options`.
//! * [`RequestShape::NestedType`]: no `column_default_dict`, and `type` is an
//!   object `{"name": ..., "options": ...}`. Defaults use a `default` wrapper.
//! * [`RequestShape::Current`]: everything else. `type` is a string with a
//!   sibling `type_options`, and defaults use a `default` wrapper.
//!
//! Detection applies those rules in that order, then the object is parsed
//! strictly into the matching shape and funneled into one
//! [`AlterationRequest`] before normalization, so equivalent requests in
//! any shape produce the same [`ColumnAlteration`].

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::AlterError;

/// Keys a batch update item may carry.
pub const BATCH_ALLOWED_KEYS: &[&str] = &["attnum", "name", "type", "type_options", "delete"];

/// A field that can be left alone, cleared, or set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Unset,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    /// Replaces a set value with the patch `f` derives from it.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Patch<U>) -> Patch<U> {
        match self {
            Patch::Unset => Patch::Unset,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => f(value),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        }
    }
}

// A missing key never reaches these impls: fields use `#[serde(default)]`
// for `Unset` and `skip_serializing_if = "Patch::is_unset"`.
impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Set(value) => serializer.serialize_some(value),
            Patch::Unset | Patch::Clear => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Patch::from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// Canonical column alteration, as the `alter_columns` procedure expects it.
///
/// Only keys carrying an instruction are serialized. `default` and
/// `description` keep an explicit `null`, which clears the property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAlteration {
    pub attnum: i16,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_change: Option<TypeChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_null: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Patch::is_unset")]
    pub default: Patch<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    #[serde(skip_serializing_if = "Patch::is_unset")]
    pub description: Patch<String>,
}

impl ColumnAlteration {
    pub fn requested_type(&self) -> Option<&str> {
        self.type_change.as_ref().and_then(|change| change.name.as_deref())
    }

    /// Whether the alteration assigns a new default value. Clearing a
    /// default does not count.
    pub fn sets_default(&self) -> bool {
        self.default.is_set()
    }

    /// Builds the JSON object passed to `alter_columns`, with the same keys
    /// the `Serialize` impl writes.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("attnum".into(), Value::from(self.attnum));
        if let Some(change) = &self.type_change {
            let mut type_object = Map::new();
            if let Some(name) = &change.name {
                type_object.insert("name".into(), Value::String(name.clone()));
            }
            if let Some(options) = &change.options {
                type_object.insert("options".into(), options.clone());
            }
            object.insert("type".into(), Value::Object(type_object));
        }
        if let Some(not_null) = self.not_null {
            object.insert("not_null".into(), Value::Bool(not_null));
        }
        if let Some(name) = &self.name {
            object.insert("name".into(), Value::String(name.clone()));
        }
        match &self.default {
            Patch::Unset => {}
            Patch::Clear => {
                object.insert("default".into(), Value::Null);
            }
            Patch::Set(value) => {
                object.insert("default".into(), value.clone());
            }
        }
        if let Some(delete) = self.delete {
            object.insert("delete".into(), Value::Bool(delete));
        }
        match &self.description {
            Patch::Unset => {}
            Patch::Clear => {
                object.insert("description".into(), Value::Null);
            }
            Patch::Set(text) => {
                object.insert("description".into(), Value::String(text.clone()));
            }
        }
        Value::Object(object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    DefaultDict,
    NestedType,
    Current,
}

impl RequestShape {
    pub fn detect(object: &Map<String, Value>) -> Self {
        if object.contains_key("column_default_dict") {
            RequestShape::DefaultDict
        } else if matches!(object.get("type"), Some(Value::Object(_))) {
            RequestShape::NestedType
        } else {
            RequestShape::Current
        }
    }
}

impl fmt::Display for RequestShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestShape::DefaultDict => "column_default_dict",
            RequestShape::NestedType => "nested type",
            RequestShape::Current => "current",
        };
        f.write_str(label)
    }
}

/// Shape-independent view of an alteration request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlterationRequest {
    pub attnum: Option<i64>,
    /// Alternate identifier field kept for older clients.
    pub id: Option<i64>,
    pub type_name: Option<String>,
    pub type_options: Option<Value>,
    pub nullable: Option<bool>,
    pub name: Option<String>,
    pub default: Patch<Value>,
    pub delete: Option<bool>,
    pub description: Patch<String>,
}

#[derive(Debug, Deserialize)]
struct CommonFields {
    attnum: Option<i64>,
    id: Option<i64>,
    nullable: Option<bool>,
    name: Option<String>,
    delete: Option<bool>,
    #[serde(default)]
    description: Patch<String>,
}

#[derive(Debug, Deserialize)]
struct DefaultWrapper {
    #[serde(default)]
    value: Patch<Value>,
}

fn unwrap_default(wrapper: Patch<DefaultWrapper>) -> Patch<Value> {
    wrapper.and_then(|wrapper| wrapper.value)
}

#[derive(Debug, Deserialize)]
struct DefaultDictShape {
    #[serde(flatten)]
    common: CommonFields,
    #[serde(rename = "type")]
    type_name: Option<String>,
    type_options: Option<Value>,
    #[serde(default)]
    column_default_dict: Patch<DefaultWrapper>,
}

#[derive(Debug, Deserialize)]
struct NestedTypeShape {
    #[serde(flatten)]
    common: CommonFields,
    #[serde(rename = "type")]
    type_spec: NestedType,
    #[serde(default)]
    default: Patch<DefaultWrapper>,
}

#[derive(Debug, Deserialize)]
struct NestedType {
    name: Option<String>,
    options: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CurrentShape {
    #[serde(flatten)]
    common: CommonFields,
    #[serde(rename = "type")]
    type_name: Option<String>,
    type_options: Option<Value>,
    #[serde(default)]
    default: Patch<DefaultWrapper>,
}

fn with_common(common: CommonFields) -> AlterationRequest {
    AlterationRequest {
        attnum: common.attnum,
        id: common.id,
        nullable: common.nullable,
        name: common.name,
        delete: common.delete,
        description: common.description,
        ..AlterationRequest::default()
    }
}

impl From<DefaultDictShape> for AlterationRequest {
    fn from(shape: DefaultDictShape) -> Self {
        AlterationRequest {
            type_name: shape.type_name,
            type_options: shape.type_options,
            default: unwrap_default(shape.column_default_dict),
            ..with_common(shape.common)
        }
    }
}

impl From<NestedTypeShape> for AlterationRequest {
    fn from(shape: NestedTypeShape) -> Self {
        AlterationRequest {
            type_name: shape.type_spec.name,
            type_options: shape.type_spec.options,
            default: unwrap_default(shape.default),
            ..with_common(shape.common)
        }
    }
}

impl From<CurrentShape> for AlterationRequest {
    fn from(shape: CurrentShape) -> Self {
        AlterationRequest {
            type_name: shape.type_name,
            type_options: shape.type_options,
            default: unwrap_default(shape.default),
            ..with_common(shape.common)
        }
    }
}

fn parse_shape<T>(value: Value, shape: RequestShape) -> Result<AlterationRequest, AlterError>
where
    T: DeserializeOwned + Into<AlterationRequest>,
{
    serde_json::from_value::<T>(value)
        .map(Into::into)
        .map_err(|err| AlterError::validation(format!("{shape} request: {err}")))
}

impl AlterationRequest {
    /// Detects the shape of a JSON request object and parses it.
    pub fn from_value(value: Value) -> Result<Self, AlterError> {
        let Value::Object(object) = &value else {
            return Err(AlterError::validation(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        };
        let shape = RequestShape::detect(object);
        match shape {
            RequestShape::DefaultDict => parse_shape::<DefaultDictShape>(value, shape),
            RequestShape::NestedType => parse_shape::<NestedTypeShape>(value, shape),
            RequestShape::Current => parse_shape::<CurrentShape>(value, shape),
        }
    }

    /// Produces the canonical alteration. The attribute number comes from
    /// `attnum`, then `fallback_attnum`, then `id`.
    pub fn normalize(self, fallback_attnum: Option<i16>) -> Result<ColumnAlteration, AlterError> {
        let attnum = resolve_attnum(self.attnum, fallback_attnum, self.id)?;
        let name = self.type_name.filter(|name| !name.is_empty());
        let options = self.type_options.filter(is_truthy);
        let type_change = (name.is_some() || options.is_some())
            .then_some(TypeChange { name, options });
        let column_name = self
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        Ok(ColumnAlteration {
            attnum,
            type_change,
            not_null: self.nullable.map(|nullable| !nullable),
            name: column_name,
            default: self.default,
            delete: self.delete,
            description: self.description,
        })
    }
}

fn resolve_attnum(
    explicit: Option<i64>,
    fallback: Option<i16>,
    alternate: Option<i64>,
) -> Result<i16, AlterError> {
    let raw = explicit
        .or(fallback.map(i64::from))
        .or(alternate)
        .ok_or_else(|| AlterError::validation("a column attnum is required"))?;
    i16::try_from(raw)
        .ok()
        .filter(|attnum| *attnum > 0)
        .ok_or_else(|| AlterError::validation(format!("attnum {raw} is not a valid column number")))
}

/// Python-style truthiness, used to drop empty type options.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Normalizes a request in any accepted shape.
pub fn normalize(value: Value, fallback_attnum: Option<i16>) -> Result<ColumnAlteration, AlterError> {
    AlterationRequest::from_value(value)?.normalize(fallback_attnum)
}

/// Checks every batch item against [`BATCH_ALLOWED_KEYS`] before anything is
/// sent to the database. One bad item rejects the whole batch.
pub fn validate_batch(items: &[Value]) -> Result<(), AlterError> {
    for (index, item) in items.iter().enumerate() {
        let Value::Object(object) = item else {
            return Err(AlterError::validation(format!(
                "batch item {index} must be an object, got {}",
                json_kind(item)
            )));
        };
        if !object.contains_key("attnum") {
            return Err(AlterError::validation("Key \"attnum\" is required"));
        }
        let unknown = object
            .keys()
            .filter(|key| !BATCH_ALLOWED_KEYS.contains(&key.as_str()))
            .collect::<BTreeSet<_>>();
        if let Some(key) = unknown.first() {
            return Err(AlterError::validation(format!(
                "Key \"{key}\" found in columns. Keys allowed are: {}",
                BATCH_ALLOWED_KEYS.join(", ")
            )));
        }
    }
    Ok(())
}
