//! Purpose: Declared, typed attributes with change tracking for the model layer.
//! Exports: `AttrType`, `Schema`, `Attributes`.
//! Role: Explicit schema per model type; a record's state between saves.
//! Invariants: Slot order follows the schema declaration order.
//! Invariants: The dirty set is empty right after construction and after
//! `clear_changes`; reverting a value to its original clears its entry.

use crate::core::error::{Error, ErrorKind};
use serde_json::{Map, Number, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttrType {
    String,
    Integer,
    Float,
    Boolean,
    Json,
}

/// Ordered list of declared attributes for one model type, plus the model
/// name used in generated document URIs.
#[derive(Clone, Debug)]
pub struct Schema {
    name: String,
    attrs: Vec<(String, AttrType)>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, ty: AttrType) -> Self {
        self.attrs.push((name.into(), ty));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attrs(&self) -> &[(String, AttrType)] {
        &self.attrs
    }

    pub fn declares(&self, name: &str) -> bool {
        self.attrs.iter().any(|(attr, _)| attr == name)
    }
}

#[derive(Clone, Debug)]
struct Slot {
    name: String,
    ty: AttrType,
    value: Value,
    original: Option<Value>,
}

/// Current value of every declared attribute plus the original value of each
/// attribute mutated since the last load, save, or destroy.
#[derive(Clone, Debug)]
pub struct Attributes {
    slots: Vec<Slot>,
}

impl Attributes {
    pub fn from_schema(schema: &Schema) -> Self {
        let slots = schema
            .attrs()
            .iter()
            .map(|(name, ty)| Slot {
                name: name.clone(),
                ty: *ty,
                value: Value::Null,
                original: None,
            })
            .collect();
        Self { slots }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| &slot.value)
    }

    /// Mutate one attribute, recording its original value. Unknown names are
    /// an error; values are cast to the declared type leniently.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), Error> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.name == name)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("unknown attribute: {name}"))
            })?;
        let value = cast_value(slot.ty, value);
        if value == slot.value {
            return Ok(());
        }
        match &slot.original {
            None => {
                slot.original = Some(std::mem::replace(&mut slot.value, value));
            }
            Some(original) => {
                if *original == value {
                    slot.original = None;
                }
                slot.value = value;
            }
        }
        Ok(())
    }

    /// Strict batch assignment; fails on the first undeclared name.
    pub fn assign(&mut self, values: &Map<String, Value>) -> Result<(), Error> {
        for (name, value) in values {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    /// Lenient batch assignment for server payloads; undeclared keys are
    /// dropped.
    pub(crate) fn assign_known(&mut self, values: &Map<String, Value>) {
        for (name, value) in values {
            if self.slots.iter().any(|slot| slot.name == *name) {
                // set cannot fail for a declared name
                let _ = self.set(name, value.clone());
            }
        }
    }

    pub fn changed(&self) -> bool {
        self.slots.iter().any(|slot| slot.original.is_some())
    }

    /// Dirty attributes in schema order as `(name, (old, new))`.
    pub fn changes(&self) -> Vec<(String, (Value, Value))> {
        self.slots
            .iter()
            .filter_map(|slot| {
                slot.original
                    .as_ref()
                    .map(|original| (slot.name.clone(), (original.clone(), slot.value.clone())))
            })
            .collect()
    }

    pub fn changed_names(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|slot| slot.original.is_some())
            .map(|slot| slot.name.as_str())
            .collect()
    }

    /// The value an attribute held before its pending change, if any.
    pub fn previous(&self, name: &str) -> Option<&Value> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .and_then(|slot| slot.original.as_ref())
    }

    pub fn clear_changes(&mut self) {
        for slot in &mut self.slots {
            slot.original = None;
        }
    }

    /// Every declared attribute as a JSON map, nulls included.
    pub fn to_map(&self) -> Map<String, Value> {
        self.slots
            .iter()
            .map(|slot| (slot.name.clone(), slot.value.clone()))
            .collect()
    }
}

fn cast_value(ty: AttrType, value: Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match ty {
        AttrType::String => match value {
            Value::String(text) => Value::String(text),
            other => Value::String(other.to_string()),
        },
        AttrType::Integer => {
            if let Some(n) = value.as_i64() {
                return Value::Number(Number::from(n));
            }
            if let Some(f) = value.as_f64() {
                return Value::Number(Number::from(f as i64));
            }
            if let Some(parsed) = value.as_str().and_then(|text| text.parse::<i64>().ok()) {
                return Value::Number(Number::from(parsed));
            }
            tracing::debug!(?value, "value not castable to integer, kept as-is");
            value
        }
        AttrType::Float => {
            let parsed = value
                .as_f64()
                .or_else(|| value.as_str().and_then(|text| text.parse::<f64>().ok()));
            match parsed.and_then(Number::from_f64) {
                Some(number) => Value::Number(number),
                None => {
                    tracing::debug!(?value, "value not castable to float, kept as-is");
                    value
                }
            }
        }
        AttrType::Boolean => match &value {
            Value::Bool(_) => value,
            Value::String(text) if text == "true" => Value::Bool(true),
            Value::String(text) if text == "false" => Value::Bool(false),
            _ => {
                tracing::debug!(?value, "value not castable to boolean, kept as-is");
                value
            }
        },
        AttrType::Json => value,
    }
}
