use crate::core::errors::SimError;
use crate::core::time::TimeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Bool,
    Int,
    Double,
    String,
    Time,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::Bool => "bool",
            ParamType::Int => "int",
            ParamType::Double => "double",
            ParamType::String => "string",
            ParamType::Time => "time",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Time(TimeValue),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Double(_) => ParamType::Double,
            ParamValue::String(_) => ParamType::String,
            ParamValue::Time(_) => ParamType::Time,
        }
    }

    pub fn as_bool(&self) -> Result<bool, SimError> {
        match self {
            ParamValue::Bool(b) => Ok(*b),
            other => Err(type_error("bool", other)),
        }
    }

    pub fn as_int(&self) -> Result<i64, SimError> {
        match self {
            ParamValue::Int(i) => Ok(*i),
            other => Err(type_error("int", other)),
        }
    }

    pub fn as_double(&self) -> Result<f64, SimError> {
        match self {
            ParamValue::Double(d) => Ok(*d),
            ParamValue::Int(i) => Ok(*i as f64),
            other => Err(type_error("double", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, SimError> {
        match self {
            ParamValue::String(s) => Ok(s),
            other => Err(type_error("string", other)),
        }
    }

    pub fn as_time(&self) -> Result<TimeValue, SimError> {
        match self {
            ParamValue::Time(t) => Ok(*t),
            ParamValue::Int(0) => Ok(TimeValue::ZERO),
            other => Err(type_error("time", other)),
        }
    }

    /// Convert to the declared type, allowing the lossless widenings
    pub fn coerce(self, ty: ParamType) -> Result<ParamValue, SimError> {
        match (ty, self) {
            (ParamType::Double, ParamValue::Int(i)) => Ok(ParamValue::Double(i as f64)),
            (ParamType::Time, ParamValue::String(s)) => TimeValue::parse(&s)
                .map(ParamValue::Time)
                .map_err(|e| SimError::Parameter(e.to_string())),
            (ty, v) if v.param_type() == ty => Ok(v),
            (ty, v) => Err(SimError::Parameter(format!(
                "cannot assign {} value {} to a parameter of type {}",
                v.param_type(),
                v,
                ty
            ))),
        }
    }

    fn canonical(&self) -> CanonicalValue {
        match self {
            ParamValue::Bool(b) => CanonicalValue::Bool(*b),
            ParamValue::Int(i) => CanonicalValue::Int(*i),
            ParamValue::Double(d) => {
                let d = if *d == 0.0 { 0.0 } else { *d };
                let bits = if d.is_nan() { f64::NAN.to_bits() } else { d.to_bits() };
                CanonicalValue::Double(bits)
            }
            ParamValue::String(s) => CanonicalValue::String(s.clone()),
            ParamValue::Time(t) => CanonicalValue::Time(t.raw()),
        }
    }
}

fn type_error(expected: &str, actual: &ParamValue) -> SimError {
    SimError::Parameter(format!(
        "cannot cast {} value {} to {}",
        actual.param_type(),
        actual,
        expected
    ))
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Double(d) => write!(f, "{}", d),
            ParamValue::String(s) => write!(f, "\"{}\"", s),
            ParamValue::Time(t) => write!(f, "{}s", t),
        }
    }
}

/// Declaration of a parameter on a component type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<ParamValue>,
    pub mutable: bool,
}

impl ParamDecl {
    pub fn new(name: &str, ty: ParamType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            default: None,
            mutable: false,
        }
    }

    pub fn with_default(mut self, value: ParamValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }
}

/// A parameter instance: name, value and mutability
#[derive(Debug, Clone, PartialEq)]
pub struct ParamImpl {
    name: String,
    value: ParamValue,
    mutable: bool,
    shared: bool,
}

impl ParamImpl {
    pub fn new(name: &str, value: ParamValue, mutable: bool) -> Self {
        Self {
            name: name.to_string(),
            value,
            mutable,
            shared: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

pub type SharedParam = Arc<ParamImpl>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CanonicalValue {
    Bool(bool),
    Int(i64),
    Double(u64),
    String(String),
    Time(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InternKey {
    name: String,
    value: CanonicalValue,
    mutable: bool,
}

/// Per-type cache of shared parameter instances.
///
/// Lookup either by an explicit key or by (name, canonical value,
/// mutability); equal values come back as the same `Arc`.
#[derive(Debug, Default)]
pub struct SharedParamCache {
    by_key: HashMap<String, SharedParam>,
    by_value: HashMap<InternKey, SharedParam>,
}

impl SharedParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_key(&self, key: &str) -> Option<SharedParam> {
        self.by_key.get(key).cloned()
    }

    pub fn put_by_key(&mut self, key: &str, param: SharedParam) -> Result<(), SimError> {
        if self.by_key.contains_key(key) {
            return Err(SimError::internal(format!(
                "shared parameter key '{}' is already present",
                key
            )));
        }
        self.by_key.insert(key.to_string(), param);
        Ok(())
    }

    pub fn get_or_intern(&mut self, name: &str, value: &ParamValue, mutable: bool) -> SharedParam {
        let key = InternKey {
            name: name.to_string(),
            value: value.canonical(),
            mutable,
        };
        self.by_value
            .entry(key)
            .or_insert_with(|| {
                Arc::new(ParamImpl {
                    name: name.to_string(),
                    value: value.clone(),
                    mutable,
                    shared: true,
                })
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_key.len() + self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_value.clear();
    }
}

#[derive(Debug, Clone)]
enum ParamSlot {
    Own(ParamImpl),
    Shared(SharedParam),
}

impl ParamSlot {
    fn get(&self) -> &ParamImpl {
        match self {
            ParamSlot::Own(p) => p,
            ParamSlot::Shared(p) => p,
        }
    }
}

/// The parameters of one component, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    slots: Vec<ParamSlot>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_own(&mut self, param: ParamImpl) {
        self.slots.push(ParamSlot::Own(param));
    }

    pub(crate) fn push_shared(&mut self, param: SharedParam) {
        self.slots.push(ParamSlot::Shared(param));
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.get().name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamImpl> {
        self.find(name).map(|i| self.slots[i].get())
    }

    pub fn value(&self, name: &str) -> Result<&ParamValue, SimError> {
        self.get(name)
            .map(|p| &p.value)
            .ok_or_else(|| SimError::Parameter(format!("no such parameter: '{}'", name)))
    }

    /// Shared instance backing `name`, if any
    pub fn shared(&self, name: &str) -> Option<&SharedParam> {
        match self.find(name).map(|i| &self.slots[i]) {
            Some(ParamSlot::Shared(p)) => Some(p),
            _ => None,
        }
    }

    /// Assign a new value; a shared instance is copied first so other
    /// components keep the old value.
    pub(crate) fn set(&mut self, name: &str, value: ParamValue) -> Result<(), SimError> {
        let idx = self
            .find(name)
            .ok_or_else(|| SimError::Parameter(format!("no such parameter: '{}'", name)))?;
        let ty = self.slots[idx].get().value.param_type();
        let value = value.coerce(ty)?;
        match &mut self.slots[idx] {
            ParamSlot::Own(p) => p.value = value,
            ParamSlot::Shared(p) => {
                let own = ParamImpl::new(&p.name, value, p.mutable);
                self.slots[idx] = ParamSlot::Own(own);
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamImpl> {
        self.slots.iter().map(ParamSlot::get)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
