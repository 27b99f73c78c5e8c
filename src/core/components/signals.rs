use crate::core::errors::SimError;
use crate::core::pattern::PathPattern;
use crate::core::time::TimeValue;
use crate::core::types::ComponentId;
use std::fmt;
use std::sync::Arc;

/// Emitted on a parent before a structural change below it
pub const PRE_MODEL_CHANGE: &str = "PRE_MODEL_CHANGE";
/// Emitted on a parent after a structural change below it
pub const POST_MODEL_CHANGE: &str = "POST_MODEL_CHANGE";

/// Kernel-internal signals, exempt from declaration checks
pub fn is_reserved_signal(name: &str) -> bool {
    name == PRE_MODEL_CHANGE || name == POST_MODEL_CHANGE
}

/// Objects that can travel as signal values
pub trait SignalObject: fmt::Debug + Send + Sync {
    fn class_name(&self) -> &str;

    /// Whether the object is of `class` or a subclass of it
    fn is_instance_of(&self, class: &str) -> bool {
        self.class_name() == class
    }
}

#[derive(Debug, Clone)]
pub enum SignalValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Time(TimeValue),
    String(String),
    Object(Option<Arc<dyn SignalObject>>),
}

impl SignalValue {
    pub fn object<T: SignalObject + 'static>(obj: T) -> Self {
        SignalValue::Object(Some(Arc::new(obj)))
    }

    fn type_name(&self) -> &'static str {
        match self {
            SignalValue::Bool(_) => "bool",
            SignalValue::Int(_) => "long",
            SignalValue::UInt(_) => "unsigned long",
            SignalValue::Double(_) => "double",
            SignalValue::Time(_) => "simtime_t",
            SignalValue::String(_) => "string",
            SignalValue::Object(_) => "object",
        }
    }
}

/// Declared data type of a signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalType {
    /// Declared without a type: anything goes
    Any,
    Bool,
    Int,
    UInt,
    Double,
    Time,
    String,
    Object { class: String, nullable: bool },
}

impl SignalType {
    /// Parse a declared type name; `Foo?` is a nullable object of class `Foo`
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "" => SignalType::Any,
            "bool" => SignalType::Bool,
            "long" | "int" => SignalType::Int,
            "unsigned long" | "uint" => SignalType::UInt,
            "double" => SignalType::Double,
            "simtime_t" | "time" => SignalType::Time,
            "string" => SignalType::String,
            other => match other.strip_suffix('?') {
                Some(class) => SignalType::Object {
                    class: class.to_string(),
                    nullable: true,
                },
                None => SignalType::Object {
                    class: other.to_string(),
                    nullable: false,
                },
            },
        }
    }

    fn type_name(&self) -> String {
        match self {
            SignalType::Any => "any".to_string(),
            SignalType::Bool => "bool".to_string(),
            SignalType::Int => "long".to_string(),
            SignalType::UInt => "unsigned long".to_string(),
            SignalType::Double => "double".to_string(),
            SignalType::Time => "simtime_t".to_string(),
            SignalType::String => "string".to_string(),
            SignalType::Object { class, .. } => class.clone(),
        }
    }

    /// Check an emitted value against this declared type
    pub fn check(&self, signal: &str, value: &SignalValue) -> Result<(), SimError> {
        let scalar_ok = match (self, value) {
            (SignalType::Any, _) => true,
            (SignalType::Bool, SignalValue::Bool(_))
            | (SignalType::Int, SignalValue::Int(_))
            | (SignalType::UInt, SignalValue::UInt(_))
            | (SignalType::Double, SignalValue::Double(_))
            | (SignalType::Time, SignalValue::Time(_))
            | (SignalType::String, SignalValue::String(_)) => true,
            (SignalType::Object { class, nullable }, SignalValue::Object(obj)) => {
                return match obj {
                    None if *nullable => Ok(()),
                    None => Err(SimError::Signal(format!(
                        "Signal '{}' emitted a null object, specify 'type={}?' in the declaration to allow it",
                        signal, class
                    ))),
                    Some(o) if o.is_instance_of(class) => Ok(()),
                    Some(o) => Err(SimError::Signal(format!(
                        "Signal '{}' emitted with wrong class ({} is not a {} as declared)",
                        signal,
                        o.class_name(),
                        class
                    ))),
                };
            }
            _ => false,
        };
        if scalar_ok {
            Ok(())
        } else {
            Err(SimError::Signal(format!(
                "Signal '{}' emitted with wrong data type (expected={}, actual={})",
                signal,
                self.type_name(),
                value.type_name()
            )))
        }
    }
}

/// Declaration of a signal (or a family of signals via a wildcard pattern)
#[derive(Debug, Clone)]
pub struct SignalDecl {
    pattern: PathPattern,
    ty: SignalType,
}

impl SignalDecl {
    pub fn new(pattern: &str, ty: SignalType) -> Self {
        Self {
            pattern: PathPattern::new(pattern),
            ty,
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn is_wildcard(&self) -> bool {
        !self.pattern.is_literal()
    }

    pub fn matches(&self, signal: &str) -> bool {
        self.pattern.matches(signal)
    }

    pub fn signal_type(&self) -> &SignalType {
        &self.ty
    }
}

/// Receives signals emitted on a component or anywhere below it
pub trait SignalListener: Send {
    fn receive_signal(&mut self, source: ComponentId, signal: &str, value: &SignalValue, at: TimeValue);
}

/// Structural change notification carried by the model-change signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChange {
    /// Pre: a component is about to be created under `parent`
    ComponentAdd { parent: Option<ComponentId>, name: String },
    /// Post: `component` has been created and inserted
    ComponentAdded { component: ComponentId },
    /// Pre: `component` and its subtree are about to be deleted
    ComponentDelete { component: ComponentId },
    /// Post: `component` (formerly called `name`) has been deleted
    ComponentDeleted { component: ComponentId, name: String },
    GateConnect { component: ComponentId, gate: usize },
    GateConnected { component: ComponentId, gate: usize },
    GateDisconnect { component: ComponentId, gate: usize },
    GateDisconnected { component: ComponentId, gate: usize },
}

impl SignalObject for ModelChange {
    fn class_name(&self) -> &str {
        match self {
            ModelChange::ComponentAdd { .. } => "PreComponentAddNotification",
            ModelChange::ComponentAdded { .. } => "PostComponentAddNotification",
            ModelChange::ComponentDelete { .. } => "PreComponentDeleteNotification",
            ModelChange::ComponentDeleted { .. } => "PostComponentDeleteNotification",
            ModelChange::GateConnect { .. } => "PreGateConnectNotification",
            ModelChange::GateConnected { .. } => "PostGateConnectNotification",
            ModelChange::GateDisconnect { .. } => "PreGateDisconnectNotification",
            ModelChange::GateDisconnected { .. } => "PostGateDisconnectNotification",
        }
    }

    fn is_instance_of(&self, class: &str) -> bool {
        class == "ModelChangeNotification" || class == self.class_name()
    }
}
