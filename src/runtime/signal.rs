use std::fmt;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::dsl::TriggerDef;
use crate::error::EngineError;

/// An event travelling through the task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    Error {
        code: Option<String>,
        message: String,
    },
    Cancel,
    Timer {
        name: String,
    },
    Message {
        name: String,
        #[serde(default)]
        payload: Value,
    },
    Signal {
        name: String,
    },
}

impl Signal {
    pub fn error(code: Option<&str>, message: impl Into<String>) -> Self {
        Signal::Error {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn message(name: &str, payload: Value) -> Self {
        Signal::Message {
            name: name.to_string(),
            payload,
        }
    }

    pub fn timer(name: &str) -> Self {
        Signal::Timer { name: name.to_string() }
    }

    pub fn signal(name: &str) -> Self {
        Signal::Signal { name: name.to_string() }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Signal::Error { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Error and cancel signals must be handled by an interrupting listener;
    /// everything else is consumed by any listener.
    pub fn is_exceptional(&self) -> bool {
        matches!(self, Signal::Error { .. } | Signal::Cancel)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Error { code: Some(code), .. } => write!(f, "error({})", code),
            Signal::Error { code: None, .. } => write!(f, "error"),
            Signal::Cancel => write!(f, "cancel"),
            Signal::Timer { name } => write!(f, "timer({})", name),
            Signal::Message { name, .. } => write!(f, "message({})", name),
            Signal::Signal { name } => write!(f, "signal({})", name),
        }
    }
}

impl From<&EngineError> for Signal {
    fn from(err: &EngineError) -> Self {
        Signal::Error {
            code: Some(err.code().to_string()),
            message: err.to_string(),
        }
    }
}

/// What a boundary or intermediate catch event listens for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// `None` catches every error
    Error(Option<String>),
    Cancel,
    Timer(String),
    Message(String),
    Signal(String),
}

impl Trigger {
    /// How precisely this trigger matches `signal`: 2 for an exact match,
    /// 1 for a catch-all error, `None` when it does not match at all.
    pub fn specificity(&self, signal: &Signal) -> Option<u8> {
        match (self, signal) {
            (Trigger::Error(None), Signal::Error { .. }) => Some(1),
            (Trigger::Error(Some(expected)), Signal::Error { code: Some(code), .. }) if expected == code => Some(2),
            (Trigger::Cancel, Signal::Cancel) => Some(2),
            (Trigger::Timer(a), Signal::Timer { name }) if a == name => Some(2),
            (Trigger::Message(a), Signal::Message { name, .. }) if a == name => Some(2),
            (Trigger::Signal(a), Signal::Signal { name }) if a == name => Some(2),
            _ => None,
        }
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        self.specificity(signal).is_some()
    }

    /// Non-interrupting listeners of these kinds re-arm after firing.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, Trigger::Timer(_) | Trigger::Message(_) | Trigger::Signal(_))
    }

    /// The signal a throw event with this trigger emits.
    pub fn to_signal(&self, payload: Value) -> Signal {
        match self {
            Trigger::Error(code) => Signal::Error {
                code: code.clone(),
                message: "error thrown".to_string(),
            },
            Trigger::Cancel => Signal::Cancel,
            Trigger::Timer(name) => Signal::Timer { name: name.clone() },
            Trigger::Message(name) => Signal::Message {
                name: name.clone(),
                payload,
            },
            Trigger::Signal(name) => Signal::Signal { name: name.clone() },
        }
    }
}

impl From<&TriggerDef> for Trigger {
    fn from(def: &TriggerDef) -> Self {
        match def {
            TriggerDef::Error { code } => Trigger::Error(code.clone()),
            TriggerDef::Cancel => Trigger::Cancel,
            TriggerDef::Timer { timer } => Trigger::Timer(timer.clone()),
            TriggerDef::Message { name } => Trigger::Message(name.clone()),
            TriggerDef::Signal { name } => Trigger::Signal(name.clone()),
        }
    }
}
