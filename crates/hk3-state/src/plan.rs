//! Plans produced by planners and consumed by the executor.
//!
//! Planner output from outside the process (replay files, model responses) is
//! untyped JSON. [`normalize_plan`] is the only way such input becomes a
//! [`Plan`]: every action is checked field by field and anything missing or
//! ill-typed is dropped rather than guessed at.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Hold time for a key press when the action does not give one
pub const DEFAULT_KEY_MS: u64 = 50;

fn default_key_ms() -> u64 {
    DEFAULT_KEY_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    /// Left click at client-area coordinates
    Click { x: i32, y: i32 },
    #[serde(rename = "keypress")]
    KeyPress {
        key: String,
        #[serde(default = "default_key_ms", alias = "ms")]
        duration_ms: u64,
    },
    Wait { ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default)]
    pub risky: bool,
}

impl Action {
    pub fn click(x: i32, y: i32) -> Self {
        ActionKind::Click { x, y }.into()
    }

    pub fn key_press(key: impl Into<String>, duration_ms: u64) -> Self {
        ActionKind::KeyPress {
            key: key.into(),
            duration_ms,
        }
        .into()
    }

    pub fn wait(ms: u64) -> Self {
        ActionKind::Wait { ms }.into()
    }

    pub fn with_risky(mut self, risky: bool) -> Self {
        self.risky = risky;
        self
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        Self { kind, risky: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub intent: String,
    pub actions: Vec<Action>,
    pub requires_confirmation: bool,
}

impl Plan {
    /// `requires_confirmation` is forced on when any action is risky.
    pub fn new(intent: impl Into<String>, actions: Vec<Action>, requires_confirmation: bool) -> Self {
        let risky = actions.iter().any(|a| a.risky);
        Self {
            intent: intent.into(),
            actions,
            requires_confirmation: requires_confirmation || risky,
        }
    }

    pub fn noop(intent: impl Into<String>) -> Self {
        Self::new(intent, Vec::new(), false)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Turn arbitrary planner JSON into a validated plan.
///
/// - A non-object value yields an empty `noop` plan.
/// - `intent` defaults to `noop` unless it is a string.
/// - Actions of unknown type, with missing or ill-typed fields, or with a
///   non-boolean `risky` are discarded.
/// - `requires_confirmation` is kept only when it is a boolean and is always
///   raised by a risky action.
pub fn normalize_plan(value: &Value) -> Plan {
    let Some(obj) = value.as_object() else {
        warn!("Planner output is not a JSON object; using no-op plan");
        return Plan::noop("noop");
    };

    let intent = obj
        .get("intent")
        .and_then(Value::as_str)
        .unwrap_or("noop")
        .to_string();

    let raw_actions: &[Value] = match obj.get("actions") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => {
            warn!("Planner 'actions' is not a list: {}", other);
            &[]
        }
        None => &[],
    };

    let mut actions = Vec::with_capacity(raw_actions.len());
    for raw in raw_actions {
        match normalize_action(raw) {
            Some(action) => actions.push(action),
            None => warn!("Discarding malformed action: {}", raw),
        }
    }

    let explicit = obj
        .get("requires_confirmation")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let plan = Plan::new(intent, actions, explicit);
    debug!(
        "Normalized plan '{}': {} of {} actions kept",
        plan.intent,
        plan.actions.len(),
        raw_actions.len()
    );
    plan
}

fn normalize_action(raw: &Value) -> Option<Action> {
    let obj = raw.as_object()?;
    let risky = match obj.get("risky") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return None,
    };

    let kind = match obj.get("type")?.as_str()? {
        "click" => ActionKind::Click {
            x: int_field(obj, "x")?,
            y: int_field(obj, "y")?,
        },
        "keypress" => {
            let key = obj.get("key")?.as_str()?;
            if key.is_empty() {
                return None;
            }
            let duration_ms = match obj.get("duration_ms").or_else(|| obj.get("ms")) {
                None => DEFAULT_KEY_MS,
                Some(v) => v.as_u64()?,
            };
            ActionKind::KeyPress {
                key: key.to_string(),
                duration_ms,
            }
        }
        "wait" => ActionKind::Wait {
            ms: obj.get("ms")?.as_u64()?,
        },
        _ => return None,
    };

    Some(Action { kind, risky })
}

fn int_field(obj: &Map<String, Value>, name: &str) -> Option<i32> {
    obj.get(name)?.as_i64()?.try_into().ok()
}
