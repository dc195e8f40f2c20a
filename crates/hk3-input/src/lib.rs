//! Gated synthetic input: the safety gate, input backends, the action executor
//! and the emergency-stop listener.

pub mod backend;
pub mod executor;
pub mod listener;
pub mod safety;

pub use backend::{default_backend, InputBackend, KeyName, MouseButton, UnavailableBackend};
pub use executor::ActionExecutor;
pub use listener::{spawn_kill_switch_listener, KILL_KEY};
pub use safety::{Inhibition, KillSwitch, SafetyContext};
