//! Order lifecycle rules: the transition table, the staff action gate and
//! the state machine that persists transitions.

pub mod actions;
pub mod order;

pub use actions::available_actions;
pub use order::{can_transition, is_terminal, OrderStateError, OrderStateMachine};
