pub mod guard;
pub mod prompt;

pub use guard::{SessionGuard, SESSION_HEADER};
pub use prompt::{FixedAnswer, OperatorPrompt};
