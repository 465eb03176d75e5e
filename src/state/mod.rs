pub mod conversation;
pub mod progress;

pub use conversation::{Conversation, Role, Turn};
pub use progress::{ProgressEstimator, TailCursor, TICK_PERIOD};
