pub mod error;
pub mod turn;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use turn::{Contact, CounterpartKind, Cursor, Page, Turn, TurnRole};
pub use types::{ActorId, ConversationId, TurnId};
