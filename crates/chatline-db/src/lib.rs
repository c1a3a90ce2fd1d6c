pub mod pager;
pub mod profiles;
pub mod turn_store;

pub use pager::CursorPager;
pub use profiles::{CounterpartProfile, ProfileResolver, ScriptedExchange};
pub use turn_store::{SqliteTurnStore, TurnStore};
