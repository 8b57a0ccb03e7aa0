pub mod msg_store;

pub use msg_store::{HistoryLimits, MsgStore};
