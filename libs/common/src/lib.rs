pub mod id;
pub mod room;

pub use room::{RoomId, RoomKind};
