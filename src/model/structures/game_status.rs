use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;

/// Scheduling state of a game in the document store. Only completed
/// games ever reach the rating engine.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameStatus {
    Scheduled = 0,
    Completed = 1,
    Cancelled = 2
}

impl TryFrom<i32> for GameStatus {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(GameStatus::Scheduled),
            1 => Ok(GameStatus::Completed),
            2 => Ok(GameStatus::Cancelled),
            _ => Err(())
        }
    }
}
