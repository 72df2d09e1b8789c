use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;

/// Playoff games carry a configurable multiplier on rating movement.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameType {
    Regular = 0,
    Playoff = 1
}

impl TryFrom<i32> for GameType {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(GameType::Regular),
            1 => Ok(GameType::Playoff),
            _ => Err(())
        }
    }
}
