use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::Display;

/// The only supported trigger. Incremental recomputation was dropped:
/// partial replay cannot reconstruct per-player uncertainty without the
/// full ordered history.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u8)]
pub enum JobType {
    FullRebuild = 0
}

impl TryFrom<i32> for JobType {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(JobType::FullRebuild),
            _ => Err(())
        }
    }
}
