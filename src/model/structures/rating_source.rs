use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;

/// What produced a rating adjustment: the row created on first
/// appearance, a processed round, or a season decay pass.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RatingSource {
    Initial = 0,
    Round = 1,
    Decay = 2
}

impl TryFrom<i32> for RatingSource {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RatingSource::Initial),
            1 => Ok(RatingSource::Round),
            2 => Ok(RatingSource::Decay),
            _ => Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::structures::rating_source::RatingSource;

    #[test]
    fn test_convert_valid() {
        assert_eq!(RatingSource::try_from(0), Ok(RatingSource::Initial));
        assert_eq!(RatingSource::try_from(1), Ok(RatingSource::Round));
        assert_eq!(RatingSource::try_from(2), Ok(RatingSource::Decay));
    }

    #[test]
    fn test_convert_invalid() {
        assert_eq!(RatingSource::try_from(3), Err(()));
    }
}
