use chrono::{DateTime, FixedOffset};
use itertools::Itertools;
use tracing::info;

use crate::{
    database::db_structs::{Game, Round},
    error::EngineError,
    model::structures::game_status::GameStatus
};

/// Groups the completed-game ledger into rounds.
///
/// Games are ordered by scheduled time ascending, tie-broken by game id
/// so replay order is deterministic, then grouped into rounds wherever
/// timestamps are exactly equal. An empty ledger yields zero rounds and
/// the replay completes trivially.
pub fn build_rounds(mut games: Vec<Game>) -> Result<Vec<Round>, EngineError> {
    games.retain(|g| g.status == GameStatus::Completed);

    for game in &games {
        validate_game(game)?;
    }

    games.sort_by_key(|g| (scheduled_at(g), g.id));

    let mut rounds: Vec<Round> = Vec::new();
    for (scheduled, chunk) in &games.into_iter().chunk_by(scheduled_at) {
        let chunk_games: Vec<Game> = chunk.collect();
        rounds.push(round_from_games(rounds.len() as i32 + 1, scheduled, chunk_games)?);
    }

    info!(rounds = rounds.len(), "ledger grouped into rounds");
    Ok(rounds)
}

fn validate_game(game: &Game) -> Result<(), EngineError> {
    if game.scheduled_at.is_none() {
        return Err(EngineError::Data(format!(
            "completed game {} has no scheduled time",
            game.id
        )));
    }

    if game.home_score < 0 || game.away_score < 0 {
        return Err(EngineError::Data(format!("game {} has a negative score", game.id)));
    }

    Ok(())
}

// Only called after validation.
fn scheduled_at(game: &Game) -> DateTime<FixedOffset> {
    game.scheduled_at.expect("Expected completed game to have a scheduled time")
}

/// Every game in a round must belong to the same (season, week) bucket.
/// A round straddling two buckets would make weekly snapshots ambiguous.
fn round_from_games(id: i32, scheduled_at: DateTime<FixedOffset>, games: Vec<Game>) -> Result<Round, EngineError> {
    let first = games.first().expect("Expected at least one game per round");
    let (season_id, week) = (first.season_id, first.week);

    if let Some(stray) = games.iter().find(|g| g.season_id != season_id || g.week != week) {
        return Err(EngineError::Data(format!(
            "round at {} spans buckets: game {} is in season {} week {}, game {} is in season {} week {}",
            scheduled_at, first.id, season_id, week, stray.id, stray.season_id, stray.week
        )));
    }

    let game_count = games.len();
    Ok(Round {
        id,
        season_id,
        week,
        scheduled_at,
        games,
        game_count
    })
}
