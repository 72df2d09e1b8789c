use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc
    }
};

use chrono::{DateTime, Duration, FixedOffset};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::{
    database::{
        db_structs::{
            CalculationJob, Game, LeagueSeed, PlayerRating, RankingSnapshot, RankingsTable, RatingAdjustment, Round,
            Team
        },
        store::{LeagueStore, MemoryStore}
    },
    error::StoreError,
    model::structures::{game_status::GameStatus, game_type::GameType, rating_source::RatingSource}
};

pub fn ts(s: &str) -> DateTime<FixedOffset> {
    s.parse().expect("Expected a valid RFC 3339 timestamp")
}

pub fn generate_team(id: i32, season_id: i32, player_id: i32) -> Team {
    Team {
        id,
        season_id,
        name: format!("Team {}", id),
        player_id
    }
}

/// (team id, player id) pairs into the roster mapping the engine uses.
pub fn generate_teams_for_players(pairs: &[(i32, i32)]) -> HashMap<i32, i32> {
    pairs.iter().copied().collect()
}

#[allow(clippy::too_many_arguments)]
pub fn generate_game(
    id: i32,
    season_id: i32,
    week: i32,
    scheduled_at: Option<DateTime<FixedOffset>>,
    home_team_id: i32,
    away_team_id: i32,
    home_score: i32,
    away_score: i32
) -> Game {
    Game {
        id,
        season_id,
        week,
        scheduled_at,
        home_team_id,
        away_team_id,
        home_score,
        away_score,
        game_type: GameType::Regular,
        status: GameStatus::Completed
    }
}

#[allow(clippy::too_many_arguments)]
pub fn generate_playoff_game(
    id: i32,
    season_id: i32,
    week: i32,
    scheduled_at: Option<DateTime<FixedOffset>>,
    home_team_id: i32,
    away_team_id: i32,
    home_score: i32,
    away_score: i32
) -> Game {
    let mut game = generate_game(
        id,
        season_id,
        week,
        scheduled_at,
        home_team_id,
        away_team_id,
        home_score,
        away_score
    );
    game.game_type = GameType::Playoff;
    game
}

pub fn generate_round(
    id: i32,
    season_id: i32,
    week: i32,
    scheduled_at: DateTime<FixedOffset>,
    games: Vec<Game>
) -> Round {
    let game_count = games.len();
    Round {
        id,
        season_id,
        week,
        scheduled_at,
        games,
        game_count
    }
}

pub fn generate_player_rating(player_id: i32, rating: f64, volatility: f64, games_played: i32) -> PlayerRating {
    let timestamp = ts("2024-01-06T10:00:00-05:00");

    PlayerRating {
        player_id,
        rating,
        volatility,
        games_played,
        seasons_played: 1,
        last_played_season: None,
        last_updated: Some(timestamp),
        last_delta: 0.0,
        is_active: true,
        global_rank: 0,
        percentile: 0.0,
        adjustments: vec![RatingAdjustment {
            player_id,
            round_id: None,
            source: RatingSource::Initial,
            rating_before: rating,
            rating_after: rating,
            rating_delta: 0.0,
            volatility_before: volatility,
            volatility_after: volatility,
            timestamp
        }]
    }
}

/// A deterministic multi-season league: every week pairs the teams off
/// in a single simultaneous round, with seeded scores. Two calls with
/// the same arguments produce an identical ledger.
pub fn generate_league_seed(n_seasons: i32, weeks_per_season: i32, team_pairs: &[(i32, i32)]) -> LeagueSeed {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let base = ts("2024-01-06T10:00:00-05:00");

    let teams = team_pairs
        .iter()
        .map(|(team_id, player_id)| generate_team(*team_id, 1, *player_id))
        .collect();

    let mut games = Vec::new();
    let mut game_id = 1;
    for season in 1..=n_seasons {
        for week in 1..=weeks_per_season {
            let scheduled_at =
                base + Duration::days(((season - 1) * 182) as i64) + Duration::weeks((week - 1) as i64);

            for pair in team_pairs.chunks(2) {
                let [home, away] = pair else { continue };
                let home_score = rng.random_range(0..=21);
                let away_score = rng.random_range(0..=21);

                games.push(generate_game(
                    game_id,
                    season,
                    week,
                    Some(scheduled_at),
                    home.0,
                    away.0,
                    home_score,
                    away_score
                ));
                game_id += 1;
            }
        }
    }

    LeagueSeed { teams, games }
}

pub fn seeded_store(seed: LeagueSeed) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.seed(seed);
    Arc::new(store)
}

/// Store wrapper that fails the first `failures` ledger reads with a
/// transient error, then behaves normally. Exercises the bounded-retry
/// path without a real outage.
pub struct FlakyStore<S: LeagueStore> {
    inner: S,
    failures: AtomicU32
}

impl<S: LeagueStore> FlakyStore<S> {
    pub fn new(inner: S, failures: u32) -> FlakyStore<S> {
        FlakyStore {
            inner,
            failures: AtomicU32::new(failures)
        }
    }
}

impl<S: LeagueStore> LeagueStore for FlakyStore<S> {
    fn completed_games(&self, season_id: Option<i32>) -> Result<Vec<Game>, StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }

        self.inner.completed_games(season_id)
    }

    fn team_players(&self) -> Result<HashMap<i32, i32>, StoreError> {
        self.inner.team_players()
    }

    fn publish_rankings(&self, table: RankingsTable) -> Result<(), StoreError> {
        self.inner.publish_rankings(table)
    }

    fn current_rankings(&self) -> Result<Option<Arc<RankingsTable>>, StoreError> {
        self.inner.current_rankings()
    }

    fn append_snapshot(&self, snapshot: RankingSnapshot) -> Result<(), StoreError> {
        self.inner.append_snapshot(snapshot)
    }

    fn snapshots(&self) -> Result<Vec<RankingSnapshot>, StoreError> {
        self.inner.snapshots()
    }

    fn insert_job(&self, job: CalculationJob) -> Result<(), StoreError> {
        self.inner.insert_job(job)
    }

    fn update_job(&self, job: &CalculationJob) -> Result<(), StoreError> {
        self.inner.update_job(job)
    }

    fn job(&self, id: Uuid) -> Result<Option<CalculationJob>, StoreError> {
        self.inner.job(id)
    }

    fn jobs(&self) -> Result<Vec<CalculationJob>, StoreError> {
        self.inner.jobs()
    }

    fn mark_round_calculated(&self, job_id: Uuid, round_id: i32) -> Result<(), StoreError> {
        self.inner.mark_round_calculated(job_id, round_id)
    }

    fn round_calculated(&self, job_id: Uuid, round_id: i32) -> Result<bool, StoreError> {
        self.inner.round_calculated(job_id, round_id)
    }
}
