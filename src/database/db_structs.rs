use crate::model::{
    constants,
    structures::{
        game_status::GameStatus, game_type::GameType, job_status::JobStatus, job_type::JobType,
        rating_source::RatingSource
    }
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A season registration: the team id games reference, and the player
/// who plays under it. Roster management lives in the CRUD layer; the
/// engine only ever resolves team -> player through this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: i32,
    pub season_id: i32,
    pub name: String,
    pub player_id: i32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: i32,
    pub season_id: i32,
    pub week: i32,
    /// Nullable in the document store. A completed game without one is
    /// malformed and aborts the replay before any write.
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    pub home_team_id: i32,
    pub away_team_id: i32,
    pub home_score: i32,
    pub away_score: i32,
    pub game_type: GameType,
    pub status: GameStatus
}

/// Games sharing one exact scheduled timestamp, replayed as one batch.
/// The id is the 1-based ordinal of the round within the replay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: i32,
    pub season_id: i32,
    pub week: i32,
    pub scheduled_at: DateTime<FixedOffset>,
    pub games: Vec<Game>,
    pub game_count: usize
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRating {
    pub player_id: i32,
    pub rating: f64,
    pub volatility: f64,
    pub games_played: i32,
    pub seasons_played: i32,
    pub last_played_season: Option<i32>,
    pub last_updated: Option<DateTime<FixedOffset>>,
    pub last_delta: f64,
    pub is_active: bool,
    /// Assigned at publish and snapshot time, contiguous among active players.
    pub global_rank: i32,
    pub percentile: f64,
    /// The adjustments that led to this rating value.
    pub adjustments: Vec<RatingAdjustment>
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingAdjustment {
    pub player_id: i32,
    pub round_id: Option<i32>,
    pub source: RatingSource,
    pub rating_before: f64,
    pub rating_after: f64,
    pub rating_delta: f64,
    pub volatility_before: f64,
    pub volatility_after: f64,
    pub timestamp: DateTime<FixedOffset>
}

/// One row of a weekly snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub player_id: i32,
    pub rank: i32,
    pub rating: f64,
    pub volatility: f64,
    pub weekly_delta: f64,
    pub games_this_week: i32,
    pub games_played: i32
}

/// Immutable history record for one (season, week) bucket. Corrections
/// require a fresh full rebuild that regenerates every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankingSnapshot {
    pub season_id: i32,
    pub week: i32,
    pub entries: Vec<SnapshotEntry>,
    pub games_processed: i32,
    pub average_rating: f64,
    pub active_player_count: i32,
    pub calculated_at: DateTime<Utc>
}

/// The parameters a rebuild ran with, recorded on the job so any table
/// can be reproduced from the ledger alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingParameters {
    pub initial_rating: f64,
    pub initial_volatility: f64,
    pub decay_factor: f64,
    pub playoff_multiplier: f64,
    pub margin_divisor: f64,
    pub margin_weight_cap: f64,
    pub inactive_season_limit: i32
}

impl Default for RatingParameters {
    fn default() -> Self {
        RatingParameters {
            initial_rating: constants::DEFAULT_RATING,
            initial_volatility: constants::DEFAULT_VOLATILITY,
            decay_factor: constants::SEASON_DECAY_FACTOR,
            playoff_multiplier: constants::PLAYOFF_MULTIPLIER,
            margin_divisor: constants::MARGIN_DIVISOR,
            margin_weight_cap: constants::MARGIN_WEIGHT_CAP,
            inactive_season_limit: constants::INACTIVE_SEASON_LIMIT
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub current_step: String,
    /// Monotonically non-decreasing within one run.
    pub percent: f64,
    pub current_season: Option<i32>,
    pub current_week: Option<i32>,
    pub rounds_processed: i32,
    pub rounds_total: i32,
    pub games_processed: i32
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub message: String,
    pub trace: String,
    pub timestamp: DateTime<Utc>
}

/// Last (season, week) bucket fully processed and snapshotted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub season_id: i32,
    pub week: i32
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: JobProgress,
    pub error: Option<JobError>,
    pub checkpoint: Option<Checkpoint>,
    pub parameters: RatingParameters
}

impl CalculationJob {
    pub fn full_rebuild(triggered_by: &str, parameters: RatingParameters) -> CalculationJob {
        CalculationJob {
            id: Uuid::new_v4(),
            job_type: JobType::FullRebuild,
            status: JobStatus::Pending,
            triggered_by: triggered_by.to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: JobProgress::default(),
            error: None,
            checkpoint: None,
            parameters
        }
    }
}

/// The published current-rankings table. Immutable once published;
/// a rebuild swaps in a whole new table keyed by its job id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingsTable {
    pub job_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub ratings: Vec<PlayerRating>
}

/// Response to a rebuild trigger. The caller polls for the outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub calculation_id: Uuid,
    pub status: JobStatus,
    pub message: String
}

/// League export consumed by the CLI to seed an in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueSeed {
    pub teams: Vec<Team>,
    pub games: Vec<Game>
}
