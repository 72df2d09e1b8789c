use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use crate::{
    database::db_structs::{RankingSnapshot, SnapshotEntry},
    model::rating_tracker::RatingTracker
};

/// Accumulates per-week play counts during the replay and emits one
/// immutable snapshot per completed (season, week) bucket. The builder
/// remembers each player's rating as of the previous snapshot so the
/// week-over-week delta is computed at write time.
pub struct SnapshotBuilder {
    initial_rating: f64,
    previous_ratings: HashMap<i32, f64>,
    games_this_week: HashMap<i32, i32>,
    games_processed: i32,
    snapshots_written: usize
}

impl SnapshotBuilder {
    pub fn new(initial_rating: f64) -> SnapshotBuilder {
        SnapshotBuilder {
            initial_rating,
            previous_ratings: HashMap::new(),
            games_this_week: HashMap::new(),
            games_processed: 0,
            snapshots_written: 0
        }
    }

    /// Called once per processed game, after its updates are applied.
    pub fn record_game(&mut self, home_player_id: i32, away_player_id: i32) {
        *self.games_this_week.entry(home_player_id).or_default() += 1;
        *self.games_this_week.entry(away_player_id).or_default() += 1;
        self.games_processed += 1;
    }

    pub fn snapshots_written(&self) -> usize {
        self.snapshots_written
    }

    /// Closes the bucket: ranks the table and produces its snapshot.
    /// Entries cover active players only; a player's first snapshot
    /// measures its delta from the configured start point.
    pub fn flush(&mut self, tracker: &mut RatingTracker, season_id: i32, week: i32) -> RankingSnapshot {
        tracker.sort();

        let mut entries = Vec::new();
        let mut rating_sum = 0.0;

        for rating in tracker.ratings().filter(|r| r.is_active) {
            let previous = self
                .previous_ratings
                .get(&rating.player_id)
                .copied()
                .unwrap_or(self.initial_rating);

            entries.push(SnapshotEntry {
                player_id: rating.player_id,
                rank: rating.global_rank,
                rating: rating.rating,
                volatility: rating.volatility,
                weekly_delta: rating.rating - previous,
                games_this_week: self.games_this_week.get(&rating.player_id).copied().unwrap_or(0),
                games_played: rating.games_played
            });
            rating_sum += rating.rating;
        }

        let active_player_count = entries.len() as i32;
        let average_rating = if entries.is_empty() {
            0.0
        } else {
            rating_sum / entries.len() as f64
        };

        // Inactive players keep a baseline too, so their delta is sane
        // if they return.
        for rating in tracker.ratings() {
            self.previous_ratings.insert(rating.player_id, rating.rating);
        }
        self.games_this_week.clear();
        self.snapshots_written += 1;

        debug!(season_id, week, active_player_count, "snapshot flushed");

        RankingSnapshot {
            season_id,
            week,
            entries,
            games_processed: self.games_processed,
            average_rating,
            active_player_count,
            calculated_at: Utc::now()
        }
    }
}
