use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;

use crate::{
    database::db_structs::{PlayerRating, RatingAdjustment, RatingParameters},
    model::structures::rating_source::RatingSource
};

/// In-memory leaderboard for one replay. Holds every player rating,
/// keeps the table sorted on demand and assigns ranks and percentiles
/// among active players.
pub struct RatingTracker {
    leaderboard: IndexMap<i32, PlayerRating>
}

impl Default for RatingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RatingTracker {
    pub fn new() -> RatingTracker {
        RatingTracker {
            leaderboard: IndexMap::new()
        }
    }

    pub fn get_rating(&self, player_id: i32) -> Option<&PlayerRating> {
        self.leaderboard.get(&player_id)
    }

    pub fn ratings(&self) -> impl Iterator<Item = &PlayerRating> {
        self.leaderboard.values()
    }

    pub fn ratings_mut(&mut self) -> impl Iterator<Item = &mut PlayerRating> {
        self.leaderboard.values_mut()
    }

    pub fn len(&self) -> usize {
        self.leaderboard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaderboard.is_empty()
    }

    /// Creates the rating row for a player's first game. Subsequent
    /// calls for the same player are no-ops.
    pub fn ensure_player(&mut self, player_id: i32, params: &RatingParameters, timestamp: DateTime<FixedOffset>) {
        if self.leaderboard.contains_key(&player_id) {
            return;
        }

        let initial = PlayerRating {
            player_id,
            rating: params.initial_rating,
            volatility: params.initial_volatility,
            games_played: 0,
            seasons_played: 0,
            last_played_season: None,
            last_updated: None,
            last_delta: 0.0,
            is_active: true,
            global_rank: 0,
            percentile: 0.0,
            adjustments: vec![RatingAdjustment {
                player_id,
                round_id: None,
                source: RatingSource::Initial,
                rating_before: params.initial_rating,
                rating_after: params.initial_rating,
                rating_delta: 0.0,
                volatility_before: params.initial_volatility,
                volatility_after: params.initial_volatility,
                timestamp
            }]
        };

        self.leaderboard.insert(player_id, initial);
    }

    /// Applies a batch of updated ratings, one entry per player. Called
    /// once per round at the barrier, so every update in the batch was
    /// computed against the same pre-round table.
    pub fn insert_or_update(&mut self, ratings: &[PlayerRating]) {
        for rating in ratings {
            self.leaderboard.insert(rating.player_id, rating.clone());
        }
    }

    /// Sorts the table and reassigns ranks and percentiles. Ranks are
    /// contiguous from 1 among active players; inactive players keep no
    /// rank but stay in the table, ordered by rating like everyone else.
    pub fn sort(&mut self) {
        self.leaderboard.sort_by(|_, a, _, b| Self::compare(a, b));

        let active_count = self.leaderboard.values().filter(|r| r.is_active).count() as i32;
        let mut rank = 1;

        for rating in self.leaderboard.values_mut() {
            if rating.is_active {
                rating.global_rank = rank;
                rating.percentile = Self::percentile(rank, active_count).unwrap_or(0.0);
                rank += 1;
            } else {
                rating.global_rank = 0;
                rating.percentile = 0.0;
            }
        }
    }

    /// Sorted, ranked clone of the full table, ready for publishing.
    pub fn finalize(&mut self) -> Vec<PlayerRating> {
        self.sort();
        self.leaderboard.values().cloned().collect()
    }

    /// Rating descending, then games played descending, then player id.
    /// The two trailing keys make equal-rating orderings stable.
    fn compare(a: &PlayerRating, b: &PlayerRating) -> Ordering {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(Ordering::Equal)
            .then(b.games_played.cmp(&a.games_played))
            .then(a.player_id.cmp(&b.player_id))
    }

    /// `P = (n/N) * 100` where n is the number of players ranked below.
    fn percentile(rank: i32, total: i32) -> Option<f64> {
        match rank.cmp(&1) {
            Ordering::Less => None,
            _ => {
                let n = total - rank;
                Some(n as f64 / total as f64 * 100.0)
            }
        }
    }
}
