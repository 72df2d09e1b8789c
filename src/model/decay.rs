use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::{
    database::db_structs::{PlayerRating, RatingAdjustment, RatingParameters},
    model::{constants::VOLATILITY_GROWTH_RATE, rating_tracker::RatingTracker, structures::rating_source::RatingSource}
};

/// # How this works
///
/// The replay calls this once per season-transition boundary it crosses
/// (the caller counts boundaries, so a season with zero games still gets
/// its pass). Every active player takes exactly one decay application
/// per boundary:
///
/// - volatility widens by the growth rate, capped at the initial
///   volatility, so uncertainty never decreases across a boundary
/// - the rating mean regresses toward the league baseline, keeping
///   `decay_factor` of its deviation
///
/// Players whose last played season is more than the configured limit
/// behind the boundary are flagged inactive afterwards. They stay in the
/// table but leave the active view and take no further decay.
pub fn apply_season_boundary(
    tracker: &mut RatingTracker,
    boundary_season: i32,
    boundary_time: DateTime<FixedOffset>,
    params: &RatingParameters
) -> usize {
    let mut decayed = 0;

    for rating in tracker.ratings_mut() {
        if !rating.is_active {
            continue;
        }

        decay_player(rating, boundary_time, params);
        decayed += 1;

        if inactive_beyond_limit(rating, boundary_season, params) {
            rating.is_active = false;
        }
    }

    debug!(boundary_season, decayed, "season decay applied");
    decayed
}

fn decay_player(rating: &mut PlayerRating, boundary_time: DateTime<FixedOffset>, params: &RatingParameters) {
    let new_rating = decay_rating(rating.rating, params.initial_rating, params.decay_factor);
    let new_volatility = decay_volatility(rating.volatility, params.initial_volatility);

    rating.adjustments.push(RatingAdjustment {
        player_id: rating.player_id,
        round_id: None,
        source: RatingSource::Decay,
        rating_before: rating.rating,
        rating_after: new_rating,
        rating_delta: new_rating - rating.rating,
        volatility_before: rating.volatility,
        volatility_after: new_volatility,
        timestamp: boundary_time
    });

    rating.last_delta = new_rating - rating.rating;
    rating.last_updated = Some(boundary_time);
    rating.rating = new_rating;
    rating.volatility = new_volatility;
}

/// Keeps `factor` of the deviation from baseline. Works in both
/// directions: above-baseline ratings shrink, below-baseline ratings
/// recover toward it.
fn decay_rating(mu: f64, baseline: f64, factor: f64) -> f64 {
    baseline + (mu - baseline) * factor
}

fn decay_volatility(sigma: f64, cap: f64) -> f64 {
    let new_sigma = (sigma.powf(2.0) + VOLATILITY_GROWTH_RATE).sqrt();

    new_sigma.min(cap)
}

fn inactive_beyond_limit(rating: &PlayerRating, boundary_season: i32, params: &RatingParameters) -> bool {
    match rating.last_played_season {
        Some(last) => boundary_season - last > params.inactive_season_limit,
        None => false
    }
}
