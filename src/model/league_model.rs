use std::{cmp::Ordering, collections::HashMap};

use openskill::{
    model::{model::Model, plackett_luce::PlackettLuce},
    rating::{default_gamma, Rating}
};
use rayon::prelude::*;

use crate::{
    database::db_structs::{Game, PlayerRating, RatingAdjustment, RatingParameters, Round},
    error::EngineError,
    model::{
        constants,
        rating_tracker::RatingTracker,
        snapshot::SnapshotBuilder,
        structures::{game_type::GameType, rating_source::RatingSource}
    }
};

pub fn create_model() -> PlackettLuce {
    PlackettLuce::new(constants::BETA, constants::KAPPA, default_gamma)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Outcome {
    HomeWin,
    AwayWin,
    Draw
}

/// A game with both sides resolved to players. Resolution happens for
/// the whole round before any rating is touched, so a bad reference
/// aborts with the table untouched.
struct Pairing {
    game_id: i32,
    home_player: i32,
    away_player: i32,
    outcome: Outcome,
    margin: i32,
    is_playoff: bool
}

struct RatedGame {
    home: (i32, Rating),
    away: (i32, Rating)
}

/// # Round processing
///
/// The heart of the replay. One round at a time, strictly in
/// chronological order:
///
/// 1. Resolve every game's teams to players (abort on a bad reference).
/// 2. Create rating rows for first-time players.
/// 3. Rate each game against the pre-round table. Games within a round
///    are independent, so this step fans out across games.
/// 4. Apply all updates as one batch at the round barrier.
///
/// Rounds are never processed concurrently: round N's output is round
/// N+1's input, which is what makes per-player uncertainty meaningful.
pub struct LeagueModel {
    pub rating_tracker: RatingTracker,
    params: RatingParameters,
    team_players: HashMap<i32, i32>
}

impl LeagueModel {
    pub fn new(params: RatingParameters, team_players: HashMap<i32, i32>) -> LeagueModel {
        LeagueModel {
            rating_tracker: RatingTracker::new(),
            params,
            team_players
        }
    }

    pub fn process_round(&mut self, round: &Round, snapshots: &mut SnapshotBuilder) -> Result<(), EngineError> {
        let pairings: Vec<Pairing> = round.games.iter().map(|g| self.resolve(g)).collect::<Result<_, _>>()?;

        for pairing in &pairings {
            self.rating_tracker.ensure_player(pairing.home_player, &self.params, round.scheduled_at);
            self.rating_tracker.ensure_player(pairing.away_player, &self.params, round.scheduled_at);
        }

        // Every game rates against the same pre-round table, so the
        // fan-out is deterministic regardless of completion order.
        let rated: Vec<RatedGame> = pairings.par_iter().map(|p| self.rate_game(p)).collect();

        let mut updated: Vec<PlayerRating> = Vec::with_capacity(rated.len() * 2);
        for game in &rated {
            updated.push(self.apply_update(game.home.0, &game.home.1, round));
            updated.push(self.apply_update(game.away.0, &game.away.1, round));
        }
        self.rating_tracker.insert_or_update(&updated);

        for pairing in &pairings {
            snapshots.record_game(pairing.home_player, pairing.away_player);
        }

        Ok(())
    }

    fn resolve(&self, game: &Game) -> Result<Pairing, EngineError> {
        let home_player = self.resolve_team(game, game.home_team_id)?;
        let away_player = self.resolve_team(game, game.away_team_id)?;

        let outcome = match game.home_score.cmp(&game.away_score) {
            Ordering::Greater => Outcome::HomeWin,
            Ordering::Less => Outcome::AwayWin,
            Ordering::Equal => Outcome::Draw
        };

        Ok(Pairing {
            game_id: game.id,
            home_player,
            away_player,
            outcome,
            margin: (game.home_score - game.away_score).abs(),
            is_playoff: game.game_type == GameType::Playoff
        })
    }

    fn resolve_team(&self, game: &Game, team_id: i32) -> Result<i32, EngineError> {
        self.team_players.get(&team_id).copied().ok_or_else(|| {
            EngineError::Reference(format!("game {} references unknown team {}", game.id, team_id))
        })
    }

    /// Rates one game as two single-player teams. The model's mean
    /// movement is then scaled by the outcome weight; volatility is
    /// taken from the model unscaled.
    fn rate_game(&self, pairing: &Pairing) -> RatedGame {
        let home = self
            .rating_tracker
            .get_rating(pairing.home_player)
            .expect("Expected home player to have a rating");
        let away = self
            .rating_tracker
            .get_rating(pairing.away_player)
            .expect("Expected away player to have a rating");

        let teams = vec![
            vec![Rating {
                mu: home.rating,
                sigma: home.volatility
            }],
            vec![Rating {
                mu: away.rating,
                sigma: away.volatility
            }],
        ];

        let ranks = match pairing.outcome {
            Outcome::HomeWin => vec![1, 2],
            Outcome::AwayWin => vec![2, 1],
            Outcome::Draw => vec![1, 1]
        };

        let results: Vec<Rating> = create_model().rate(teams, ranks).into_iter().flatten().collect();
        let [raw_home, raw_away] = results.as_slice() else {
            panic!("Expected exactly two rated sides for game {}", pairing.game_id)
        };

        let weight = self.outcome_weight(pairing);

        RatedGame {
            home: (pairing.home_player, Self::weighted(home.rating, raw_home, weight)),
            away: (pairing.away_player, Self::weighted(away.rating, raw_away, weight))
        }
    }

    /// The differential-scaling rule: a win by `margin` points weighs
    /// `1 + margin / margin_divisor`, bounded by `margin_weight_cap` so
    /// blowouts cannot distort the table. Playoff games multiply the
    /// weight further by the configured playoff multiplier.
    fn outcome_weight(&self, pairing: &Pairing) -> f64 {
        let margin = margin_weight(pairing.margin, &self.params);

        if pairing.is_playoff {
            margin * self.params.playoff_multiplier
        } else {
            margin
        }
    }

    fn weighted(old_mu: f64, raw: &Rating, weight: f64) -> Rating {
        let mu = (old_mu + (raw.mu - old_mu) * weight).max(constants::ABSOLUTE_RATING_FLOOR);

        Rating { mu, sigma: raw.sigma }
    }

    /// Clones the player's pre-round row and folds one game into it.
    /// The clone is applied back to the tracker at the barrier.
    fn apply_update(&self, player_id: i32, new_rating: &Rating, round: &Round) -> PlayerRating {
        let mut current = self
            .rating_tracker
            .get_rating(player_id)
            .expect("Expected player to have a rating")
            .clone();

        let delta = new_rating.mu - current.rating;

        current.adjustments.push(RatingAdjustment {
            player_id,
            round_id: Some(round.id),
            source: RatingSource::Round,
            rating_before: current.rating,
            rating_after: new_rating.mu,
            rating_delta: delta,
            volatility_before: current.volatility,
            volatility_after: new_rating.sigma,
            timestamp: round.scheduled_at
        });

        current.rating = new_rating.mu;
        current.volatility = new_rating.sigma;
        current.games_played += 1;
        if current.last_played_season != Some(round.season_id) {
            current.seasons_played += 1;
            current.last_played_season = Some(round.season_id);
        }
        current.last_updated = Some(round.scheduled_at);
        current.last_delta = delta;
        // Playing again brings a flagged player back into the table
        current.is_active = true;

        current
    }
}

fn margin_weight(margin: i32, params: &RatingParameters) -> f64 {
    (1.0 + margin as f64 / params.margin_divisor).min(params.margin_weight_cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::constants::DEFAULT_RATING,
        utils::test_utils::{generate_game, generate_playoff_game, generate_round, generate_teams_for_players, ts}
    };
    use approx::assert_abs_diff_eq;

    fn model_for(team_players: &[(i32, i32)]) -> LeagueModel {
        LeagueModel::new(RatingParameters::default(), team_players.iter().copied().collect())
    }

    #[test]
    fn test_margin_weight_is_bounded() {
        let params = RatingParameters::default();

        assert_abs_diff_eq!(margin_weight(0, &params), 1.0);
        assert_abs_diff_eq!(margin_weight(2, &params), 1.2);
        assert_abs_diff_eq!(margin_weight(5, &params), 1.5);
        // Past the cap, bigger blowouts change nothing
        assert_abs_diff_eq!(margin_weight(30, &params), 1.5);
    }

    #[test]
    fn test_winner_gains_and_loser_drops() {
        let mut model = model_for(&[(1, 100), (2, 200)]);
        let round = generate_round(
            1,
            1,
            1,
            ts("2024-01-06T10:00:00-05:00"),
            vec![generate_game(1, 1, 1, Some(ts("2024-01-06T10:00:00-05:00")), 1, 2, 21, 15)]
        );

        let mut snapshots = SnapshotBuilder::new(DEFAULT_RATING);
        model.process_round(&round, &mut snapshots).unwrap();

        let winner = model.rating_tracker.get_rating(100).unwrap();
        let loser = model.rating_tracker.get_rating(200).unwrap();

        assert!(winner.rating > DEFAULT_RATING);
        assert!(loser.rating < DEFAULT_RATING);
        assert_eq!(winner.games_played, 1);
        assert_eq!(loser.games_played, 1);
        assert_eq!(winner.adjustments.len(), 2);
        assert_eq!(winner.adjustments.last().unwrap().source, RatingSource::Round);
        assert_abs_diff_eq!(winner.last_delta, winner.rating - DEFAULT_RATING);
    }

    #[test]
    fn test_draw_between_equal_players_stays_equal() {
        let mut model = model_for(&[(1, 100), (2, 200)]);
        let round = generate_round(
            1,
            1,
            1,
            ts("2024-01-06T10:00:00-05:00"),
            vec![generate_game(1, 1, 1, Some(ts("2024-01-06T10:00:00-05:00")), 1, 2, 18, 18)]
        );

        let mut snapshots = SnapshotBuilder::new(DEFAULT_RATING);
        model.process_round(&round, &mut snapshots).unwrap();

        let home = model.rating_tracker.get_rating(100).unwrap();
        let away = model.rating_tracker.get_rating(200).unwrap();

        assert_abs_diff_eq!(home.rating, away.rating, epsilon = 1e-9);
    }

    #[test]
    fn test_larger_margin_moves_ratings_further() {
        let time = ts("2024-01-06T10:00:00-05:00");

        let mut narrow = model_for(&[(1, 100), (2, 200)]);
        let mut snapshots = SnapshotBuilder::new(DEFAULT_RATING);
        narrow
            .process_round(
                &generate_round(1, 1, 1, time, vec![generate_game(1, 1, 1, Some(time), 1, 2, 16, 15)]),
                &mut snapshots
            )
            .unwrap();

        let mut blowout = model_for(&[(1, 100), (2, 200)]);
        blowout
            .process_round(
                &generate_round(1, 1, 1, time, vec![generate_game(1, 1, 1, Some(time), 1, 2, 21, 3)]),
                &mut snapshots
            )
            .unwrap();

        let narrow_delta = narrow.rating_tracker.get_rating(100).unwrap().rating - DEFAULT_RATING;
        let blowout_delta = blowout.rating_tracker.get_rating(100).unwrap().rating - DEFAULT_RATING;

        assert!(blowout_delta > narrow_delta);
        // Margin 1 weighs 1.1, margin 18 hits the 1.5 cap
        assert_abs_diff_eq!(blowout_delta / narrow_delta, 1.5 / 1.1, epsilon = 1e-6);
    }

    #[test]
    fn test_playoff_games_move_ratings_further() {
        let time = ts("2024-01-06T10:00:00-05:00");

        let mut regular = model_for(&[(1, 100), (2, 200)]);
        let mut snapshots = SnapshotBuilder::new(DEFAULT_RATING);
        regular
            .process_round(
                &generate_round(1, 1, 1, time, vec![generate_game(1, 1, 1, Some(time), 1, 2, 21, 15)]),
                &mut snapshots
            )
            .unwrap();

        let mut playoff = model_for(&[(1, 100), (2, 200)]);
        playoff
            .process_round(
                &generate_round(1, 1, 1, time, vec![generate_playoff_game(1, 1, 1, Some(time), 1, 2, 21, 15)]),
                &mut snapshots
            )
            .unwrap();

        let regular_delta = regular.rating_tracker.get_rating(100).unwrap().rating - DEFAULT_RATING;
        let playoff_delta = playoff.rating_tracker.get_rating(100).unwrap().rating - DEFAULT_RATING;

        assert_abs_diff_eq!(playoff_delta / regular_delta, 1.25, epsilon = 1e-6);
    }

    #[test]
    fn test_unknown_team_is_a_reference_error() {
        let mut model = model_for(&[(1, 100)]);
        let time = ts("2024-01-06T10:00:00-05:00");
        let round = generate_round(1, 1, 1, time, vec![generate_game(1, 1, 1, Some(time), 1, 99, 21, 15)]);

        let mut snapshots = SnapshotBuilder::new(DEFAULT_RATING);
        let result = model.process_round(&round, &mut snapshots);

        assert!(matches!(result, Err(EngineError::Reference(_))));
        // Aborted before any rating row was created
        assert!(model.rating_tracker.is_empty());
    }

    #[test]
    fn test_game_order_within_round_does_not_matter() {
        let time = ts("2024-01-06T10:00:00-05:00");
        let games = vec![
            generate_game(1, 1, 1, Some(time), 1, 2, 21, 15),
            generate_game(2, 1, 1, Some(time), 3, 4, 11, 21),
        ];
        let teams = generate_teams_for_players(&[(1, 100), (2, 200), (3, 300), (4, 400)]);

        let mut forward = LeagueModel::new(RatingParameters::default(), teams.clone());
        let mut snapshots = SnapshotBuilder::new(DEFAULT_RATING);
        forward
            .process_round(&generate_round(1, 1, 1, time, games.clone()), &mut snapshots)
            .unwrap();

        let mut reversed_games = games;
        reversed_games.reverse();
        let mut backward = LeagueModel::new(RatingParameters::default(), teams);
        backward
            .process_round(&generate_round(1, 1, 1, time, reversed_games), &mut snapshots)
            .unwrap();

        for player in [100, 200, 300, 400] {
            assert_abs_diff_eq!(
                forward.rating_tracker.get_rating(player).unwrap().rating,
                backward.rating_tracker.get_rating(player).unwrap().rating,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_new_season_increments_seasons_played_once() {
        let mut model = model_for(&[(1, 100), (2, 200)]);
        let mut snapshots = SnapshotBuilder::new(DEFAULT_RATING);

        let t1 = ts("2024-01-06T10:00:00-05:00");
        let t2 = ts("2024-01-13T10:00:00-05:00");
        let t3 = ts("2024-04-06T10:00:00-05:00");

        model
            .process_round(
                &generate_round(1, 1, 1, t1, vec![generate_game(1, 1, 1, Some(t1), 1, 2, 21, 15)]),
                &mut snapshots
            )
            .unwrap();
        model
            .process_round(
                &generate_round(2, 1, 2, t2, vec![generate_game(2, 1, 2, Some(t2), 1, 2, 15, 21)]),
                &mut snapshots
            )
            .unwrap();
        model
            .process_round(
                &generate_round(3, 2, 1, t3, vec![generate_game(3, 2, 1, Some(t3), 1, 2, 21, 12)]),
                &mut snapshots
            )
            .unwrap();

        let rating = model.rating_tracker.get_rating(100).unwrap();
        assert_eq!(rating.games_played, 3);
        assert_eq!(rating.seasons_played, 2);
        assert_eq!(rating.last_played_season, Some(2));
    }
}
