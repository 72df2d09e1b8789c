use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    database::{
        db_structs::{CalculationJob, Checkpoint, RankingsTable, Round},
        store::LeagueStore
    },
    error::{EngineError, StoreError},
    model::{league_model::LeagueModel, snapshot::SnapshotBuilder},
    utils::progress_utils::progress_bar
};

pub mod constants;
pub mod decay;
pub mod ledger;
pub mod league_model;
pub mod rating_tracker;
pub mod snapshot;
pub mod structures;

/// What a completed replay did, reported back to the controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaySummary {
    pub rounds_processed: usize,
    pub games_processed: usize,
    pub snapshots_written: usize,
    pub players_rated: usize
}

/// Replays the entire game ledger and publishes the resulting table.
///
/// The flow per round: flush the previous (season, week) snapshot when
/// the bucket changes, run one decay pass per season boundary crossed,
/// process the round, mark it in the calculated-round ledger and push
/// progress onto the job record. Publishing happens exactly once, after
/// the final snapshot; a failure anywhere leaves the previous table
/// authoritative.
///
/// The caller polls the job record for progress; `cancel` is honored
/// only at round boundaries.
pub fn run_full_replay<S: LeagueStore>(
    store: &S,
    job: &mut CalculationJob,
    cancel: &AtomicBool
) -> Result<ReplaySummary, EngineError> {
    set_step(store, job, "reading match ledger")?;
    let games = read_with_retries(|| store.completed_games(None))?;
    let team_players = read_with_retries(|| store.team_players())?;

    set_step(store, job, "grouping rounds")?;
    let rounds = ledger::build_rounds(games)?;

    job.progress.rounds_total = rounds.len() as i32;
    store.update_job(job)?;
    info!(job_id = %job.id, rounds = rounds.len(), "replay starting");

    let mut model = LeagueModel::new(job.parameters.clone(), team_players);
    let mut snapshots = SnapshotBuilder::new(job.parameters.initial_rating);
    let mut summary = ReplaySummary::default();
    let mut bucket: Option<(i32, i32)> = None;

    let bar = progress_bar(rounds.len() as u64, "Replaying rounds".to_string());
    for round in &rounds {
        if cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }

        if let Some((season, week)) = bucket {
            validate_bucket_order((season, week), round)?;

            if (round.season_id, round.week) != (season, week) {
                let snapshot = snapshots.flush(&mut model.rating_tracker, season, week);
                store.append_snapshot(snapshot)?;
                job.checkpoint = Some(Checkpoint { season_id: season, week });
            }

            // One pass per boundary, so an empty season still decays
            for boundary in (season + 1)..=round.season_id {
                decay::apply_season_boundary(
                    &mut model.rating_tracker,
                    boundary,
                    round.scheduled_at,
                    &job.parameters
                );
            }
        }

        if store.round_calculated(job.id, round.id)? {
            warn!(job_id = %job.id, round_id = round.id, "round already folded into this rebuild, skipping");
        } else {
            model.process_round(round, &mut snapshots)?;
            store.mark_round_calculated(job.id, round.id)?;
        }

        bucket = Some((round.season_id, round.week));
        summary.rounds_processed += 1;
        summary.games_processed += round.game_count;

        job.progress.rounds_processed = summary.rounds_processed as i32;
        job.progress.games_processed = summary.games_processed as i32;
        job.progress.percent = summary.rounds_processed as f64 / rounds.len() as f64 * 100.0;
        job.progress.current_season = Some(round.season_id);
        job.progress.current_week = Some(round.week);
        job.progress.current_step = "replaying rounds".to_string();
        store.update_job(job)?;

        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = bar {
        b.finish();
    }

    if let Some((season, week)) = bucket {
        let snapshot = snapshots.flush(&mut model.rating_tracker, season, week);
        store.append_snapshot(snapshot)?;
        job.checkpoint = Some(Checkpoint { season_id: season, week });
    }

    set_step(store, job, "publishing rankings")?;
    let table = RankingsTable {
        job_id: job.id,
        generated_at: Utc::now(),
        ratings: model.rating_tracker.finalize()
    };
    summary.players_rated = table.ratings.len();
    summary.snapshots_written = snapshots.snapshots_written();
    store.publish_rankings(table)?;

    info!(
        job_id = %job.id,
        rounds = summary.rounds_processed,
        games = summary.games_processed,
        players = summary.players_rated,
        "replay complete"
    );
    Ok(summary)
}

/// Buckets must advance season-first. Seeing an earlier bucket again
/// means timestamps and the schedule disagree, and the snapshot log
/// would come out unordered.
fn validate_bucket_order(previous: (i32, i32), round: &Round) -> Result<(), EngineError> {
    if (round.season_id, round.week) < previous {
        return Err(EngineError::Data(format!(
            "round {} (season {} week {}) is scheduled after season {} week {}",
            round.id, round.season_id, round.week, previous.0, previous.1
        )));
    }

    Ok(())
}

fn set_step<S: LeagueStore>(store: &S, job: &mut CalculationJob, step: &str) -> Result<(), EngineError> {
    job.progress.current_step = step.to_string();
    store.update_job(job)?;

    Ok(())
}

/// Bounded retry for streaming reads. Writes are never retried.
fn read_with_retries<T>(mut op: impl FnMut() -> Result<T, StoreError>) -> Result<T, EngineError> {
    let mut attempts = 0;

    loop {
        attempts += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(source) if attempts < constants::TRANSIENT_READ_ATTEMPTS => {
                warn!(attempts, error = %source, "storage read failed, retrying");
            }
            Err(source) => return Err(EngineError::Transient { attempts, source })
        }
    }
}
