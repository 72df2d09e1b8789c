use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex
    },
    time::Duration
};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    database::{
        db_structs::{CalculationJob, JobError, PlayerRating, RankingSnapshot, RatingParameters, TriggerResponse},
        store::LeagueStore
    },
    error::EngineError,
    model::{run_full_replay, structures::job_status::JobStatus}
};

/// Owns calculation job lifecycle: single-flight enforcement, the
/// pending -> running -> terminal transitions, failure capture and the
/// poll-based read surface.
///
/// Only one job may be running at a time. The guard is held by job id;
/// a trigger arriving while it is occupied is rejected immediately with
/// `EngineError::Concurrency` rather than queued.
pub struct CalculationJobController<S: LeagueStore> {
    store: Arc<S>,
    parameters: RatingParameters,
    in_flight: Arc<Mutex<Option<Uuid>>>,
    cancel_flags: Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>
}

/// Clears the single-flight guard when the worker exits, panics included.
struct FlightGuard {
    in_flight: Arc<Mutex<Option<Uuid>>>,
    cancel_flags: Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>,
    id: Uuid
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *self.in_flight.lock().unwrap() = None;
        self.cancel_flags.lock().unwrap().remove(&self.id);
    }
}

impl<S: LeagueStore> CalculationJobController<S> {
    pub fn new(store: Arc<S>, parameters: RatingParameters) -> CalculationJobController<S> {
        CalculationJobController {
            store,
            parameters,
            in_flight: Arc::new(Mutex::new(None)),
            cancel_flags: Arc::new(Mutex::new(HashMap::new()))
        }
    }

    /// Jobs still marked running in storage belong to a previous
    /// process. They are failed rather than resumed: a full rebuild is
    /// cheap, resuming mid-round is not provably correct.
    pub fn recover_stale_jobs(&self) -> Result<usize, EngineError> {
        let mut recovered = 0;

        for mut job in self.store.jobs()? {
            if job.status.is_terminal() {
                continue;
            }

            warn!(job_id = %job.id, status = %job.status, "failing stale non-terminal job");
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error = Some(JobError {
                message: "job was still running when the process restarted".to_string(),
                trace: String::new(),
                timestamp: Utc::now()
            });
            self.store.update_job(&job)?;
            recovered += 1;
        }

        Ok(recovered)
    }

    /// Accepts a full rebuild and returns immediately; the replay runs
    /// on a blocking worker and the caller polls for the outcome.
    pub async fn trigger_full_rebuild(&self, triggered_by: &str) -> Result<TriggerResponse, EngineError> {
        let job = {
            let mut guard = self.in_flight.lock().unwrap();
            if let Some(running) = *guard {
                return Err(EngineError::Concurrency(running));
            }

            let job = CalculationJob::full_rebuild(triggered_by, self.parameters.clone());
            self.store.insert_job(job.clone())?;
            *guard = Some(job.id);
            job
        };

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags.lock().unwrap().insert(job.id, Arc::clone(&cancel));

        info!(job_id = %job.id, triggered_by, "full rebuild accepted");

        let store = Arc::clone(&self.store);
        let guard = FlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            cancel_flags: Arc::clone(&self.cancel_flags),
            id: job.id
        };
        let calculation_id = job.id;

        tokio::task::spawn_blocking(move || {
            let outcome = run_job(store.as_ref(), job, &cancel);

            // Release the single-flight guard before the terminal state
            // becomes visible, so a caller that polls a terminal status
            // is never rejected by a guard about to clear.
            drop(guard);

            if let Err(e) = store.update_job(&outcome) {
                error!(job_id = %outcome.id, error = %e, "failed to record job outcome");
            }
        });

        Ok(TriggerResponse {
            calculation_id,
            status: JobStatus::Pending,
            message: "full rebuild accepted".to_string()
        })
    }

    /// Requests cooperative cancellation, honored at the next round
    /// boundary. Returns false when the job is not running.
    pub fn cancel(&self, calculation_id: Uuid) -> bool {
        match self.cancel_flags.lock().unwrap().get(&calculation_id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false
        }
    }

    pub fn calculation_status(&self, calculation_id: Uuid) -> Result<Option<CalculationJob>, EngineError> {
        Ok(self.store.job(calculation_id)?)
    }

    /// Most recent jobs first, for operations visibility.
    pub fn recent_calculations(&self, limit: usize) -> Result<Vec<CalculationJob>, EngineError> {
        let mut jobs = self.store.jobs()?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);

        Ok(jobs)
    }

    /// The published table, already ordered. Readers never observe a
    /// partially rebuilt table; until the first publish this is empty.
    pub fn current_rankings(&self, top_n: Option<usize>, active_only: bool) -> Result<Vec<PlayerRating>, EngineError> {
        let Some(table) = self.store.current_rankings()? else {
            return Ok(Vec::new());
        };

        let mut ratings: Vec<PlayerRating> = table
            .ratings
            .iter()
            .filter(|r| !active_only || r.is_active)
            .cloned()
            .collect();

        if let Some(n) = top_n {
            ratings.truncate(n);
        }

        Ok(ratings)
    }

    pub fn ranking_history(&self, season_id: i32) -> Result<Vec<RankingSnapshot>, EngineError> {
        let snapshots = self.store.snapshots()?;

        Ok(snapshots.into_iter().filter(|s| s.season_id == season_id).collect())
    }

    /// The trailing `weeks` snapshots across seasons, oldest first.
    pub fn recent_history(&self, weeks: usize) -> Result<Vec<RankingSnapshot>, EngineError> {
        let snapshots = self.store.snapshots()?;
        let skip = snapshots.len().saturating_sub(weeks);

        Ok(snapshots.into_iter().skip(skip).collect())
    }

    /// Polls until the job reaches a terminal state. Convenience for
    /// the CLI and tests; the CRUD layer polls on its own schedule.
    pub async fn await_terminal(&self, calculation_id: Uuid) -> Result<CalculationJob, EngineError> {
        loop {
            if let Some(job) = self.calculation_status(calculation_id)? {
                if job.status.is_terminal() {
                    return Ok(job);
                }
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// The worker body: runs the transitions around the replay and returns
/// the job in its terminal state for the caller to persist. Every
/// failure lands on the job record; there is no silent path out of here.
fn run_job<S: LeagueStore>(store: &S, mut job: CalculationJob, cancel: &AtomicBool) -> CalculationJob {
    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    if let Err(e) = store.update_job(&job) {
        error!(job_id = %job.id, error = %e, "failed to mark job running");
    }

    match run_full_replay(store, &mut job, cancel) {
        Ok(summary) => {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.progress.percent = 100.0;
            job.progress.current_step = "completed".to_string();
            info!(job_id = %job.id, players = summary.players_rated, "calculation completed");
        }
        Err(err) => {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error = Some(JobError {
                message: err.to_string(),
                trace: format!("{err:?}"),
                timestamp: Utc::now()
            });
            error!(job_id = %job.id, error = %err, "calculation failed");
        }
    }

    job
}
