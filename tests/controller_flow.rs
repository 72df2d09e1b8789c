use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration
};

use chrono::Utc;
use rsl_processor::{
    controller::CalculationJobController,
    database::{
        db_structs::{CalculationJob, Game, LeagueSeed, RankingSnapshot, RankingsTable, RatingParameters},
        store::{LeagueStore, MemoryStore}
    },
    error::{EngineError, StoreError},
    model::structures::job_status::JobStatus,
    utils::test_utils::{generate_game, generate_league_seed, ts, FlakyStore}
};
use uuid::Uuid;

/// Delays ledger reads so tests can observe the job mid-flight.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration
}

impl SlowStore {
    fn new(inner: MemoryStore, delay: Duration) -> SlowStore {
        SlowStore { inner, delay }
    }
}

impl LeagueStore for SlowStore {
    fn completed_games(&self, season_id: Option<i32>) -> Result<Vec<Game>, StoreError> {
        std::thread::sleep(self.delay);
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

fn league_seed() -> LeagueSeed {
    generate_league_seed(2, 3, &[(1, 100), (2, 200), (3, 300), (4, 400)])
}

fn seeded_memory_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(league_seed());
    store
}

#[tokio::test]
async fn trigger_runs_to_completion_and_publishes() {
    let store = Arc::new(seeded_memory_store());
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    let accepted = controller.trigger_full_rebuild("admin").await.unwrap();
    let job = controller.await_terminal(accepted.calculation_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.percent, 100.0);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(job.progress.rounds_processed, job.progress.rounds_total);
    assert_eq!(job.checkpoint.unwrap().season_id, 2);
    assert_eq!(job.triggered_by, "admin");

    let rankings = controller.current_rankings(None, true).unwrap();
    assert_eq!(rankings.len(), 4);
    assert_eq!(rankings[0].global_rank, 1);

    let published = store.current_rankings().unwrap().unwrap();
    assert_eq!(published.job_id, accepted.calculation_id);
}

#[tokio::test]
async fn second_trigger_while_running_is_rejected() {
    let store = Arc::new(SlowStore::new(seeded_memory_store(), Duration::from_millis(300)));
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    let accepted = controller.trigger_full_rebuild("admin").await.unwrap();

    let rejection = controller.trigger_full_rebuild("admin").await;
    match rejection {
        Err(EngineError::Concurrency(running)) => assert_eq!(running, accepted.calculation_id),
        other => panic!("expected concurrency rejection, got {:?}", other.map(|r| r.calculation_id))
    }

    // The rejection must not create a job or disturb the running one
    assert_eq!(store.jobs().unwrap().len(), 1);
    let job = controller.await_terminal(accepted.calculation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // Once the first job finished, a new trigger is accepted again
    let next = controller.trigger_full_rebuild("admin").await.unwrap();
    let job = controller.await_terminal(next.calculation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn transient_reads_recover_within_the_retry_budget() {
    let store = Arc::new(FlakyStore::new(seeded_memory_store(), 2));
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    let accepted = controller.trigger_full_rebuild("admin").await.unwrap();
    let job = controller.await_terminal(accepted.calculation_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn persistent_transient_failure_fails_the_job() {
    let store = Arc::new(FlakyStore::new(seeded_memory_store(), 10));
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    let accepted = controller.trigger_full_rebuild("admin").await.unwrap();
    let job = controller.await_terminal(accepted.calculation_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("Expected a recorded error");
    assert!(error.message.contains("storage read failed"));
    assert!(store.current_rankings().unwrap().is_none());
}

#[tokio::test]
async fn reference_error_fails_the_job_and_keeps_the_previous_table() {
    let store = Arc::new(seeded_memory_store());
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    let first = controller.trigger_full_rebuild("admin").await.unwrap();
    let job = controller.await_terminal(first.calculation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // A new game arrives referencing a team nobody registered
    store.add_game(generate_game(999, 2, 4, Some(ts("2024-08-10T10:00:00-05:00")), 1, 77, 21, 5));

    let second = controller.trigger_full_rebuild("admin").await.unwrap();
    let failed = controller.await_terminal(second.calculation_id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    let error = failed.error.expect("Expected a recorded error");
    assert!(error.message.contains("unresolvable reference"));
    assert!(!error.trace.is_empty());

    // The previous complete table stays authoritative
    let published = store.current_rankings().unwrap().unwrap();
    assert_eq!(published.job_id, first.calculation_id);
}

#[tokio::test]
async fn cancellation_is_honored_at_a_round_boundary() {
    let store = Arc::new(SlowStore::new(seeded_memory_store(), Duration::from_millis(300)));
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    let accepted = controller.trigger_full_rebuild("admin").await.unwrap();
    assert!(controller.cancel(accepted.calculation_id));

    let job = controller.await_terminal(accepted.calculation_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().message.contains("cancelled"));
    assert!(store.current_rankings().unwrap().is_none());

    // Nothing left to cancel once the job is terminal
    assert!(!controller.cancel(accepted.calculation_id));
    assert!(!controller.cancel(Uuid::new_v4()));
}

#[tokio::test]
async fn stale_running_job_is_failed_on_recovery() {
    let store = Arc::new(MemoryStore::new());

    // A job left behind by a crashed process
    let mut stale = CalculationJob::full_rebuild("admin", RatingParameters::default());
    stale.status = JobStatus::Running;
    stale.started_at = Some(Utc::now());
    store.insert_job(stale.clone()).unwrap();

    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());
    let recovered = controller.recover_stale_jobs().unwrap();

    assert_eq!(recovered, 1);
    let job = controller.calculation_status(stale.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().message.contains("restarted"));

    // Recovery is idempotent
    assert_eq!(controller.recover_stale_jobs().unwrap(), 0);
}

#[tokio::test]
async fn read_surface_filters_and_orders() {
    let store = Arc::new(seeded_memory_store());
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    // Nothing published yet
    assert!(controller.current_rankings(None, true).unwrap().is_empty());

    let accepted = controller.trigger_full_rebuild("admin").await.unwrap();
    controller.await_terminal(accepted.calculation_id).await.unwrap();

    let top_two = controller.current_rankings(Some(2), true).unwrap();
    assert_eq!(top_two.len(), 2);
    assert!(top_two[0].rating >= top_two[1].rating);

    let season_one = controller.ranking_history(1).unwrap();
    assert_eq!(season_one.len(), 3);
    assert!(season_one.iter().all(|s| s.season_id == 1));

    let recent = controller.recent_history(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!((recent[0].season_id, recent[0].week), (2, 2));
    assert_eq!((recent[1].season_id, recent[1].week), (2, 3));

    let calculations = controller.recent_calculations(10).unwrap();
    assert_eq!(calculations.len(), 1);
    assert_eq!(calculations[0].status, JobStatus::Completed);
}

#[tokio::test]
async fn progress_percent_is_monotonic_while_polling() {
    let store = Arc::new(SlowStore::new(seeded_memory_store(), Duration::from_millis(100)));
    let controller = CalculationJobController::new(Arc::clone(&store), RatingParameters::default());

    let accepted = controller.trigger_full_rebuild("admin").await.unwrap();

    let mut last_percent = 0.0;
    loop {
        let Some(job) = controller.calculation_status(accepted.calculation_id).unwrap() else {
            continue;
        };

        assert!(job.progress.percent >= last_percent, "progress went backwards");
        last_percent = job.progress.percent;

        if job.status.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            break;
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
