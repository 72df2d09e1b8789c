use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock}
};

use tracing::info;
use uuid::Uuid;

use crate::{
    database::db_structs::{CalculationJob, Game, LeagueSeed, RankingSnapshot, RankingsTable, Team},
    error::StoreError,
    model::structures::game_status::GameStatus
};

/// Narrow interface to the league document store. The CRUD layer owns
/// the documents; the engine reads the game ledger and rosters through
/// this trait and writes ratings, snapshots and job records back.
///
/// The rankings table is published as a whole: readers either see the
/// previous complete table or the new one, never a partial write.
pub trait LeagueStore: Send + Sync + 'static {
    /// All completed games, optionally scoped to one season. Ordering
    /// is the ledger reader's responsibility, not the store's.
    fn completed_games(&self, season_id: Option<i32>) -> Result<Vec<Game>, StoreError>;

    /// Team id -> player id for every registration.
    fn team_players(&self) -> Result<HashMap<i32, i32>, StoreError>;

    /// Atomically swaps in a new current-rankings table.
    fn publish_rankings(&self, table: RankingsTable) -> Result<(), StoreError>;

    fn current_rankings(&self) -> Result<Option<Arc<RankingsTable>>, StoreError>;

    /// Appends one immutable weekly snapshot. There is deliberately no
    /// update or delete counterpart.
    fn append_snapshot(&self, snapshot: RankingSnapshot) -> Result<(), StoreError>;

    fn snapshots(&self) -> Result<Vec<RankingSnapshot>, StoreError>;

    fn insert_job(&self, job: CalculationJob) -> Result<(), StoreError>;

    /// Replaces the stored job record matching `job.id`.
    fn update_job(&self, job: &CalculationJob) -> Result<(), StoreError>;

    fn job(&self, id: Uuid) -> Result<Option<CalculationJob>, StoreError>;

    fn jobs(&self) -> Result<Vec<CalculationJob>, StoreError>;

    /// Records that a round has been folded into the given rebuild.
    fn mark_round_calculated(&self, job_id: Uuid, round_id: i32) -> Result<(), StoreError>;

    fn round_calculated(&self, job_id: Uuid, round_id: i32) -> Result<bool, StoreError>;
}

/// In-process implementation backing tests and the CLI. Interior
/// mutability mirrors the sharing model of the real store: one writer
/// (the running job), any number of concurrent readers.
#[derive(Default)]
pub struct MemoryStore {
    games: RwLock<Vec<Game>>,
    teams: RwLock<Vec<Team>>,
    rankings: RwLock<Option<Arc<RankingsTable>>>,
    snapshots: RwLock<Vec<RankingSnapshot>>,
    jobs: RwLock<Vec<CalculationJob>>,
    calculated_rounds: RwLock<HashSet<(Uuid, i32)>>
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn add_team(&self, team: Team) {
        self.teams.write().unwrap().push(team);
    }

    pub fn add_game(&self, game: Game) {
        self.games.write().unwrap().push(game);
    }

    /// Loads a league export, replacing any previously seeded data.
    pub fn seed(&self, seed: LeagueSeed) {
        info!(
            teams = seed.teams.len(),
            games = seed.games.len(),
            "seeding in-memory store"
        );
        *self.teams.write().unwrap() = seed.teams;
        *self.games.write().unwrap() = seed.games;
    }
}

impl LeagueStore for MemoryStore {
    fn completed_games(&self, season_id: Option<i32>) -> Result<Vec<Game>, StoreError> {
        let games = self.games.read().unwrap();
        Ok(games
            .iter()
            .filter(|g| g.status == GameStatus::Completed)
            .filter(|g| season_id.is_none_or(|s| g.season_id == s))
            .cloned()
            .collect())
    }

    fn team_players(&self) -> Result<HashMap<i32, i32>, StoreError> {
        let teams = self.teams.read().unwrap();
        Ok(teams.iter().map(|t| (t.id, t.player_id)).collect())
    }

    fn publish_rankings(&self, table: RankingsTable) -> Result<(), StoreError> {
        *self.rankings.write().unwrap() = Some(Arc::new(table));
        Ok(())
    }

    fn current_rankings(&self) -> Result<Option<Arc<RankingsTable>>, StoreError> {
        Ok(self.rankings.read().unwrap().clone())
    }

    fn append_snapshot(&self, snapshot: RankingSnapshot) -> Result<(), StoreError> {
        self.snapshots.write().unwrap().push(snapshot);
        Ok(())
    }

    fn snapshots(&self) -> Result<Vec<RankingSnapshot>, StoreError> {
        Ok(self.snapshots.read().unwrap().clone())
    }

    fn insert_job(&self, job: CalculationJob) -> Result<(), StoreError> {
        self.jobs.write().unwrap().push(job);
        Ok(())
    }

    fn update_job(&self, job: &CalculationJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound("calculation job"))
        }
    }

    fn job(&self, id: Uuid) -> Result<Option<CalculationJob>, StoreError> {
        Ok(self.jobs.read().unwrap().iter().find(|j| j.id == id).cloned())
    }

    fn jobs(&self) -> Result<Vec<CalculationJob>, StoreError> {
        Ok(self.jobs.read().unwrap().clone())
    }

    fn mark_round_calculated(&self, job_id: Uuid, round_id: i32) -> Result<(), StoreError> {
        self.calculated_rounds.write().unwrap().insert((job_id, round_id));
        Ok(())
    }

    fn round_calculated(&self, job_id: Uuid, round_id: i32) -> Result<bool, StoreError> {
        Ok(self.calculated_rounds.read().unwrap().contains(&(job_id, round_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{generate_game, generate_team, ts};
    use chrono::Utc;

    #[test]
    fn test_completed_games_filters_status_and_season() {
        let store = MemoryStore::new();
        store.add_game(generate_game(1, 1, 1, Some(ts("2024-01-06T10:00:00-05:00")), 1, 2, 21, 15));

        let mut scheduled = generate_game(2, 1, 2, Some(ts("2024-01-13T10:00:00-05:00")), 1, 2, 0, 0);
        scheduled.status = GameStatus::Scheduled;
        store.add_game(scheduled);

        store.add_game(generate_game(3, 2, 1, Some(ts("2024-04-06T10:00:00-05:00")), 3, 4, 10, 12));

        assert_eq!(store.completed_games(None).unwrap().len(), 2);
        assert_eq!(store.completed_games(Some(1)).unwrap().len(), 1);
        assert_eq!(store.completed_games(Some(2)).unwrap().len(), 1);
    }

    #[test]
    fn test_publish_swaps_whole_table() {
        let store = MemoryStore::new();
        assert!(store.current_rankings().unwrap().is_none());

        let table = RankingsTable {
            job_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            ratings: Vec::new()
        };
        let job_id = table.job_id;
        store.publish_rankings(table).unwrap();

        let published = store.current_rankings().unwrap().unwrap();
        assert_eq!(published.job_id, job_id);
    }

    #[test]
    fn test_team_players_mapping() {
        let store = MemoryStore::new();
        store.add_team(generate_team(10, 1, 100));
        store.add_team(generate_team(11, 1, 101));

        let mapping = store.team_players().unwrap();
        assert_eq!(mapping.get(&10), Some(&100));
        assert_eq!(mapping.get(&11), Some(&101));
    }

    #[test]
    fn test_update_missing_job_is_not_found() {
        let store = MemoryStore::new();
        let job = CalculationJob::full_rebuild("test", Default::default());

        assert!(matches!(store.update_job(&job), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_round_ledger_markers() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();

        assert!(!store.round_calculated(job_id, 1).unwrap());
        store.mark_round_calculated(job_id, 1).unwrap();
        assert!(store.round_calculated(job_id, 1).unwrap());
        assert!(!store.round_calculated(Uuid::new_v4(), 1).unwrap());
    }
}
