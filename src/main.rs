use std::sync::Arc;

use clap::Parser;
use rsl_processor::{
    args::Args,
    controller::CalculationJobController,
    database::{
        db_structs::{LeagueSeed, RatingParameters},
        store::MemoryStore
    },
    model::structures::job_status::JobStatus
};
use tracing::{error, info};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let raw = std::fs::read_to_string(&args.data).expect("Expected a readable league data file");
    let seed: LeagueSeed = serde_json::from_str(&raw).expect("Expected a valid league export");

    let store = Arc::new(MemoryStore::new());
    store.seed(seed);

    let controller = CalculationJobController::new(store, RatingParameters::default());
    controller
        .recover_stale_jobs()
        .expect("Expected stale job recovery to succeed");

    let accepted = controller
        .trigger_full_rebuild("cli")
        .await
        .expect("Expected the rebuild trigger to be accepted");
    info!(calculation_id = %accepted.calculation_id, "rebuild triggered");

    let job = controller
        .await_terminal(accepted.calculation_id)
        .await
        .expect("Expected job polling to succeed");

    if job.status != JobStatus::Completed {
        match job.error {
            Some(e) => error!(message = %e.message, trace = %e.trace, "rebuild failed"),
            None => error!("rebuild failed without a recorded error")
        }
        std::process::exit(1);
    }

    let rankings = controller
        .current_rankings(Some(args.top), true)
        .expect("Expected published rankings to be readable");

    info!(
        rounds = job.progress.rounds_processed,
        games = job.progress.games_processed,
        "rebuild completed"
    );

    println!("{:>4}  {:>8}  {:>10}  {:>5}  {:>7}  player", "rank", "rating", "volatility", "games", "seasons");
    for rating in rankings {
        println!(
            "{:>4}  {:>8.1}  {:>10.1}  {:>5}  {:>7}  {}",
            rating.global_rank,
            rating.rating,
            rating.volatility,
            rating.games_played,
            rating.seasons_played,
            rating.player_id
        );
    }
}

fn init_tracing(level: &str) {
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}
