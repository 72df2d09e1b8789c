use clap::Parser;

#[derive(Parser, Clone)]
#[command(
    display_name = "RSL Processor",
    author = "Recreational Sports League",
    long_about = "Rebuilds the cross-season player skill-rating leaderboard from the full game history"
)]
pub struct Args {
    /// League export produced by the admin workflow, shaped like
    /// {"teams": [...], "games": [...]}
    #[arg(short, long, env = "LEAGUE_DATA", help = "Path to the league data export (JSON)")]
    pub data: String,

    /// Number of leaderboard rows printed once the rebuild completes
    #[arg(short, long, default_value_t = 25, help = "Leaderboard rows to print")]
    pub top: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "RUST_LOG",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        help = "Sets the logging verbosity"
    )]
    pub log_level: String
}
