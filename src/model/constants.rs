// Model constants. Ratings live on a scaled OpenSkill grid so published
// numbers land in the range league members are used to (new players
// start at 1200).
pub const MULTIPLIER: f64 = 48.0;
pub const DEFAULT_RATING: f64 = 25.0 * MULTIPLIER;
pub const DEFAULT_VOLATILITY: f64 = (25.0 / 3.0) * MULTIPLIER;
pub const BETA: f64 = DEFAULT_VOLATILITY / 2.0;
pub const KAPPA: f64 = 0.0001;
// Ratings never drop below this, regardless of margin weighting.
pub const ABSOLUTE_RATING_FLOOR: f64 = 100.0;

// Season decay
pub const SEASON_DECAY_FACTOR: f64 = 0.85;
pub const VOLATILITY_GROWTH_RATE: f64 = 0.06 * (MULTIPLIER * MULTIPLIER);
pub const INACTIVE_SEASON_LIMIT: i32 = 2;

// Outcome weighting
pub const PLAYOFF_MULTIPLIER: f64 = 1.25;
pub const MARGIN_DIVISOR: f64 = 10.0;
pub const MARGIN_WEIGHT_CAP: f64 = 1.5;

// Storage reads are retried this many times before the job is failed.
pub const TRANSIENT_READ_ATTEMPTS: u32 = 3;
