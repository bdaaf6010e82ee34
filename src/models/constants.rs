/// Pointer travel (in pixels) before a press on a card becomes a drag.
/// Anything shorter is treated as a click on the card.
pub const DEFAULT_DRAG_ACTIVATION_DISTANCE: f64 = 5.0;

/// Default number of automatic retries for a failed persistence call.
/// Zero keeps the behavior of surfacing the first failure to the user.
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Base delay for the exponential retry backoff, in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_BASE_MS: u64 = 250;

/// Upper bound for a single retry backoff, in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MAX_MS: u64 = 4_000;

/// Capacity of the broadcast channels used for store and transition events.
/// Slow subscribers past this bound observe a `Lagged` error and should resync.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Only version 1 pipeline files are understood.
pub const PIPELINE_CONFIG_VERSION: u32 = 1;
