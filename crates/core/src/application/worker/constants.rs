// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when no items are due (1s)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Sleep duration after a storage error before retry (5s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(5);

/// Items leased per dequeue
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Processing items older than this are reported as stuck (30 minutes)
pub const DEFAULT_STUCK_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// How often the stuck-lease monitor looks (5 minutes)
pub const DEFAULT_STUCK_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
