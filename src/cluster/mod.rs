pub mod executor;

pub use executor::{ClusterExecutor, ExecutionFault, ExecutionResult};

/// Exit code reported when the command exceeded its wall-clock limit
pub const TIMEOUT_EXIT_CODE: i32 = -2;

/// Exit code reported when the process could not be started
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -3;

/// Exit code reported when the process ended without one (killed by a signal)
pub const SIGNAL_EXIT_CODE: i32 = -1;
