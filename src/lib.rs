pub mod counters;
pub mod dispatch;
pub mod error;
pub mod heuristic;
pub mod pool;
pub mod results;
pub mod rng;
pub mod trajectory;

// Re-export commonly used types for convenience
pub use counters::PerformanceCounters;
pub use dispatch::{GridDispatcher, LogLevel, OptimizeOptions};
pub use error::{OptionExt, Result, SearchError};
pub use heuristic::{Heuristic, HeuristicParameters, RunParameters, SearchStrategy};
pub use pool::{EliteSolution, SolutionPool};
pub use results::{GridPosition, HeuristicDistribution, HeuristicResults};
pub use trajectory::{HarvestPeriod, StandTrajectory, TabularTrajectory, NO_HARVEST};
