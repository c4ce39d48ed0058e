pub mod comm;
mod coordinator;
mod distributed;
mod error;
mod lock_table;
mod planner;
mod pool;
mod state;

pub use comm::{Communicator, Frame, LocalCluster, LocalCommunicator, ROOT, broadcast_pipeline};
pub use coordinator::{ExecutionModel, WorkerCoordinator};
pub use distributed::{DistributedRun, RankExecution, run_rank};
pub use error::{WorkerError, WorkerResult};
pub use lock_table::{ItemGuard, ItemLockTable, LockGranularity};
pub use planner::PartitionPlanner;
pub use pool::{ChunkCursor, PooledExecution, WorkerPool};
pub use state::WorkerState;
