//! Worker engine: the pool of workers and the work they perform.

pub mod pool;
pub mod work;

pub use pool::{PoolConfig, WorkerPool};
pub use work::{SimulatedWork, WorkError, WorkUnit};
