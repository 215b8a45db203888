//! Task: a named pool of environment clients addressed by data index.

pub mod pool;

pub use pool::{ClientHandle, PoolSlot, Task};
