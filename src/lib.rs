#![doc = include_str!("../README.md")]

mod error;
mod pool;
mod queue;
mod worker;

pub use crate::{
    error::NilTaskError,
    pool::{Builder, StatefulBuilder, StatefulWorkQueue, WorkQueue},
};

/// Get a builder for creating a customized pool.
///
/// This is the entry point for both pool flavors. The task and state types
/// are inferred from the callbacks handed to the builder's `build` methods,
/// so no type annotations are needed here.
///
/// # Examples
///
/// ```
/// let pool = workqueue::builder().workers(2).build(|task: u32| {
///     let _ = task;
/// });
/// # pool.shutdown();
/// ```
pub fn builder() -> Builder {
    Builder::default()
}
