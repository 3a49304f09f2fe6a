//! Workflow execution utilities for parallel and concurrent processing.
//!
//! # Key Components
//!
//! ## Thread Pools
//!
//! - [`thread_pool::ThreadPool`] - A shared pool of worker threads for fire-and-forget
//!   task execution, with a lazily initialized global instance
//!
//! ## Task Groups
//!
//! - [`task_group::TaskGroup`] - A unit-of-work scheduler with a single join point that
//!   reports the first failure of any submitted task. Two interchangeable flavors exist:
//!   [`task_group::SerialTaskGroup`] runs every task inline on the caller's thread, and
//!   [`task_group::ThreadedTaskGroup`] dispatches tasks to a [`thread_pool::ThreadPool`].
//!
//! Code that submits work is written against the [`task_group::TaskGroup`] trait only,
//! so the same logic runs unmodified in both modes.

pub mod task_group;
pub mod thread_pool;
