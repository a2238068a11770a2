//! Task lifecycle surface: submit, observe, collect, cancel.

pub mod task;

pub use task::{TaskError, TaskResultView, TaskService, TaskStatusView};
