mod task_error;

pub use task_error::{TaskError, TaskErrorKind};
