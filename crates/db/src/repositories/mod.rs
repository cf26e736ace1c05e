use async_trait::async_trait;
use thiserror::Error;

use handoff_core::domain::task::{Task, TaskId};

pub mod memory;
pub mod task;

pub use memory::InMemoryTaskRepository;
pub use task::SqlTaskRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Keyed access to task records. The store offers get/set by key only;
/// callers never assume multi-row transactions or locks exist underneath.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError>;

    /// Looks a task up by its conversation/thread reference.
    async fn find_by_thread(&self, thread_ref: &str) -> Result<Option<Task>, RepositoryError>;

    /// Tasks not yet closed or cancelled, for sweep-style discovery.
    async fn list_open(&self) -> Result<Vec<Task>, RepositoryError>;

    /// Persists the whole record as one logical write.
    async fn save(&self, task: Task) -> Result<(), RepositoryError>;
}
