use std::collections::HashMap;

use tokio::sync::RwLock;

use handoff_core::domain::task::{Task, TaskId};

use super::{RepositoryError, TaskRepository};

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

#[async_trait::async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id.0).cloned())
    }

    async fn find_by_thread(&self, thread_ref: &str) -> Result<Option<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().find(|task| task.thread_ref.as_deref() == Some(thread_ref)).cloned())
    }

    async fn list_open(&self) -> Result<Vec<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut open: Vec<Task> =
            tasks.values().filter(|task| !task.status.is_terminal()).cloned().collect();
        open.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(open)
    }

    async fn save(&self, task: Task) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.0.clone(), task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use handoff_core::domain::task::{Party, Task, TaskId, TaskParams, TaskStatus};

    use crate::repositories::{InMemoryTaskRepository, TaskRepository};

    fn sample_task(id: &str, thread_ref: Option<&str>) -> Task {
        Task::new(
            TaskId(id.to_string()),
            TaskParams {
                name: "Quarterly report".to_string(),
                due_date: None,
                scope: "Draft and final deck".to_string(),
            },
            Party { name: "Morgan".to_string(), address: "boss@example.com".to_string() },
            Party { name: "Riley".to_string(), address: "dev@example.com".to_string() },
            thread_ref.map(str::to_string),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn round_trips_a_task_by_id() {
        let repo = InMemoryTaskRepository::default();
        let task = sample_task("T-1", None);

        repo.save(task.clone()).await.expect("save task");
        let found = repo.find_by_id(&task.id).await.expect("find task");

        assert_eq!(found, Some(task));
    }

    #[tokio::test]
    async fn finds_task_by_thread_reference() {
        let repo = InMemoryTaskRepository::default();
        repo.save(sample_task("T-1", Some("thread-a"))).await.expect("save");
        repo.save(sample_task("T-2", Some("thread-b"))).await.expect("save");

        let found = repo.find_by_thread("thread-b").await.expect("lookup");
        assert_eq!(found.map(|task| task.id.0), Some("T-2".to_string()));

        let missing = repo.find_by_thread("thread-c").await.expect("lookup");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn list_open_excludes_terminal_tasks() {
        let repo = InMemoryTaskRepository::default();
        repo.save(sample_task("T-1", None)).await.expect("save");

        let mut closed = sample_task("T-2", None);
        closed.status = TaskStatus::Closed;
        repo.save(closed).await.expect("save");

        let mut cancelled = sample_task("T-3", None);
        cancelled.status = TaskStatus::Cancelled;
        repo.save(cancelled).await.expect("save");

        let open = repo.list_open().await.expect("list");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id.0, "T-1");
    }
}
