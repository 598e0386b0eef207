//! Read-only task queries, shared by the REST layer and the
//! reconciliation sweep (spec §4.4, "Task").

use std::sync::Arc;

use crate::command::TaskData;
use crate::store::{MetadataStore, Result};

pub struct TaskService {
    store: Arc<dyn MetadataStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn MetadataStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub async fn get(&self, id: &str) -> Result<TaskData> {
        self.store.get_task(id).await
    }

    pub async fn list(&self, page: u32, page_size: u32) -> Result<(Vec<TaskData>, u64)> {
        self.store.list_tasks(page, page_size).await
    }
}
