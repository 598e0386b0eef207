//! Shapes pushed down the front-end WebSocket channel (spec §6,
//! "Front-end WebSocket channel").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FrontendNotification {
    VmStatusUpdate { vm_id: String, status: String },
    NodeStatusUpdate { node_id: String, status: String },
    TaskStatusUpdate { task_id: String, status: String, progress: u8 },
    SystemNotification { message: String, level: String },
    Pong,
}

impl From<&crate::store::Event> for Option<FrontendNotification> {
    fn from(ev: &crate::store::Event) -> Self {
        use crate::store::Event;
        Some(match ev {
            Event::VmStatusChanged { id, new, .. } => {
                FrontendNotification::VmStatusUpdate { vm_id: id.clone(), status: format!("{new:?}").to_lowercase() }
            }
            Event::NodeStatusChanged { id, status } => {
                FrontendNotification::NodeStatusUpdate { node_id: id.clone(), status: format!("{status:?}").to_lowercase() }
            }
            Event::TaskUpdated(task) | Event::TaskCreated(task) => FrontendNotification::TaskStatusUpdate {
                task_id: task.id.clone(),
                status: format!("{:?}", task.status).to_lowercase(),
                progress: task.progress,
            },
            _ => return None,
        })
    }
}
