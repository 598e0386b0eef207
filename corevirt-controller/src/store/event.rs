//! Events emitted by committed state transitions.
//!
//! Dispatched via a `tokio::sync::broadcast` channel to the front-end
//! WebSocket handler (spec §6, "front-end WebSocket channel") and to
//! the reconciliation sweep.

use crate::command::{NodeData, TaskData, VmData, VolumeData};

#[derive(Debug, Clone)]
pub enum Event {
    NodeRegistered(NodeData),
    NodeStatusChanged { id: String, status: crate::command::NodeStatus },
    NodeDeregistered { id: String },

    NetworkCreated { id: String },
    NetworkDeleted { id: String },

    VmCreated(VmData),
    VmStatusChanged { id: String, old: crate::command::VmStatus, new: crate::command::VmStatus },
    VmDeleted { id: String },

    VolumeCreated(VolumeData),
    VolumeStatusChanged { id: String, new: crate::command::VolumeStatus },
    VolumeDeleted { id: String },

    SnapshotCreated { id: String },
    SnapshotDeleted { id: String },

    TaskCreated(TaskData),
    TaskUpdated(TaskData),
}

impl Event {
    pub fn resource_type(&self) -> &'static str {
        match self {
            Event::NodeRegistered(_) | Event::NodeStatusChanged { .. } | Event::NodeDeregistered { .. } => "node",
            Event::NetworkCreated { .. } | Event::NetworkDeleted { .. } => "network",
            Event::VmCreated(_) | Event::VmStatusChanged { .. } | Event::VmDeleted { .. } => "vm",
            Event::VolumeCreated(_) | Event::VolumeStatusChanged { .. } | Event::VolumeDeleted { .. } => "volume",
            Event::SnapshotCreated { .. } | Event::SnapshotDeleted { .. } => "snapshot",
            Event::TaskCreated(_) | Event::TaskUpdated(_) => "task",
        }
    }
}
