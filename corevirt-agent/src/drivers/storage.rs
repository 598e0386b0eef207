//! Storage driver: volume/snapshot lifecycle against a `PoolConfig`.

use std::time::Duration;

use async_trait::async_trait;
use corevirt_proto::entities::PoolConfig;
use tracing::debug;

#[async_trait]
pub trait StorageDriver: Send + Sync {
    async fn create_volume(&self, volume_id: &str, pool_config: &PoolConfig, size_gb: u64) -> anyhow::Result<String>;
    async fn delete_volume(&self, volume_id: &str) -> anyhow::Result<()>;
    async fn resize_volume(&self, volume_id: &str, new_size_gb: u64) -> anyhow::Result<()>;
    async fn clone_volume(&self, source_volume_id: &str, new_volume_id: &str) -> anyhow::Result<String>;
    async fn describe_volume(&self, volume_id: &str) -> anyhow::Result<(String, String)>;
    async fn create_snapshot(&self, volume_id: &str, snapshot_tag: &str) -> anyhow::Result<u64>;
    async fn delete_snapshot(&self, volume_id: &str, snapshot_tag: &str) -> anyhow::Result<()>;
    async fn restore_snapshot(&self, volume_id: &str, snapshot_tag: &str) -> anyhow::Result<()>;
}

pub struct StubStorageDriver;

fn pool_path(pool_config: &PoolConfig, leaf: &str) -> String {
    match pool_config {
        PoolConfig::Nfs { export, .. } => format!("{export}/{leaf}"),
        PoolConfig::Lvm { volume_group } => format!("/dev/{volume_group}/{leaf}"),
        PoolConfig::Ceph { pool_name, .. } => format!("rbd:{pool_name}/{leaf}"),
        PoolConfig::Iscsi { target_iqn, .. } => format!("iscsi:{target_iqn}/{leaf}"),
    }
}

#[async_trait]
impl StorageDriver for StubStorageDriver {
    async fn create_volume(&self, volume_id: &str, pool_config: &PoolConfig, size_gb: u64) -> anyhow::Result<String> {
        debug!(volume_id, size_gb, "creating volume");
        // TODO: `lvcreate`/NFS-truncate/`rbd create` depending on pool type.
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(pool_path(pool_config, volume_id))
    }

    async fn delete_volume(&self, volume_id: &str) -> anyhow::Result<()> {
        debug!(volume_id, "deleting volume");
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(())
    }

    async fn resize_volume(&self, volume_id: &str, new_size_gb: u64) -> anyhow::Result<()> {
        debug!(volume_id, new_size_gb, "resizing volume");
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn clone_volume(&self, source_volume_id: &str, new_volume_id: &str) -> anyhow::Result<String> {
        debug!(source_volume_id, new_volume_id, "cloning volume");
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(format!("/dev/zvol/corevirt/{new_volume_id}"))
    }

    async fn describe_volume(&self, volume_id: &str) -> anyhow::Result<(String, String)> {
        debug!(volume_id, "describing volume");
        Ok(("available".to_string(), format!("/dev/zvol/corevirt/{volume_id}")))
    }

    async fn create_snapshot(&self, volume_id: &str, snapshot_tag: &str) -> anyhow::Result<u64> {
        debug!(volume_id, snapshot_tag, "creating snapshot");
        tokio::time::sleep(Duration::from_millis(60)).await;
        Ok(0)
    }

    async fn delete_snapshot(&self, volume_id: &str, snapshot_tag: &str) -> anyhow::Result<()> {
        debug!(volume_id, snapshot_tag, "deleting snapshot");
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    async fn restore_snapshot(&self, volume_id: &str, snapshot_tag: &str) -> anyhow::Result<()> {
        debug!(volume_id, snapshot_tag, "restoring snapshot");
        tokio::time::sleep(Duration::from_millis(80)).await;
        Ok(())
    }
}
