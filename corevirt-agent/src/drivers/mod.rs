//! Pluggable local-system drivers (spec §4.5; spec §1 excludes concrete
//! shell/libvirt/LVM/NFS invocations). One trait per driver family: a
//! thin struct, a `tracing::debug!` per call, realistic async timing and
//! return values, a `// TODO:` where the real system would shell out.

pub mod hypervisor;
pub mod network;
pub mod storage;

pub use hypervisor::{HypervisorDriver, StubHypervisorDriver};
pub use network::{NetworkDriver, StubNetworkDriver};
pub use storage::{StorageDriver, StubStorageDriver};
