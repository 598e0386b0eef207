//! Stable RPC method names (spec §6, Agent RPC surface).

pub const NODE_REGISTER: &str = "node.register";
pub const HEARTBEAT: &str = "heartbeat";
pub const RPC_CANCEL: &str = "rpc.cancel";

pub const VM_DEFINE_AND_START: &str = "vm.define_and_start";
pub const VM_STOP: &str = "vm.stop";
pub const VM_RESTART: &str = "vm.restart";
pub const VM_ATTACH_DISK: &str = "vm.attach_disk";
pub const VM_DETACH_DISK: &str = "vm.detach_disk";
pub const VM_DESCRIBE: &str = "vm.describe";
pub const VM_MIGRATE: &str = "vm.migrate";

pub const VOLUME_CREATE: &str = "volume.create";
pub const VOLUME_DELETE: &str = "volume.delete";
pub const VOLUME_RESIZE: &str = "volume.resize";
pub const VOLUME_CLONE: &str = "volume.clone";
pub const VOLUME_DESCRIBE: &str = "volume.describe";

pub const SNAPSHOT_CREATE: &str = "snapshot.create";
pub const SNAPSHOT_DELETE: &str = "snapshot.delete";
pub const SNAPSHOT_RESTORE: &str = "snapshot.restore";

pub const NETWORK_ENSURE: &str = "network.ensure";
pub const NETWORK_ATTACH_TAP: &str = "network.attach_tap";
pub const NETWORK_DETACH_TAP: &str = "network.detach_tap";

/// Default per-request deadline (spec §4.1). Long operations may
/// override this up to [`LONG_OP_TIMEOUT_SECS`].
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Maximum overridable deadline for long-running methods.
pub const LONG_OP_TIMEOUT_SECS: u64 = 300;
/// Agent heartbeat cadence.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
/// Controller marks a node offline once its last heartbeat is older than this.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 90;
/// Fixed agent reconnect backoff on any connection close.
pub const RECONNECT_BACKOFF_SECS: u64 = 5;

/// Methods whose terminal signal is a `stream` frame with
/// `completed: true` rather than a trailing `response` (Design Notes §9:
/// "pick one convention per method"). All other methods reply with a
/// plain `response`, optionally preceded by non-terminal `stream`
/// progress frames.
pub fn uses_terminal_stream(method: &str) -> bool {
    matches!(
        method,
        VM_DEFINE_AND_START | VOLUME_CREATE | VOLUME_CLONE | SNAPSHOT_CREATE | SNAPSHOT_RESTORE
    )
}
