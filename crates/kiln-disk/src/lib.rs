//! Disk layout for bootable images.
//!
//! A distribution supplies a base `PartitionTable` per architecture; this
//! crate turns it into the concrete table of one image: custom mountpoints
//! checked against `MountpointPolicies`, root optionally moved onto LVM,
//! offsets aligned, and UUIDs drawn from a caller-seeded RNG.

pub mod layout;
pub mod mountpoint;
pub mod partition;

pub use layout::{lv_name, new_partition_table, random_uuid};
pub use mountpoint::{check_mountpoints, MountpointPolicies, PathPolicy};
pub use partition::{
    Filesystem, LogicalVolume, Partition, PartitionTable, PartitionTableType, Payload,
    VolumeGroup,
};

use thiserror::Error;

pub const KIBIBYTE: u64 = 1024;
pub const MEBIBYTE: u64 = 1024 * KIBIBYTE;
pub const GIBIBYTE: u64 = 1024 * MEBIBYTE;

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("the following custom mountpoints are not allowed: {}", .0.join(", "))]
    InvalidMountpoints(Vec<String>),
    #[error("partition table has no root filesystem")]
    NoRootPartition,
    #[error("size {0} exceeds the largest supported image size")]
    SizeTooLarge(u64),
}

/// Round `value` up to the next multiple of `align`.
///
/// Fails when the rounded value does not fit in a `u64`.
pub fn align_up(value: u64, align: u64) -> Result<u64, DiskError> {
    value
        .div_ceil(align)
        .checked_mul(align)
        .ok_or(DiskError::SizeTooLarge(value))
}
