//! Derive a concrete partition table from a base layout and the requested
//! custom mountpoints.

use crate::partition::{
    Filesystem, LogicalVolume, Partition, PartitionTable, PartitionTableType, Payload, VolumeGroup,
};
use crate::{align_up, DiskError, GIBIBYTE, MEBIBYTE};
use kiln_schema::FilesystemCustomization;
use rand::Rng;
use tracing::debug;

/// Size of a `/boot` partition split off when converting root to LVM.
pub const DEFAULT_BOOT_SIZE: u64 = GIBIBYTE;
/// Size of a new mountpoint that does not request one.
pub const DEFAULT_MOUNTPOINT_SIZE: u64 = GIBIBYTE;
/// Reserved at the start of an LVM partition for the physical volume header.
pub const LVM_METADATA_SIZE: u64 = MEBIBYTE;
/// Reserved at the end of the disk for the backup GPT header.
pub const FOOTER_SIZE: u64 = MEBIBYTE;

pub const ROOT_VG_NAME: &str = "rootvg";

/// Build the partition table for one image.
///
/// Existing mountpoints grow to at least their requested size, new ones are
/// added as logical volumes (when the table uses or is converted to LVM) or
/// as plain partitions placed before root. The last partition grows to fill
/// `image_size`. UUIDs left empty by `base` are drawn from `rng`, so equal
/// seeds give byte-identical tables.
pub fn new_partition_table<R: Rng>(
    base: &PartitionTable,
    mountpoints: &[FilesystemCustomization],
    image_size: u64,
    lvmify: bool,
    rng: &mut R,
) -> Result<PartitionTable, DiskError> {
    let mut pt = base.clone();

    let has_new = mountpoints
        .iter()
        .any(|mp| !pt.contains_mountpoint(&mp.mountpoint));
    if lvmify && has_new && !pt.is_lvm() {
        ensure_lvm(&mut pt)?;
    }

    for mp in mountpoints {
        if pt.contains_mountpoint(&mp.mountpoint) {
            grow_mountpoint(&mut pt, &mp.mountpoint, mp.minsize)?;
        } else {
            add_mountpoint(&mut pt, mp)?;
        }
    }

    relayout(&mut pt, image_size)?;
    generate_uuids(&mut pt, rng);
    debug!(
        "partition table: {} partitions, {} bytes, lvm={}",
        pt.partitions.len(),
        pt.size,
        pt.is_lvm()
    );
    Ok(pt)
}

/// Move the root filesystem onto a logical volume, splitting off `/boot`
/// first when the base layout has none.
fn ensure_lvm(pt: &mut PartitionTable) -> Result<(), DiskError> {
    let root_idx = pt.root_partition_index().ok_or(DiskError::NoRootPartition)?;
    if !pt.contains_mountpoint("/boot") {
        let boot = Partition::filesystem(
            DEFAULT_BOOT_SIZE,
            pt.data_part_type(),
            Filesystem::new("xfs", "/boot", "boot"),
        );
        pt.partitions.insert(root_idx, boot);
    }
    let root_idx = pt.root_partition_index().ok_or(DiskError::NoRootPartition)?;
    let lvm_type = pt.lvm_part_type();

    let root = &mut pt.partitions[root_idx];
    let Some(Payload::Filesystem(fs)) = root.payload.take() else {
        return Err(DiskError::NoRootPartition);
    };
    root.part_type = lvm_type.to_owned();
    root.payload = Some(Payload::Lvm(VolumeGroup {
        name: ROOT_VG_NAME.to_owned(),
        description: "created by kiln".to_owned(),
        logical_volumes: vec![LogicalVolume {
            name: lv_name("/"),
            size: root.size.saturating_sub(LVM_METADATA_SIZE),
            filesystem: fs,
        }],
    }));
    debug!("converted root partition to LVM volume group {ROOT_VG_NAME}");
    Ok(())
}

fn grow_mountpoint(
    pt: &mut PartitionTable,
    mountpoint: &str,
    minsize: u64,
) -> Result<(), DiskError> {
    let minsize = align_up(minsize, MEBIBYTE)?;
    for part in &mut pt.partitions {
        match &mut part.payload {
            Some(Payload::Filesystem(fs)) if fs.mountpoint == mountpoint => {
                part.size = part.size.max(minsize);
                return Ok(());
            }
            Some(Payload::Lvm(vg)) => {
                if let Some(lv) = vg
                    .logical_volumes
                    .iter_mut()
                    .find(|lv| lv.filesystem.mountpoint == mountpoint)
                {
                    lv.size = lv.size.max(minsize);
                    return Ok(());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn add_mountpoint(pt: &mut PartitionTable, mp: &FilesystemCustomization) -> Result<(), DiskError> {
    let size = if mp.minsize == 0 {
        DEFAULT_MOUNTPOINT_SIZE
    } else {
        align_up(mp.minsize, MEBIBYTE)?
    };
    let fs = Filesystem::new("xfs", &mp.mountpoint, "");

    if let Some(vg) = pt.partitions.iter_mut().find_map(|p| match &mut p.payload {
        Some(Payload::Lvm(vg)) => Some(vg),
        _ => None,
    }) {
        let mut name = lv_name(&mp.mountpoint);
        let base = name.clone();
        let mut n = 0;
        while vg.logical_volumes.iter().any(|lv| lv.name == name) {
            n += 1;
            name = format!("{base}{n:02}");
        }
        vg.logical_volumes.push(LogicalVolume {
            name,
            size,
            filesystem: fs,
        });
        return Ok(());
    }

    let root_idx = pt.root_partition_index().ok_or(DiskError::NoRootPartition)?;
    let part = Partition::filesystem(size, pt.data_part_type(), fs);
    pt.partitions.insert(root_idx, part);
    Ok(())
}

/// Logical volume name for a mountpoint: `/` is `rootlv`, `/var/log` is
/// `var_loglv`.
pub fn lv_name(mountpoint: &str) -> String {
    let trimmed = mountpoint.trim_start_matches('/');
    if trimmed.is_empty() {
        "rootlv".to_owned()
    } else {
        format!("{}lv", trimmed.replace('/', "_"))
    }
}

/// Assign 1 MiB aligned offsets in order and grow the last partition (and
/// the root logical volume) into the remaining space.
fn relayout(pt: &mut PartitionTable, image_size: u64) -> Result<(), DiskError> {
    for part in &mut pt.partitions {
        part.size = align_up(part.size, MEBIBYTE)?;
        if let Some(Payload::Lvm(vg)) = &mut part.payload {
            let mut needed = LVM_METADATA_SIZE;
            for lv in &mut vg.logical_volumes {
                lv.size = align_up(lv.size, MEBIBYTE)?;
                needed = needed
                    .checked_add(lv.size)
                    .ok_or(DiskError::SizeTooLarge(lv.size))?;
            }
            part.size = part.size.max(needed);
        }
    }

    let last = pt.partitions.len().saturating_sub(1);
    let mut start = align_up(pt.start_offset, MEBIBYTE)?;
    for (i, part) in pt.partitions.iter_mut().enumerate() {
        part.start = start;
        if i == last {
            let available =
                image_size.saturating_sub(start.saturating_add(FOOTER_SIZE)) / MEBIBYTE * MEBIBYTE;
            part.size = part.size.max(available);
        }
        start = start
            .checked_add(part.size)
            .ok_or(DiskError::SizeTooLarge(part.size))?;
    }
    let end = start
        .checked_add(FOOTER_SIZE)
        .ok_or(DiskError::SizeTooLarge(start))?;
    pt.size = image_size.max(end);

    for part in &mut pt.partitions {
        if let Some(Payload::Lvm(vg)) = &mut part.payload {
            let used: u64 =
                vg.logical_volumes.iter().map(|lv| lv.size).sum::<u64>() + LVM_METADATA_SIZE;
            let free = part.size.saturating_sub(used);
            if let Some(root) = vg
                .logical_volumes
                .iter_mut()
                .find(|lv| lv.filesystem.mountpoint == "/")
            {
                root.size += free;
            }
        }
    }
    Ok(())
}

pub fn random_uuid<R: Rng>(rng: &mut R) -> String {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string()
}

fn generate_uuids<R: Rng>(pt: &mut PartitionTable, rng: &mut R) {
    if pt.uuid.is_empty() {
        pt.uuid = match pt.pt_type {
            PartitionTableType::Gpt => random_uuid(rng),
            PartitionTableType::Dos => format!("{:08x}", rng.gen::<u32>()),
        };
    }
    let gpt = pt.pt_type == PartitionTableType::Gpt;
    for part in &mut pt.partitions {
        if gpt && part.uuid.is_empty() {
            part.uuid = random_uuid(rng);
        }
        match &mut part.payload {
            Some(Payload::Filesystem(fs)) => fill_filesystem_uuid(fs, rng),
            Some(Payload::Lvm(vg)) => {
                for lv in &mut vg.logical_volumes {
                    fill_filesystem_uuid(&mut lv.filesystem, rng);
                }
            }
            None => {}
        }
    }
}

fn fill_filesystem_uuid<R: Rng>(fs: &mut Filesystem, rng: &mut R) {
    if !fs.uuid.is_empty() {
        return;
    }
    fs.uuid = if fs.fs_type == "vfat" {
        let id: u32 = rng.gen();
        format!("{:04X}-{:04X}", id >> 16, id & 0xffff)
    } else {
        random_uuid(rng)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{BIOS_BOOT_GUID, EFI_SYSTEM_GUID, FILESYSTEM_DATA_GUID, LVM_GUID};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn base() -> PartitionTable {
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![
                Partition::new(MEBIBYTE, BIOS_BOOT_GUID, None).bootable(),
                Partition::filesystem(
                    200 * MEBIBYTE,
                    EFI_SYSTEM_GUID,
                    Filesystem::new("vfat", "/boot/efi", "EFI-SYSTEM").with_fstab(
                        "defaults,uid=0,gid=0,umask=077,shortname=winnt",
                        0,
                        2,
                    ),
                ),
                Partition::filesystem(
                    2 * GIBIBYTE,
                    FILESYSTEM_DATA_GUID,
                    Filesystem::new("xfs", "/", "root"),
                ),
            ],
        )
    }

    fn mp(path: &str, size: u64) -> FilesystemCustomization {
        FilesystemCustomization {
            mountpoint: path.to_owned(),
            minsize: size,
        }
    }

    fn build(mps: &[FilesystemCustomization], size: u64, lvmify: bool, seed: u64) -> PartitionTable {
        let mut rng = StdRng::seed_from_u64(seed);
        new_partition_table(&base(), mps, size, lvmify, &mut rng).unwrap()
    }

    fn assert_no_overlap(pt: &PartitionTable) {
        let mut end = pt.start_offset;
        for part in &pt.partitions {
            assert!(part.start >= end, "partition overlaps predecessor");
            assert_eq!(part.start % MEBIBYTE, 0);
            end = part.end();
        }
        assert!(end + FOOTER_SIZE <= pt.size);
    }

    #[test]
    fn same_seed_same_table() {
        let mps = [mp("/var", 4 * GIBIBYTE)];
        assert_eq!(
            build(&mps, 10 * GIBIBYTE, true, 7),
            build(&mps, 10 * GIBIBYTE, true, 7)
        );
        assert_ne!(
            build(&mps, 10 * GIBIBYTE, true, 7).uuid,
            build(&mps, 10 * GIBIBYTE, true, 8).uuid
        );
    }

    #[test]
    fn last_partition_fills_image() {
        let pt = build(&[], 10 * GIBIBYTE, true, 0);
        assert_eq!(pt.size, 10 * GIBIBYTE);
        let last = pt.partitions.last().unwrap();
        assert_eq!(last.end() + FOOTER_SIZE, pt.size);
        assert!(!pt.is_lvm());
        assert_no_overlap(&pt);
    }

    #[test]
    fn new_mountpoint_converts_root_to_lvm() {
        let pt = build(&[mp("/var/log", 3 * GIBIBYTE)], 10 * GIBIBYTE, true, 1);
        assert!(pt.is_lvm());
        assert!(pt.contains_mountpoint("/boot"));
        assert!(pt.contains_mountpoint("/var/log"));

        let root = &pt.partitions[pt.root_partition_index().unwrap()];
        assert_eq!(root.part_type, LVM_GUID);
        let Some(Payload::Lvm(vg)) = &root.payload else {
            panic!("root is not on LVM");
        };
        assert_eq!(vg.name, ROOT_VG_NAME);
        let names: Vec<&str> = vg.logical_volumes.iter().map(|lv| lv.name.as_str()).collect();
        assert_eq!(names, vec!["rootlv", "var_loglv"]);
        assert_eq!(vg.logical_volumes[1].size, 3 * GIBIBYTE);
        let used: u64 = vg.logical_volumes.iter().map(|lv| lv.size).sum();
        assert_eq!(used + LVM_METADATA_SIZE, root.size);
        assert_no_overlap(&pt);
    }

    #[test]
    fn without_lvm_new_mountpoint_is_a_partition_before_root() {
        let pt = build(&[mp("/home", GIBIBYTE)], 10 * GIBIBYTE, false, 1);
        assert!(!pt.is_lvm());
        let mounts = pt.mountpoints();
        assert_eq!(mounts, vec!["/boot/efi", "/home", "/"]);
        assert_no_overlap(&pt);
    }

    #[test]
    fn existing_mountpoint_grows() {
        let pt = build(&[mp("/boot/efi", 500 * MEBIBYTE + 1)], 10 * GIBIBYTE, true, 1);
        assert!(!pt.is_lvm());
        assert_eq!(pt.partitions[1].size, 501 * MEBIBYTE);
    }

    #[test]
    fn image_grows_to_hold_requested_mountpoints() {
        let pt = build(&[mp("/data", 20 * GIBIBYTE)], 4 * GIBIBYTE, true, 3);
        assert!(pt.size > 20 * GIBIBYTE);
        assert_no_overlap(&pt);
    }

    #[test]
    fn oversized_mountpoint_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        for mps in [
            vec![mp("/boot/efi", u64::MAX - 5)],
            vec![mp("/data", u64::MAX - 5)],
            vec![mp("/data", u64::MAX / 2), mp("/srv", u64::MAX / 2)],
        ] {
            let err = new_partition_table(&base(), &mps, 4 * GIBIBYTE, true, &mut rng).unwrap_err();
            assert!(matches!(err, DiskError::SizeTooLarge(_)), "{err}");
        }
    }

    #[test]
    fn uuids_are_filled_per_filesystem_type() {
        let pt = build(&[], 4 * GIBIBYTE, false, 5);
        assert_eq!(pt.uuid.len(), 36);
        let efi = pt.find_filesystem("/boot/efi").unwrap();
        assert_eq!(efi.uuid.len(), 9);
        assert_eq!(&efi.uuid[4..5], "-");
        assert_eq!(pt.find_filesystem("/").unwrap().uuid.len(), 36);
        assert!(pt.partitions.iter().all(|p| !p.uuid.is_empty()));
    }

    #[test]
    fn lv_names() {
        assert_eq!(lv_name("/"), "rootlv");
        assert_eq!(lv_name("/var/log"), "var_loglv");
    }
}
