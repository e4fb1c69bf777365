use crate::MEBIBYTE;
use serde::{Deserialize, Serialize};

pub const BIOS_BOOT_GUID: &str = "21686148-6449-6E6F-744E-656564454649";
pub const EFI_SYSTEM_GUID: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";
pub const FILESYSTEM_DATA_GUID: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";
pub const XBOOTLDR_GUID: &str = "BC13C2FF-59E6-4262-A352-B57F8B48D9C5";
pub const LVM_GUID: &str = "E6D6D379-F507-44C2-A23C-238F2A3DF928";

pub const DOS_LINUX_ID: &str = "83";
pub const DOS_FAT16_BOOT_ID: &str = "06";
pub const DOS_LVM_ID: &str = "8e";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    Gpt,
    Dos,
}

impl std::fmt::Display for PartitionTableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionTableType::Gpt => f.write_str("gpt"),
            PartitionTableType::Dos => f.write_str("dos"),
        }
    }
}

/// Concrete disk layout. Offsets and sizes are in bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionTable {
    #[serde(rename = "type")]
    pub pt_type: PartitionTableType,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub size: u64,
    /// First byte available to partitions.
    pub start_offset: u64,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partition {
    #[serde(default)]
    pub start: u64,
    pub size: u64,
    pub part_type: String,
    #[serde(default)]
    pub bootable: bool,
    #[serde(default)]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Filesystem(Filesystem),
    Lvm(VolumeGroup),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Filesystem {
    pub fs_type: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub label: String,
    pub mountpoint: String,
    pub fstab_options: String,
    #[serde(default)]
    pub fstab_freq: u32,
    #[serde(default)]
    pub fstab_passno: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeGroup {
    pub name: String,
    pub description: String,
    pub logical_volumes: Vec<LogicalVolume>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogicalVolume {
    pub name: String,
    pub size: u64,
    pub filesystem: Filesystem,
}

impl Filesystem {
    pub fn new(fs_type: &str, mountpoint: &str, label: &str) -> Self {
        Self {
            fs_type: fs_type.to_owned(),
            uuid: String::new(),
            label: label.to_owned(),
            mountpoint: mountpoint.to_owned(),
            fstab_options: "defaults".to_owned(),
            fstab_freq: 0,
            fstab_passno: 0,
        }
    }

    #[must_use]
    pub fn with_fstab(mut self, options: &str, freq: u32, passno: u32) -> Self {
        self.fstab_options = options.to_owned();
        self.fstab_freq = freq;
        self.fstab_passno = passno;
        self
    }
}

impl Partition {
    pub fn new(size: u64, part_type: &str, payload: Option<Payload>) -> Self {
        Self {
            start: 0,
            size,
            part_type: part_type.to_owned(),
            bootable: false,
            uuid: String::new(),
            payload,
        }
    }

    pub fn filesystem(size: u64, part_type: &str, fs: Filesystem) -> Self {
        Self::new(size, part_type, Some(Payload::Filesystem(fs)))
    }

    #[must_use]
    pub fn bootable(mut self) -> Self {
        self.bootable = true;
        self
    }

    /// Mountpoints served by this partition.
    pub fn mountpoints(&self) -> Vec<&str> {
        match &self.payload {
            Some(Payload::Filesystem(fs)) => vec![fs.mountpoint.as_str()],
            Some(Payload::Lvm(vg)) => vg
                .logical_volumes
                .iter()
                .map(|lv| lv.filesystem.mountpoint.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_lvm(&self) -> bool {
        matches!(self.payload, Some(Payload::Lvm(_)))
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

impl PartitionTable {
    pub fn new(pt_type: PartitionTableType, partitions: Vec<Partition>) -> Self {
        Self {
            pt_type,
            uuid: String::new(),
            size: 0,
            start_offset: MEBIBYTE,
            partitions,
        }
    }

    pub fn mountpoints(&self) -> Vec<&str> {
        self.partitions
            .iter()
            .flat_map(Partition::mountpoints)
            .collect()
    }

    pub fn contains_mountpoint(&self, mountpoint: &str) -> bool {
        self.mountpoints().contains(&mountpoint)
    }

    pub fn is_lvm(&self) -> bool {
        self.partitions.iter().any(Partition::is_lvm)
    }

    /// Every filesystem in on-disk order, including those on logical volumes.
    pub fn filesystems(&self) -> Vec<&Filesystem> {
        let mut out = Vec::new();
        for part in &self.partitions {
            match &part.payload {
                Some(Payload::Filesystem(fs)) => out.push(fs),
                Some(Payload::Lvm(vg)) => {
                    out.extend(vg.logical_volumes.iter().map(|lv| &lv.filesystem));
                }
                None => {}
            }
        }
        out
    }

    pub fn find_filesystem(&self, mountpoint: &str) -> Option<&Filesystem> {
        self.filesystems()
            .into_iter()
            .find(|fs| fs.mountpoint == mountpoint)
    }

    /// Index of the partition holding `/`, directly or on a logical volume.
    pub fn root_partition_index(&self) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| p.mountpoints().contains(&"/"))
    }

    /// Partition type identifier for plain data partitions.
    pub fn data_part_type(&self) -> &'static str {
        match self.pt_type {
            PartitionTableType::Gpt => FILESYSTEM_DATA_GUID,
            PartitionTableType::Dos => DOS_LINUX_ID,
        }
    }

    pub fn lvm_part_type(&self) -> &'static str {
        match self.pt_type {
            PartitionTableType::Gpt => LVM_GUID,
            PartitionTableType::Dos => DOS_LVM_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PartitionTable {
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![
                Partition::new(MEBIBYTE, BIOS_BOOT_GUID, None).bootable(),
                Partition::filesystem(
                    100 * MEBIBYTE,
                    EFI_SYSTEM_GUID,
                    Filesystem::new("vfat", "/boot/efi", "EFI-SYSTEM"),
                ),
                Partition::new(
                    2048 * MEBIBYTE,
                    LVM_GUID,
                    Some(Payload::Lvm(VolumeGroup {
                        name: "rootvg".to_owned(),
                        description: String::new(),
                        logical_volumes: vec![LogicalVolume {
                            name: "rootlv".to_owned(),
                            size: 2047 * MEBIBYTE,
                            filesystem: Filesystem::new("xfs", "/", "root"),
                        }],
                    })),
                ),
            ],
        )
    }

    #[test]
    fn mountpoints_include_logical_volumes() {
        let pt = table();
        assert_eq!(pt.mountpoints(), vec!["/boot/efi", "/"]);
        assert!(pt.contains_mountpoint("/"));
        assert!(!pt.contains_mountpoint("/var"));
        assert!(pt.is_lvm());
        assert_eq!(pt.root_partition_index(), Some(2));
    }

    #[test]
    fn find_filesystem_by_mountpoint() {
        let pt = table();
        assert_eq!(pt.find_filesystem("/boot/efi").unwrap().fs_type, "vfat");
        assert!(pt.find_filesystem("/home").is_none());
    }

    #[test]
    fn part_types_follow_table_type() {
        let mut pt = table();
        assert_eq!(pt.lvm_part_type(), LVM_GUID);
        pt.pt_type = PartitionTableType::Dos;
        assert_eq!(pt.data_part_type(), DOS_LINUX_ID);
        assert_eq!(pt.pt_type.to_string(), "dos");
    }
}
