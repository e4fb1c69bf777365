use kiln_disk::partition::{
    BIOS_BOOT_GUID, EFI_SYSTEM_GUID, FILESYSTEM_DATA_GUID, XBOOTLDR_GUID,
};
use kiln_disk::{Filesystem, Partition, PartitionTable, PartitionTableType, GIBIBYTE, MEBIBYTE};
use std::collections::BTreeMap;

const EFI_FSTAB_OPTIONS: &str = "defaults,uid=0,gid=0,umask=077,shortname=winnt";

fn efi(size: u64) -> Partition {
    Partition::filesystem(
        size,
        EFI_SYSTEM_GUID,
        Filesystem::new("vfat", "/boot/efi", "EFI-SYSTEM").with_fstab(EFI_FSTAB_OPTIONS, 0, 2),
    )
}

fn bios_boot() -> Partition {
    Partition::new(MEBIBYTE, BIOS_BOOT_GUID, None).bootable()
}

fn root(fs_type: &str, size: u64) -> Partition {
    Partition::filesystem(
        size,
        FILESYSTEM_DATA_GUID,
        Filesystem::new(fs_type, "/", "root"),
    )
}

/// Layouts for package-based disk images.
pub fn default_tables() -> BTreeMap<String, PartitionTable> {
    let boot = || {
        Partition::filesystem(
            500 * MEBIBYTE,
            XBOOTLDR_GUID,
            Filesystem::new("xfs", "/boot", "boot"),
        )
    };
    let mut tables = BTreeMap::new();
    tables.insert(
        "x86_64".to_owned(),
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![bios_boot(), efi(200 * MEBIBYTE), boot(), root("xfs", 2 * GIBIBYTE)],
        ),
    );
    tables.insert(
        "aarch64".to_owned(),
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![efi(200 * MEBIBYTE), boot(), root("xfs", 2 * GIBIBYTE)],
        ),
    );
    tables
}

/// Layouts for deployed OSTree images.
pub fn edge_tables() -> BTreeMap<String, PartitionTable> {
    let boot = || {
        Partition::filesystem(
            384 * MEBIBYTE,
            FILESYSTEM_DATA_GUID,
            Filesystem::new("ext4", "/boot", "boot").with_fstab("defaults", 1, 1),
        )
    };
    let edge_root = || {
        let mut part = root("xfs", 2569 * MEBIBYTE);
        if let Some(kiln_disk::Payload::Filesystem(fs)) = &mut part.payload {
            fs.fstab_options = "defaults,x-systemd.growfs".to_owned();
        }
        part
    };
    let mut tables = BTreeMap::new();
    tables.insert(
        "x86_64".to_owned(),
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![bios_boot(), efi(127 * MEBIBYTE), boot(), edge_root()],
        ),
    );
    tables.insert(
        "aarch64".to_owned(),
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![efi(127 * MEBIBYTE), boot(), edge_root()],
        ),
    );
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_has_root_and_efi() {
        for tables in [default_tables(), edge_tables()] {
            for (arch, pt) in &tables {
                assert!(pt.contains_mountpoint("/"), "{arch} lacks /");
                assert!(pt.contains_mountpoint("/boot/efi"), "{arch} lacks /boot/efi");
                assert!(pt.contains_mountpoint("/boot"), "{arch} lacks /boot");
            }
        }
    }
}
