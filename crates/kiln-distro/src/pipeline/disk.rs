//! Disk image assembly and output formats.

use super::{file_input, sectors, tree_input, BUILD_PIPELINE};
use crate::image_type::{DiskFormat, ImageTypeRef};
use kiln_disk::{Filesystem, PartitionTable, PartitionTableType, Payload};
use kiln_schema::{Pipeline, Stage};
use serde_json::{json, Map, Value};

pub(super) const DISK_IMAGE_FILENAME: &str = "disk.img";
pub(super) const RAW_IMAGE_FILENAME: &str = "image.raw";
pub(super) const COMPRESSED_IMAGE_FILENAME: &str = "image.raw.xz";

/// A filesystem together with the device it is created on.
struct Target<'a> {
    device: String,
    fs: &'a Filesystem,
}

fn loopback(filename: &str, start: u64, size: u64) -> Value {
    json!({
        "type": "org.osbuild.loopback",
        "options": {
            "filename": filename,
            "start": sectors(start),
            "size": sectors(size),
        },
    })
}

fn device_name(mountpoint: &str) -> String {
    if mountpoint == "/" {
        "root".to_owned()
    } else {
        mountpoint.trim_start_matches('/').replace('/', "-")
    }
}

/// Devices for every partition and logical volume, and the filesystems on
/// them.
fn devices<'a>(pt: &'a PartitionTable, filename: &str) -> (Map<String, Value>, Vec<Target<'a>>) {
    let mut devices = Map::new();
    let mut targets = Vec::new();
    for part in &pt.partitions {
        match &part.payload {
            Some(Payload::Filesystem(fs)) => {
                let name = device_name(&fs.mountpoint);
                devices.insert(name.clone(), loopback(filename, part.start, part.size));
                targets.push(Target { device: name, fs });
            }
            Some(Payload::Lvm(vg)) => {
                devices.insert(vg.name.clone(), loopback(filename, part.start, part.size));
                for lv in &vg.logical_volumes {
                    devices.insert(
                        lv.name.clone(),
                        json!({
                            "type": "org.osbuild.lvm2.lv",
                            "parent": vg.name,
                            "options": {"volume": lv.name},
                        }),
                    );
                    targets.push(Target {
                        device: lv.name.clone(),
                        fs: &lv.filesystem,
                    });
                }
            }
            None => {}
        }
    }
    (devices, targets)
}

fn mkfs_stage(target: &Target<'_>, devices: &Map<String, Value>) -> Stage {
    let fs = target.fs;
    let mut options = json!({"uuid": fs.uuid});
    if !fs.label.is_empty() {
        options["label"] = json!(fs.label);
    }
    let kind = match fs.fs_type.as_str() {
        "vfat" => {
            options["volid"] = json!(fs.uuid.replace('-', ""));
            if let Some(o) = options.as_object_mut() {
                o.remove("uuid");
            }
            "org.osbuild.mkfs.fat".to_owned()
        }
        other => format!("org.osbuild.mkfs.{other}"),
    };
    let device = &devices[&target.device];
    let mut stage_devices = Map::new();
    if let Some(parent) = device.get("parent").and_then(Value::as_str) {
        stage_devices.insert(parent.to_owned(), devices[parent].clone());
    }
    stage_devices.insert("device".to_owned(), device.clone());
    Stage::new(kind, options).with_devices(Value::Object(stage_devices))
}

fn mount_type(fs_type: &str) -> String {
    match fs_type {
        "vfat" => "org.osbuild.fat".to_owned(),
        other => format!("org.osbuild.{other}"),
    }
}

/// Partition the image file, create filesystems and copy a tree into it.
pub(super) fn image_pipeline(
    tree: &str,
    pt: &PartitionTable,
    filename: &str,
    image: ImageTypeRef<'_>,
) -> Pipeline {
    let mut p = Pipeline::new("image").with_build(BUILD_PIPELINE);
    p.add_stage(Stage::new(
        "org.osbuild.truncate",
        json!({"filename": filename, "size": pt.size.to_string()}),
    ));

    let partitions: Vec<Value> = pt
        .partitions
        .iter()
        .map(|part| {
            let mut entry = json!({
                "start": sectors(part.start),
                "size": sectors(part.size),
                "type": part.part_type,
            });
            if part.bootable {
                entry["bootable"] = json!(true);
            }
            if !part.uuid.is_empty() {
                entry["uuid"] = json!(part.uuid);
            }
            entry
        })
        .collect();
    let partition_stage = match pt.pt_type {
        PartitionTableType::Gpt => "org.osbuild.sgdisk",
        PartitionTableType::Dos => "org.osbuild.sfdisk",
    };
    let whole_disk = json!({"device": {
        "type": "org.osbuild.loopback",
        "options": {"filename": filename, "lock": true},
    }});
    p.add_stage(
        Stage::new(
            partition_stage,
            json!({"label": pt.pt_type.to_string(), "uuid": pt.uuid, "partitions": partitions}),
        )
        .with_devices(whole_disk),
    );

    let (devices, targets) = devices(pt, filename);
    for part in &pt.partitions {
        if let Some(Payload::Lvm(vg)) = &part.payload {
            let volumes: Vec<Value> = vg
                .logical_volumes
                .iter()
                .map(|lv| json!({"name": lv.name, "size": lv.size.to_string()}))
                .collect();
            p.add_stage(
                Stage::new("org.osbuild.lvm2.create", json!({"volumes": volumes}))
                    .with_devices(json!({"device": devices[&vg.name]})),
            );
        }
    }
    for target in &targets {
        p.add_stage(mkfs_stage(target, &devices));
    }

    let root_device = targets
        .iter()
        .find(|t| t.fs.mountpoint == "/")
        .map_or("root", |t| t.device.as_str());
    let mut mounts: Vec<&Target<'_>> = targets.iter().collect();
    mounts.sort_by(|a, b| a.fs.mountpoint.cmp(&b.fs.mountpoint));
    let mounts: Vec<Value> = mounts
        .into_iter()
        .map(|t| {
            json!({
                "name": t.device,
                "type": mount_type(&t.fs.fs_type),
                "source": t.device,
                "target": t.fs.mountpoint,
            })
        })
        .collect();
    p.add_stage(
        Stage::new(
            "org.osbuild.copy",
            json!({"paths": [{
                "from": "input://root-tree/",
                "to": format!("mount://{root_device}/"),
            }]}),
        )
        .with_inputs(json!({"root-tree": tree_input(tree)}))
        .with_devices(Value::Object(devices))
        .with_mounts(Value::Array(mounts)),
    );

    if image.boot_type().supports_bios() {
        if let Some(stage) = grub2_inst_stage(pt, filename) {
            p.add_stage(stage);
        }
    }
    p
}

/// Embed the BIOS core image after the partition table.
fn grub2_inst_stage(pt: &PartitionTable, filename: &str) -> Option<Stage> {
    let boot_index = pt
        .partitions
        .iter()
        .position(|p| p.mountpoints().contains(&"/boot"))
        .or_else(|| pt.root_partition_index())?;
    let boot_fs = pt
        .find_filesystem("/boot")
        .or_else(|| pt.find_filesystem("/"))?;
    let path = if boot_fs.mountpoint == "/boot" { "/grub2" } else { "/boot/grub2" };
    let location = pt.partitions.first().map_or(0, |p| sectors(p.start));
    Some(Stage::new(
        "org.osbuild.grub2.inst",
        json!({
            "filename": filename,
            "platform": "i386-pc",
            "location": location,
            "core": {
                "type": "mkimage",
                "partlabel": pt.pt_type.to_string(),
                "filesystem": boot_fs.fs_type,
            },
            "prefix": {
                "type": "partition",
                "partlabel": pt.pt_type.to_string(),
                "number": boot_index,
                "path": path,
            },
        }),
    ))
}

/// Convert the raw image into a qcow2 or VHD file.
pub(super) fn qemu_pipeline(format: DiskFormat, input: &str, filename: &str) -> Pipeline {
    let mut p = Pipeline::new(format.as_str()).with_build(BUILD_PIPELINE);
    let format_options = match format {
        DiskFormat::Qcow2 => json!({"type": "qcow2", "compat": "1.1"}),
        DiskFormat::Vpc => json!({"type": "vpc", "force_size": true, "subformat": "fixed"}),
        DiskFormat::Raw => json!({"type": "raw"}),
    };
    p.add_stage(
        Stage::new(
            "org.osbuild.qemu",
            json!({"filename": filename, "format": format_options}),
        )
        .with_inputs(json!({"image": file_input("image", input)})),
    );
    p
}

/// Archive the tree of another pipeline.
pub(super) fn tar_pipeline(name: &str, tree: &str, filename: &str) -> Pipeline {
    let mut p = Pipeline::new(name).with_build(BUILD_PIPELINE);
    p.add_stage(
        Stage::new("org.osbuild.tar", json!({"filename": filename}))
            .with_inputs(json!({"tree": tree_input(tree)})),
    );
    p
}

pub(super) fn xz_pipeline(input: &str, filename: &str) -> Pipeline {
    let mut p = Pipeline::new("xz").with_build(BUILD_PIPELINE);
    p.add_stage(
        Stage::new("org.osbuild.xz", json!({"filename": filename}))
            .with_inputs(json!({"file": file_input("image", input)})),
    );
    p
}
