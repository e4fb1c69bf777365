use super::{core_error, json_pretty, EXIT_SUCCESS};
use console::Style;
use kiln_core::{Composer, CoreError};
use serde::Serialize;

#[derive(Serialize)]
struct ImageTypeInfo<'a> {
    name: &'a str,
    aliases: Vec<&'a str>,
    filename: &'a str,
    mime_type: &'a str,
    exports: Vec<String>,
    partition_type: String,
    boot_type: String,
}

fn lookup_error(e: kiln_distro::RegistryError) -> String {
    core_error(&CoreError::from(e))
}

#[allow(clippy::unnecessary_wraps)]
pub fn distros(composer: &Composer, json: bool) -> Result<u8, String> {
    let names = composer.registry().list_distros();
    if json {
        println!("{}", json_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn arches(composer: &Composer, distro: &str, json: bool) -> Result<u8, String> {
    let distro = composer.registry().distro(distro).map_err(lookup_error)?;
    let names = distro.list_arches();
    if json {
        println!("{}", json_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn image_types(
    composer: &Composer,
    distro: &str,
    arch: &str,
    json: bool,
) -> Result<u8, String> {
    let registry = composer.registry();
    let arch = registry
        .distro(distro)
        .and_then(|d| d.arch(arch))
        .map_err(lookup_error)?;

    let mut infos = Vec::new();
    for name in arch.list_image_types() {
        let it = registry
            .resolve(distro, &arch.name, name)
            .map_err(lookup_error)?;
        let aliases = arch
            .aliases()
            .iter()
            .filter(|(_, target)| target.as_str() == name)
            .map(|(alias, _)| alias.as_str())
            .collect();
        infos.push(ImageTypeInfo {
            name: it.name(),
            aliases,
            filename: it.filename(),
            mime_type: it.mime_type(),
            exports: it.exports(),
            partition_type: it.partition_type(),
            boot_type: it.boot_type().to_string(),
        });
    }

    if json {
        println!("{}", json_pretty(&infos)?);
    } else {
        let dim = Style::new().dim();
        for info in &infos {
            if info.aliases.is_empty() {
                println!("{}", info.name);
            } else {
                let aliases = format!("(alias: {})", info.aliases.join(", "));
                println!("{} {}", info.name, dim.apply_to(aliases));
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
