use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BootType {
    Legacy,
    Uefi,
    Hybrid,
}

impl BootType {
    pub fn supports_uefi(self) -> bool {
        matches!(self, BootType::Uefi | BootType::Hybrid)
    }

    pub fn supports_bios(self) -> bool {
        matches!(self, BootType::Legacy | BootType::Hybrid)
    }
}

impl std::fmt::Display for BootType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootType::Legacy => f.write_str("legacy"),
            BootType::Uefi => f.write_str("uefi"),
            BootType::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Firmware an architecture boots with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub bios: bool,
    /// Vendor directory under `/boot/efi/EFI`; empty without UEFI.
    #[serde(default)]
    pub uefi_vendor: String,
}

impl Platform {
    pub fn x86(uefi_vendor: &str) -> Self {
        Self {
            bios: true,
            uefi_vendor: uefi_vendor.to_owned(),
        }
    }

    pub fn aarch64(uefi_vendor: &str) -> Self {
        Self {
            bios: false,
            uefi_vendor: uefi_vendor.to_owned(),
        }
    }

    pub fn boot_type(&self) -> BootType {
        match (self.bios, self.uefi_vendor.is_empty()) {
            (true, false) => BootType::Hybrid,
            (true, true) => BootType::Legacy,
            (false, _) => BootType::Uefi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_type_from_firmware() {
        assert_eq!(Platform::x86("redhat").boot_type(), BootType::Hybrid);
        assert_eq!(Platform::x86("").boot_type(), BootType::Legacy);
        assert_eq!(Platform::aarch64("redhat").boot_type(), BootType::Uefi);
        assert!(BootType::Hybrid.supports_uefi());
        assert!(!BootType::Legacy.supports_uefi());
        assert!(BootType::Legacy.supports_bios());
    }
}
