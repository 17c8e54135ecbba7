//! Hardware detection and GPU drivers
//!
//! Firmware mode comes from `/sys/firmware/efi`; GPU vendors from the
//! display controllers `lspci` lists. Detection is read-only and also runs
//! under dry-run so the preview names the real driver packages.

use std::fmt;
use std::path::Path;

use super::require_packages;
use crate::step::{StepContext, StepStatus};

/// Firmware the system booted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareMode {
    Uefi,
    Bios,
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// The kernel exposes `/sys/firmware/efi` only when booted in UEFI mode.
pub fn detect_firmware_mode() -> FirmwareMode {
    if Path::new("/sys/firmware/efi").exists() {
        FirmwareMode::Uefi
    } else {
        FirmwareMode::Bios
    }
}

/// GPU vendor with a driver set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
}

impl GpuVendor {
    /// Driver packages for this vendor
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Self::Nvidia => &["nvidia-open", "nvidia-utils", "nvidia-settings"],
            Self::Amd => &["mesa", "vulkan-radeon", "libva-mesa-driver"],
            Self::Intel => &["mesa", "vulkan-intel", "intel-media-driver"],
        }
    }

    fn from_description(description: &str) -> Option<Self> {
        let lower = description.to_lowercase();
        if lower.contains("nvidia") {
            Some(Self::Nvidia)
        } else if lower.contains("advanced micro devices") || lower.contains("amd") {
            Some(Self::Amd)
        } else if lower.contains("intel") {
            Some(Self::Intel)
        } else {
            None
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvidia => write!(f, "NVIDIA"),
            Self::Amd => write!(f, "AMD"),
            Self::Intel => write!(f, "Intel"),
        }
    }
}

/// lspci device classes that are GPUs
const DISPLAY_CLASSES: &[&str] = &[
    "VGA compatible controller",
    "3D controller",
    "Display controller",
];

/// Vendors of every display controller in `lspci` output, deduplicated in
/// listing order. Hybrid laptops yield two.
pub fn parse_gpu_vendors(lspci: &str) -> Vec<GpuVendor> {
    let mut vendors = Vec::new();
    for line in lspci.lines() {
        // "00:02.0 VGA compatible controller: Intel Corporation ..."
        let Some((class, description)) = line
            .split_once(' ')
            .and_then(|(_, rest)| rest.split_once(": "))
        else {
            continue;
        };
        if !DISPLAY_CLASSES.iter().any(|c| class.starts_with(c)) {
            continue;
        }
        if let Some(vendor) = GpuVendor::from_description(description) {
            if !vendors.contains(&vendor) {
                vendors.push(vendor);
            }
        }
    }
    vendors
}

pub(super) fn install_drivers(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    let lspci = match cx.shell().capture("lspci", &[] as &[&str]) {
        Ok(out) if out.success => out.stdout,
        Ok(_) | Err(_) => {
            return Ok(StepStatus::Issues(
                "lspci unavailable; install pciutils to detect the GPU".to_string(),
            ));
        }
    };

    let vendors = parse_gpu_vendors(&lspci);
    if vendors.is_empty() {
        return Ok(StepStatus::Issues(
            "no supported GPU vendor detected; install drivers manually".to_string(),
        ));
    }

    let mut packages: Vec<&str> = Vec::new();
    for vendor in &vendors {
        tracing::info!("  Detected {} GPU", vendor);
        for pkg in vendor.packages() {
            if !packages.contains(pkg) {
                packages.push(*pkg);
            }
        }
    }

    require_packages(cx, &packages)?;
    Ok(StepStatus::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HYBRID: &str = "\
00:00.0 Host bridge: Intel Corporation 12th Gen Core Processor Host Bridge
00:02.0 VGA compatible controller: Intel Corporation Alder Lake-P GT2 [Iris Xe Graphics] (rev 0c)
01:00.0 3D controller: NVIDIA Corporation GA107M [GeForce RTX 3050 Mobile] (rev a1)
02:00.0 Network controller: Intel Corporation Wi-Fi 6 AX201
";

    #[test]
    fn test_hybrid_laptop_yields_both_vendors() {
        assert_eq!(
            parse_gpu_vendors(HYBRID),
            vec![GpuVendor::Intel, GpuVendor::Nvidia]
        );
    }

    #[test]
    fn test_amd_detection() {
        let out = "03:00.0 VGA compatible controller: Advanced Micro Devices, Inc. [AMD/ATI] Navi 23\n";
        assert_eq!(parse_gpu_vendors(out), vec![GpuVendor::Amd]);
    }

    #[test]
    fn test_unknown_vendor_yields_nothing() {
        let out = "00:0f.0 VGA compatible controller: VMware SVGA II Adapter\n";
        assert!(parse_gpu_vendors(out).is_empty());
        // Non-display devices are ignored even for known vendors
        assert!(parse_gpu_vendors("00:1f.3 Audio device: Intel Corporation\n").is_empty());
    }

    #[test]
    fn test_firmware_mode_display() {
        assert_eq!(FirmwareMode::Uefi.to_string(), "UEFI");
        assert_eq!(FirmwareMode::Bios.to_string(), "BIOS");
    }
}
