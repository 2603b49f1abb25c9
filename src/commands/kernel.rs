//! Installed vs booted kernel diagnostics
//!
//! Mirrors the way grub-mkconfig orders kernel images: strip the image name
//! up to the first `-`, mark pre-release suffixes with `~`, and let
//! `dpkg --compare-versions` decide. Nothing is ever changed.

use anyhow::{Context as _, Result};
use colored::Colorize;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::Context;
use crate::runner;
use crate::ui;

/// Directories and file name prefixes that hold kernel images
const IMAGE_LOCATIONS: &[(&str, &str)] = &[
    ("/boot", "vmlinuz-"),
    ("/", "vmlinuz-"),
    ("/boot", "kernel-"),
];

static NAME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^-]*-").expect("hardcoded regex pattern is valid"));
static PRERELEASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[._-](pre|rc|test|git|old|trunk)").expect("hardcoded regex pattern is valid")
});

/// Package manager queries the report depends on
pub trait Dpkg {
    /// `dpkg --compare-versions left op right`
    fn compare_versions(&self, left: &str, op: &str, right: &str) -> Result<bool>;

    /// Package owning a file, from `dpkg-query -S`
    fn owning_package(&self, file: &Path) -> Result<String>;
}

/// Runs the real dpkg tools
pub struct SystemDpkg;

impl Dpkg for SystemDpkg {
    fn compare_versions(&self, left: &str, op: &str, right: &str) -> Result<bool> {
        runner::run_check("dpkg", &["--compare-versions", left, op, right])
    }

    fn owning_package(&self, file: &Path) -> Result<String> {
        let file = file.to_string_lossy();
        let output = runner::run_capture("dpkg-query", &["-S", &file])?;
        Ok(output.split(':').next().unwrap_or_default().trim().to_string())
    }
}

/// What the kernel check found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KernelInfo {
    /// Booted image is not the newest installed one
    pub new_kernel_exists: bool,
    /// Package of the booted image, empty when not looked up
    pub booted_package: String,
    /// Packages of images that are neither booted nor newest
    pub old_packages: Vec<String>,
}

fn is_candidate(name: &str) -> bool {
    !name.contains(".dpkg-") && !name.ends_with(".rpmsave") && !name.ends_with(".rpmnew")
}

/// Kernel images under `root`, in location order
pub fn find_kernels(root: &Path) -> Result<Vec<PathBuf>> {
    let mut kernels = Vec::new();
    for (dir, prefix) in IMAGE_LOCATIONS {
        let dir = root.join(dir.trim_start_matches('/'));
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e).with_context(|| format!("Could not read {}", dir.display())),
        };

        let mut found: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(prefix) && is_candidate(&name)
            })
            .map(|entry| entry.path())
            .collect();
        found.sort();
        kernels.extend(found);
    }
    Ok(kernels)
}

/// Version part of an image path in dpkg-comparable form
///
/// A trailing `.old` is split off and returned as the flag.
fn comparable_version(image: &Path) -> (String, bool) {
    let image = image.to_string_lossy();
    let stripped = NAME_PREFIX.replace(&image, "");
    let (version, old) = match stripped.strip_suffix(".old") {
        Some(version) => (version, true),
        None => (stripped.as_ref(), false),
    };
    (PRERELEASE.replace_all(version, "~$1").into_owned(), old)
}

/// Newest image according to dpkg version ordering
pub fn latest_kernel<'a>(kernels: &'a [PathBuf], dpkg: &dyn Dpkg) -> Result<Option<&'a PathBuf>> {
    let mut latest: Option<&PathBuf> = None;
    for kernel in kernels {
        let Some(current) = latest else {
            latest = Some(kernel);
            continue;
        };

        let (left, left_old) = comparable_version(kernel);
        let (right, right_old) = comparable_version(current);
        // an image equal to the current `.old` one wins
        let op = if right_old && !left_old { "ge" } else { "gt" };

        if dpkg.compare_versions(&left, op, &right)? {
            latest = Some(kernel);
        }
    }
    Ok(latest)
}

/// Image the running kernel was booted from, as named on the command line
pub fn booted_image(cmdline: &str) -> Option<&str> {
    cmdline
        .split_whitespace()
        .find_map(|arg| arg.strip_prefix("BOOT_IMAGE="))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Compare installed images with the booted one
pub fn collect(
    kernels: &[PathBuf],
    booted: &str,
    lookup_packages: bool,
    dpkg: &dyn Dpkg,
) -> Result<KernelInfo> {
    let latest = latest_kernel(kernels, dpkg)?;
    let latest_name = latest
        .map(|p| file_name(&p.to_string_lossy()).to_string())
        .unwrap_or_default();
    let booted_name = file_name(booted);

    let mut info = KernelInfo {
        new_kernel_exists: booted_name != latest_name,
        ..KernelInfo::default()
    };

    if lookup_packages {
        for kernel in kernels {
            let name = kernel.to_string_lossy();
            if file_name(&name) == booted_name {
                info.booted_package = dpkg.owning_package(kernel)?;
            } else if Some(kernel) != latest {
                info.old_packages.push(dpkg.owning_package(kernel)?);
            }
        }
    }
    Ok(info)
}

pub fn run(ctx: &Context, no_packages: bool, json: bool) -> Result<()> {
    let kernels = find_kernels(Path::new("/"))?;
    log::debug!("found {} kernel images", kernels.len());

    let cmdline = fs::read_to_string("/proc/cmdline").context("Could not read /proc/cmdline")?;
    let booted = booted_image(&cmdline).unwrap_or_default();
    log::info!("booted image: {booted}");

    let info = collect(&kernels, booted, !no_packages, &SystemDpkg)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    ui::header("Kernel");
    ui::kv("Booted", if booted.is_empty() { "unknown" } else { booted });
    if !no_packages {
        ui::kv("Booted package", &info.booted_package);
    }
    if ctx.verbose > 0 {
        for kernel in &kernels {
            ui::dim(&kernel.display().to_string());
        }
    }
    println!();
    if info.new_kernel_exists {
        ui::warn("A newer kernel is installed; reboot to use it");
    } else {
        ui::success("Running the newest installed kernel");
    }
    if !info.old_packages.is_empty() {
        println!();
        println!("  {}", "Old kernel packages".bold());
        for package in &info.old_packages {
            println!("    • {package}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::cmp::Ordering;

    /// Orders versions numerically by dotted/dashed components, `~` first
    struct FakeDpkg {
        lookups: RefCell<Vec<String>>,
    }

    impl FakeDpkg {
        fn new() -> Self {
            Self {
                lookups: RefCell::new(Vec::new()),
            }
        }
    }

    fn order(left: &str, right: &str) -> Ordering {
        let key = |v: &str| -> (Vec<u64>, bool) {
            let (main, pre) = match v.split_once('~') {
                Some((main, _)) => (main, true),
                None => (v, false),
            };
            let parts = main
                .split(['.', '-'])
                .filter_map(|p| p.parse().ok())
                .collect();
            (parts, !pre)
        };
        key(left).cmp(&key(right))
    }

    impl Dpkg for FakeDpkg {
        fn compare_versions(&self, left: &str, op: &str, right: &str) -> Result<bool> {
            let ord = order(left, right);
            Ok(match op {
                "gt" => ord == Ordering::Greater,
                "ge" => ord != Ordering::Less,
                _ => false,
            })
        }

        fn owning_package(&self, file: &Path) -> Result<String> {
            let name = file_name(&file.to_string_lossy()).to_string();
            self.lookups.borrow_mut().push(name.clone());
            Ok(name.replace("vmlinuz", "pve-kernel"))
        }
    }

    fn images(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/boot/{n}"))).collect()
    }

    #[test]
    fn test_comparable_version() {
        assert_eq!(
            comparable_version(Path::new("/boot/vmlinuz-6.8.12-4-pve")),
            ("6.8.12-4-pve".to_string(), false)
        );
        assert_eq!(
            comparable_version(Path::new("/boot/vmlinuz-6.9-rc1")),
            ("6.9~rc1".to_string(), false)
        );
        assert_eq!(
            comparable_version(Path::new("/vmlinuz-5.15.old")),
            ("5.15".to_string(), true)
        );
    }

    #[test]
    fn test_latest_kernel() {
        let dpkg = FakeDpkg::new();
        let kernels = images(&["vmlinuz-6.5.13-1-pve", "vmlinuz-6.8", "vmlinuz-6.8-rc1"]);
        let latest = latest_kernel(&kernels, &dpkg).unwrap();
        assert_eq!(latest, Some(&PathBuf::from("/boot/vmlinuz-6.8")));

        assert_eq!(latest_kernel(&[], &dpkg).unwrap(), None);
    }

    #[test]
    fn test_latest_kernel_prefers_current_over_old_copy() {
        let dpkg = FakeDpkg::new();

        let kernels = images(&["vmlinuz-6.8.old", "vmlinuz-6.8"]);
        let latest = latest_kernel(&kernels, &dpkg).unwrap();
        assert_eq!(latest, Some(&PathBuf::from("/boot/vmlinuz-6.8")));

        let kernels = images(&["vmlinuz-6.8", "vmlinuz-6.8.old"]);
        let latest = latest_kernel(&kernels, &dpkg).unwrap();
        assert_eq!(latest, Some(&PathBuf::from("/boot/vmlinuz-6.8")));
    }

    #[test]
    fn test_booted_image() {
        let cmdline = "BOOT_IMAGE=/boot/vmlinuz-6.8.12-4-pve root=/dev/mapper/pve-root ro quiet";
        assert_eq!(booted_image(cmdline), Some("/boot/vmlinuz-6.8.12-4-pve"));
        assert_eq!(booted_image("root=ZFS=rpool/ROOT/pve-1 boot=zfs"), None);
    }

    #[test]
    fn test_collect_flags_newer_kernel_and_old_packages() {
        let dpkg = FakeDpkg::new();
        let kernels = images(&["vmlinuz-6.2.16-3-pve", "vmlinuz-6.5.13-1-pve", "vmlinuz-6.8.12-4-pve"]);

        let info = collect(&kernels, "/vmlinuz-6.5.13-1-pve", true, &dpkg).unwrap();
        assert!(info.new_kernel_exists);
        assert_eq!(info.booted_package, "pve-kernel-6.5.13-1-pve");
        assert_eq!(info.old_packages, vec!["pve-kernel-6.2.16-3-pve"]);
    }

    #[test]
    fn test_collect_without_packages() {
        let dpkg = FakeDpkg::new();
        let kernels = images(&["vmlinuz-6.5.13-1-pve", "vmlinuz-6.8.12-4-pve"]);

        let info = collect(&kernels, "/boot/vmlinuz-6.8.12-4-pve", false, &dpkg).unwrap();
        assert!(!info.new_kernel_exists);
        assert!(info.booted_package.is_empty());
        assert!(dpkg.lookups.borrow().is_empty());
    }

    #[test]
    fn test_find_kernels_skips_package_leftovers() {
        let root = tempfile::tempdir().unwrap();
        let boot = root.path().join("boot");
        fs::create_dir(&boot).unwrap();
        for name in [
            "vmlinuz-6.8.12-4-pve",
            "vmlinuz-6.5.13-1-pve.dpkg-tmp",
            "vmlinuz-6.2.16-3-pve.rpmnew",
            "kernel-6.1",
            "initrd.img-6.8.12-4-pve",
        ] {
            fs::write(boot.join(name), "").unwrap();
        }
        fs::write(root.path().join("vmlinuz-6.8.12-4-pve"), "").unwrap();

        let found: Vec<String> = find_kernels(root.path())
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(root.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(
            found,
            vec!["boot/vmlinuz-6.8.12-4-pve", "vmlinuz-6.8.12-4-pve", "boot/kernel-6.1"]
        );
    }
}
