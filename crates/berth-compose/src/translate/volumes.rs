//! Volume declarations to mount specifications.
//!
//! Short syntax is `[source:]target[:options]`. A source that looks like a
//! path (contains `/`, or starts with `.` or `~`) is a bind mount resolved
//! against the working directory; anything else is a named volume.

use std::path::{Component, Path, PathBuf};

use berth_common::error::{BerthError, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use super::TranslateContext;
use crate::parser::value::{as_bool, as_u64, scalar_to_string};

const PROPAGATION_MODES: &[&str] = &["shared", "rshared", "slave", "rslave", "private", "rprivate"];

/// Kind of mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Host path.
    Bind,
    /// Runtime-managed volume (named or anonymous).
    Volume,
    /// In-memory filesystem.
    Tmpfs,
}

/// Bind-specific options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindOptions {
    /// Mount propagation mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation: Option<String>,
    /// Create the host path if it does not exist.
    pub create_host_path: bool,
}

/// Volume-specific options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VolumeOptions {
    /// Do not copy image content into an empty volume.
    pub nocopy: bool,
}

/// tmpfs-specific options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct TmpfsOptions {
    /// Size limit in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Permission bits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    /// Owner user ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Owner group ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Disallow execution.
    pub noexec: bool,
    /// Ignore set-user/group-ID bits.
    pub nosuid: bool,
    /// Disallow device files.
    pub nodev: bool,
}

/// A normalized mount ready for the runtime layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    /// Mount kind.
    pub kind: MountKind,
    /// Resolved host path or runtime volume name. `None` for anonymous
    /// volumes and tmpfs.
    pub source: Option<String>,
    /// Path inside the container.
    pub target: String,
    /// Mounted read-only.
    pub read_only: bool,
    /// Short-syntax options as written (e.g. `ro`, `z`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Bind options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<BindOptions>,
    /// Volume options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeOptions>,
    /// tmpfs options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmpfs: Option<TmpfsOptions>,
}

impl MountSpec {
    fn new(kind: MountKind, source: Option<String>, target: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            target: target.into(),
            read_only: false,
            options: Vec::new(),
            bind: None,
            volume: None,
            tmpfs: None,
        }
    }
}

/// Mounts of one service, split by creation path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountSet {
    /// Bind and volume mounts.
    pub mounts: Vec<MountSpec>,
    /// tmpfs mounts.
    pub tmpfs: Vec<MountSpec>,
}

/// Returns `true` if a short-syntax source denotes a host path.
pub fn is_bind_source(source: &str) -> bool {
    source.contains('/') || source.starts_with('.') || source.starts_with('~')
}

/// Returns the named-volume source referenced by a declaration, if any.
///
/// Anonymous volumes, bind mounts and tmpfs return `None`.
pub fn named_source(declaration: &Value) -> Option<String> {
    match declaration {
        Value::String(spec) => {
            let (source, _) = spec.split_once(':')?;
            (!source.is_empty() && !is_bind_source(source)).then(|| source.to_owned())
        }
        Value::Mapping(long) => {
            let source = long.get("source").and_then(scalar_to_string)?;
            match long.get("type").and_then(Value::as_str) {
                Some("volume") => Some(source),
                None if !is_bind_source(&source) => Some(source),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Translates all volume declarations of one service.
///
/// # Errors
///
/// Returns an error for the first malformed declaration.
pub fn translate_volumes(declarations: &[Value], ctx: &TranslateContext<'_>) -> Result<MountSet> {
    let mut set = MountSet::default();
    for declaration in declarations {
        let mount = match declaration {
            Value::String(spec) => parse_short(spec, ctx)?,
            Value::Mapping(long) => parse_long(long, ctx)?,
            _ => {
                return Err(BerthError::invalid_field(
                    "volumes",
                    "entries must be strings or mappings",
                ));
            }
        };
        if mount.kind == MountKind::Tmpfs {
            set.tmpfs.push(mount);
        } else {
            set.mounts.push(mount);
        }
    }
    Ok(set)
}

fn parse_short(spec: &str, ctx: &TranslateContext<'_>) -> Result<MountSpec> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (source, target, options) = match parts.as_slice() {
        [target] => (None, *target, None),
        [source, target] => (Some(*source), *target, None),
        [source, target, options] => (Some(*source), *target, Some(*options)),
        _ => {
            return Err(BerthError::invalid_field(
                "volumes",
                format!("\"{spec}\" has too many ':' separated parts"),
            ));
        }
    };
    if target.is_empty() {
        return Err(BerthError::invalid_field(
            "volumes",
            format!("\"{spec}\" has an empty target"),
        ));
    }

    let mut mount = match source.filter(|s| !s.is_empty()) {
        None => MountSpec::new(MountKind::Volume, None, target),
        Some(src) if is_bind_source(src) => {
            let mut mount =
                MountSpec::new(MountKind::Bind, Some(resolve_host_path(src, ctx)), target);
            mount.bind = Some(BindOptions {
                propagation: None,
                create_host_path: true,
            });
            mount
        }
        Some(src) => MountSpec::new(MountKind::Volume, Some(volume_name(src, ctx)), target),
    };

    for option in options.into_iter().flat_map(|o| o.split(',')) {
        match option {
            "" => continue,
            "ro" => mount.read_only = true,
            "rw" => mount.read_only = false,
            "nocopy" => mount.volume = Some(VolumeOptions { nocopy: true }),
            mode if PROPAGATION_MODES.contains(&mode) => {
                if let Some(bind) = mount.bind.as_mut() {
                    bind.propagation = Some(mode.to_owned());
                }
            }
            _ => {}
        }
        mount.options.push(option.to_owned());
    }
    Ok(mount)
}

fn parse_long(long: &Mapping, ctx: &TranslateContext<'_>) -> Result<MountSpec> {
    let target = long
        .get("target")
        .and_then(scalar_to_string)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BerthError::invalid_field("volumes", "long syntax requires a target"))?;
    let source = long
        .get("source")
        .and_then(scalar_to_string)
        .filter(|s| !s.is_empty());

    let kind = match long.get("type").and_then(scalar_to_string).as_deref() {
        Some("bind") => MountKind::Bind,
        Some("volume") => MountKind::Volume,
        Some("tmpfs") => MountKind::Tmpfs,
        Some(other) => {
            return Err(BerthError::invalid_field(
                "volumes",
                format!("unsupported mount type \"{other}\""),
            ));
        }
        None => match &source {
            Some(src) if is_bind_source(src) => MountKind::Bind,
            _ => MountKind::Volume,
        },
    };

    let mut mount = match kind {
        MountKind::Bind => {
            let src = source.ok_or_else(|| {
                BerthError::invalid_field("volumes", format!("bind mount {target} has no source"))
            })?;
            let mut mount = MountSpec::new(kind, Some(resolve_host_path(&src, ctx)), target);
            let options = long.get("bind");
            mount.bind = Some(BindOptions {
                propagation: options
                    .and_then(|b| b.get("propagation"))
                    .and_then(scalar_to_string),
                create_host_path: options
                    .and_then(|b| b.get("create_host_path"))
                    .and_then(as_bool)
                    .unwrap_or(false),
            });
            mount
        }
        MountKind::Volume => {
            let mut mount = MountSpec::new(kind, source.map(|s| volume_name(&s, ctx)), target);
            if let Some(options) = long.get("volume") {
                mount.volume = Some(VolumeOptions {
                    nocopy: options.get("nocopy").and_then(as_bool).unwrap_or(false),
                });
            }
            mount
        }
        MountKind::Tmpfs => {
            let mut mount = MountSpec::new(kind, None, target);
            mount.tmpfs = Some(match long.get("tmpfs") {
                Some(options) => tmpfs_options(options)?,
                None => TmpfsOptions::default(),
            });
            mount
        }
    };
    mount.read_only = long.get("read_only").and_then(as_bool).unwrap_or(false);
    Ok(mount)
}

fn tmpfs_options(options: &Value) -> Result<TmpfsOptions> {
    let id = |key: &str| -> Result<Option<u32>> {
        options
            .get(key)
            .map(|v| {
                as_u64(v)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| BerthError::invalid_field(format!("tmpfs.{key}"), "expected an ID"))
            })
            .transpose()
    };
    let flag = |key: &str| options.get(key).and_then(as_bool).unwrap_or(false);

    Ok(TmpfsOptions {
        size_bytes: options.get("size").map(parse_size).transpose()?,
        mode: options.get("mode").map(parse_mode).transpose()?,
        uid: id("uid")?,
        gid: id("gid")?,
        noexec: flag("noexec"),
        nosuid: flag("nosuid"),
        nodev: flag("nodev"),
    })
}

/// Parses a service-level `tmpfs` entry: `target[:opt,opt=value,...]`.
///
/// # Errors
///
/// Returns an error if the target is empty or an option value is invalid.
pub fn parse_tmpfs_entry(entry: &str) -> Result<MountSpec> {
    let (target, options) = entry.split_once(':').unwrap_or((entry, ""));
    if target.is_empty() {
        return Err(BerthError::invalid_field("tmpfs", "empty target"));
    }
    let mut mount = MountSpec::new(MountKind::Tmpfs, None, target);
    let mut tmpfs = TmpfsOptions::default();
    for option in options.split(',').filter(|o| !o.is_empty()) {
        match option.split_once('=') {
            Some(("size", v)) => tmpfs.size_bytes = Some(parse_size(&Value::String(v.into()))?),
            Some(("mode", v)) => tmpfs.mode = Some(parse_mode(&Value::String(v.into()))?),
            Some(("uid", v)) => tmpfs.uid = Some(parse_id("uid", v)?),
            Some(("gid", v)) => tmpfs.gid = Some(parse_id("gid", v)?),
            _ => match option {
                "noexec" => tmpfs.noexec = true,
                "nosuid" => tmpfs.nosuid = true,
                "nodev" => tmpfs.nodev = true,
                "ro" => mount.read_only = true,
                _ => {}
            },
        }
        mount.options.push(option.to_owned());
    }
    mount.tmpfs = Some(tmpfs);
    Ok(mount)
}

fn parse_id(key: &str, text: &str) -> Result<u32> {
    text.parse()
        .map_err(|_| BerthError::invalid_field(format!("tmpfs.{key}"), "expected an ID"))
}

/// Parses a byte size: an integer, or a number with a `b`/`k`/`m`/`g`
/// suffix (binary multiples, optional trailing `b`/`ib`).
///
/// # Errors
///
/// Returns an error if the value is not a valid size.
pub fn parse_size(value: &Value) -> Result<u64> {
    let invalid = || BerthError::invalid_field("size", format!("cannot parse {value:?} as a size"));
    if let Value::Number(n) = value {
        return n.as_u64().ok_or_else(invalid);
    }
    let text = value.as_str().ok_or_else(invalid)?.trim().to_ascii_lowercase();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, suffix) = text.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match suffix.trim_end_matches("ib").trim_end_matches('b') {
        "" => 1,
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        _ => return Err(invalid()),
    };
    amount.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parses permission bits. Digits are read as octal, whether written as a
/// YAML integer (`1777`) or a string (`"0755"`).
fn parse_mode(value: &Value) -> Result<u32> {
    scalar_to_string(value)
        .and_then(|s| u32::from_str_radix(s.trim().trim_start_matches("0o"), 8).ok())
        .ok_or_else(|| BerthError::invalid_field("tmpfs.mode", "expected octal permission bits"))
}

fn volume_name(source: &str, ctx: &TranslateContext<'_>) -> String {
    match ctx.declared_volumes.get(source) {
        Some(decl) => match &decl.name {
            Some(name) => name.clone(),
            None if decl.external => source.to_owned(),
            None => ctx.deployment_id.scoped(source),
        },
        None => source.to_owned(),
    }
}

fn resolve_host_path(source: &str, ctx: &TranslateContext<'_>) -> String {
    if source.starts_with('~') {
        return source.to_owned();
    }
    let path = Path::new(source);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.working_dir.join(path)
    };
    let normalized = normalize_path(&joined);
    if normalized.as_os_str().is_empty() {
        return ".".to_owned();
    }
    // A relative result must still read as a path, not a volume name.
    if normalized.is_relative() && !normalized.starts_with("..") {
        return Path::new(".").join(normalized).to_string_lossy().into_owned();
    }
    normalized.to_string_lossy().into_owned()
}

/// Lexically removes `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
