//! Identifiers and kinds for the provider resources a backup touches.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use thiserror::Error;

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(String);

        impl $name {
            /// Wraps a provider-assigned identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

newtype!(
    /// Provider identifier of a block-storage volume attached to a VM.
    VolumeId
);
newtype!(
    /// Provider identifier of a temporary snapshot, volume, or image.
    ResourceId
);

/// Kind of temporary resource created while exporting a volume.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    /// Point-in-time snapshot of the source volume.
    Snapshot,
    /// Volume cloned from the snapshot, used as the export source.
    Volume,
    /// Image uploaded from the cloned volume.
    Image,
}

impl ResourceKind {
    /// Status the provider reports once the resource is usable.
    #[must_use]
    pub const fn ready_status(self) -> &'static str {
        match self {
            Self::Snapshot | Self::Volume => "available",
            Self::Image => "active",
        }
    }

    /// Statuses from which the resource never reaches its ready status.
    #[must_use]
    pub const fn failure_statuses(self) -> &'static [&'static str] {
        match self {
            Self::Snapshot | Self::Volume => &["error"],
            Self::Image => &["error", "killed"],
        }
    }

    /// Returns `true` when `status` is terminal for this kind.
    #[must_use]
    pub fn is_failure_status(self, status: &str) -> bool {
        self.failure_statuses()
            .iter()
            .any(|failed| failed.eq_ignore_ascii_case(status))
    }

    /// Lower-case name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Volume => "volume",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider resource owned by a single volume pipeline invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemporaryResource {
    /// What kind of resource this is.
    pub kind: ResourceKind,
    /// Provider-assigned identifier.
    pub id: ResourceId,
    /// Source volume whose export created this resource.
    pub volume: VolumeId,
}

impl TemporaryResource {
    /// Creates a resource record.
    #[must_use]
    pub const fn new(kind: ResourceKind, id: ResourceId, volume: VolumeId) -> Self {
        Self { kind, id, volume }
    }
}

/// Disk image formats the image service can export.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DiskFormat {
    /// QEMU copy-on-write v2.
    #[default]
    Qcow2,
    /// Raw block image.
    Raw,
    /// `VMware` disk.
    Vmdk,
    /// `VirtualBox` disk.
    Vdi,
}

impl DiskFormat {
    /// All supported formats, in the order they are documented.
    pub const ALL: [Self; 4] = [Self::Qcow2, Self::Raw, Self::Vmdk, Self::Vdi];

    /// Name understood by the image service; also the file extension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qcow2 => "qcow2",
            Self::Raw => "raw",
            Self::Vmdk => "vmdk",
            Self::Vdi => "vdi",
        }
    }
}

impl fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a disk format name is not supported.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid disk format: {0} (supported: qcow2, raw, vmdk, vdi)")]
pub struct UnsupportedDiskFormat(pub String);

impl FromStr for DiskFormat {
    type Err = UnsupportedDiskFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnsupportedDiskFormat(wanted.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("qcow2", DiskFormat::Qcow2)]
    #[case(" RAW ", DiskFormat::Raw)]
    #[case("vmdk", DiskFormat::Vmdk)]
    #[case("vdi", DiskFormat::Vdi)]
    fn disk_format_parses_supported_names(#[case] raw: &str, #[case] expected: DiskFormat) {
        assert_eq!(raw.parse::<DiskFormat>(), Ok(expected));
    }

    #[test]
    fn disk_format_rejects_unknown_names() {
        let err = "vhd".parse::<DiskFormat>().expect_err("vhd is unsupported");
        assert!(err.to_string().contains("vhd"), "unexpected message: {err}");
    }

    #[rstest]
    #[case(ResourceKind::Snapshot, "error", true)]
    #[case(ResourceKind::Volume, "ERROR", true)]
    #[case(ResourceKind::Volume, "killed", false)]
    #[case(ResourceKind::Image, "killed", true)]
    #[case(ResourceKind::Image, "queued", false)]
    fn failure_statuses_depend_on_kind(
        #[case] kind: ResourceKind,
        #[case] status: &str,
        #[case] terminal: bool,
    ) {
        assert_eq!(kind.is_failure_status(status), terminal);
    }
}
