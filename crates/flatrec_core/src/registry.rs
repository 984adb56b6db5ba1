//! The fixed table of logical files.

use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// A logical file kind.
///
/// The set is closed: every kind maps to exactly one [`FileDescriptor`]
/// in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    /// Per-channel charger state.
    ChannelInfo,
    /// Registered users.
    UserTable,
    /// Battery pack table.
    PackTable,
    /// Packs waiting to be charged.
    QueueToCharge,
    /// Packs that finished charging.
    QueueCharged,
    /// Hub-level key/value properties.
    HubProperties,
    /// Offerings catalogue.
    Offerings,
    /// Published message history.
    PublishHistory,
    /// Registry of publish slots.
    PublishRegistry,
    /// Messages waiting to be published.
    PublishBacklog,
    /// Generic stored strings.
    StoredStrings,
    /// Scratch file for rewrites and swaps.
    TempFile,
    /// Downloaded firmware image.
    FirmwareImage,
}

impl FileKind {
    /// Every kind, in registry order.
    pub const ALL: [Self; 13] = [
        Self::ChannelInfo,
        Self::UserTable,
        Self::PackTable,
        Self::QueueToCharge,
        Self::QueueCharged,
        Self::HubProperties,
        Self::Offerings,
        Self::PublishHistory,
        Self::PublishRegistry,
        Self::PublishBacklog,
        Self::StoredStrings,
        Self::TempFile,
        Self::FirmwareImage,
    ];

    /// Returns the kind's position in registry order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the kebab-case name used on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChannelInfo => "channel-info",
            Self::UserTable => "user-table",
            Self::PackTable => "pack-table",
            Self::QueueToCharge => "queue-to-charge",
            Self::QueueCharged => "queue-charged",
            Self::HubProperties => "hub-properties",
            Self::Offerings => "offerings",
            Self::PublishHistory => "publish-history",
            Self::PublishRegistry => "publish-registry",
            Self::PublishBacklog => "publish-backlog",
            Self::StoredStrings => "stored-strings",
            Self::TempFile => "temp-file",
            Self::FirmwareImage => "firmware-image",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::invalid_argument(format!("unknown file kind: {s}")))
    }
}

/// Static description of one logical file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// File name on the volume root.
    pub name: String,
    /// Hint that all entries share one byte length.
    pub fixed_width: bool,
}

impl FileDescriptor {
    /// Creates a descriptor.
    pub fn new(name: impl Into<String>, fixed_width: bool) -> Self {
        Self {
            name: name.into(),
            fixed_width,
        }
    }
}

/// Maps each [`FileKind`] to its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    descriptors: Vec<FileDescriptor>,
}

impl Default for Registry {
    fn default() -> Self {
        let table = [
            ("channelInfo.csv", true),
            ("userTable.csv", true),
            ("packTable.csv", true),
            ("queueToCharge.csv", true),
            ("queueCharged.csv", true),
            ("hubProperties.csv", false),
            ("offerings.csv", false),
            ("publishHistory.csv", false),
            ("publishRegistry.csv", true),
            ("publishBacklog.csv", true),
            ("strings.csv", false),
            ("temp.csv", false),
            ("firmware.hex", false),
        ];
        Self {
            descriptors: table
                .into_iter()
                .map(|(name, fixed_width)| FileDescriptor::new(name, fixed_width))
                .collect(),
        }
    }
}

impl Registry {
    /// Returns the descriptor for `kind`.
    #[must_use]
    pub fn descriptor(&self, kind: FileKind) -> &FileDescriptor {
        &self.descriptors[kind.index()]
    }

    /// Returns the file name for `kind`.
    #[must_use]
    pub fn name(&self, kind: FileKind) -> &str {
        &self.descriptor(kind).name
    }

    /// Replaces the descriptor for `kind`.
    #[must_use]
    pub fn with_descriptor(mut self, kind: FileKind, descriptor: FileDescriptor) -> Self {
        self.descriptors[kind.index()] = descriptor;
        self
    }

    /// Iterates over every kind and its descriptor in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (FileKind, &FileDescriptor)> {
        FileKind::ALL.into_iter().zip(self.descriptors.iter())
    }

    /// Checks that names are non-empty, flat, and unique.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] naming the first bad entry.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (kind, descriptor) in self.iter() {
            if descriptor.name.is_empty() || descriptor.name.contains('/') {
                return Err(CoreError::invalid_argument(format!(
                    "bad file name for {kind}: {:?}",
                    descriptor.name
                )));
            }
            if self
                .iter()
                .any(|(other, d)| other != kind && d.name == descriptor.name)
            {
                return Err(CoreError::invalid_argument(format!(
                    "duplicate file name {}",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid() {
        let registry = Registry::default();
        registry.validate().unwrap();
        assert_eq!(registry.name(FileKind::UserTable), "userTable.csv");
        assert!(registry.descriptor(FileKind::ChannelInfo).fixed_width);
        assert!(!registry.descriptor(FileKind::StoredStrings).fixed_width);
        assert_eq!(registry.iter().count(), FileKind::ALL.len());
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in FileKind::ALL {
            assert_eq!(kind.as_str().parse::<FileKind>().unwrap(), kind);
        }
        assert!("nope".parse::<FileKind>().is_err());
    }

    #[test]
    fn override_descriptor() {
        let registry = Registry::default()
            .with_descriptor(FileKind::TempFile, FileDescriptor::new("scratch.csv", true));
        assert_eq!(registry.name(FileKind::TempFile), "scratch.csv");
        assert!(registry.descriptor(FileKind::TempFile).fixed_width);
    }

    #[test]
    fn duplicate_names_rejected() {
        let registry = Registry::default()
            .with_descriptor(FileKind::TempFile, FileDescriptor::new("strings.csv", false));
        assert!(registry.validate().is_err());
    }

    #[test]
    fn nested_names_rejected() {
        let registry = Registry::default()
            .with_descriptor(FileKind::TempFile, FileDescriptor::new("a/b.csv", false));
        assert!(registry.validate().is_err());
    }
}
