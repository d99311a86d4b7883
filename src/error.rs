use std::path::PathBuf;

/// Everything that can go wrong while discovering, loading or validating a plugin.
///
/// Only [`PluginError::Unsupported`] is fatal; every other variant is reported
/// and the affected file is skipped.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{} could not be loaded: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    #[error("{} is not a valid kiln plugin", .path.display())]
    InvalidPlugin { path: PathBuf },

    #[error(
        "{} is not compatible with this version of kiln (plugin ABI {found}, supported {min}..={max})",
        .path.display()
    )]
    IncompatibleVersion {
        path: PathBuf,
        found: u32,
        min: u32,
        max: u32,
    },

    #[error("{} failed to initialize", .path.display())]
    Initialization { path: PathBuf },

    #[error("unable to stat {}: {source}", .path.display())]
    ScanStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dynamic library loading is not supported on this platform")]
    Unsupported,
}

impl PluginError {
    /// Path of the file the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            PluginError::Load { path, .. }
            | PluginError::InvalidPlugin { path }
            | PluginError::IncompatibleVersion { path, .. }
            | PluginError::Initialization { path }
            | PluginError::ScanStat { path, .. } => Some(path),
            PluginError::Unsupported => None,
        }
    }
}
