use std::io;
use std::path::PathBuf;

use crate::{IntentLog, OverflowStore};

/// Configuration for opening an `IntentLog`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Spill files for the overflow tier will be kept here.
    /// The directory is created if it does not exist yet.
    pub path: PathBuf,
    /// The maximum number of entries kept in memory. Logging
    /// more than this many pages spills the least recently
    /// inserted ones to the overflow tier.
    pub capacity: usize,
    /// The ceiling on the serialized size of a single page
    /// container. Spilling a larger container fails.
    pub max_container_size: usize,
    /// Issue an fsync after every spilled container. The
    /// overflow tier is never recovered, so this is only
    /// useful to bound dirty page cache pressure.
    pub fsync_each_spill: bool,
    /// Compress spilled containers with zstd at this level.
    pub zstd_compression_level: Option<i32>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            path: std::env::temp_dir().join("intent_log"),
            capacity: 8192,
            max_container_size: 256 * 1024 * 1024, // 256mb
            fsync_each_spill: false,
            zstd_compression_level: None,
        }
    }
}

impl Config {
    /// Validate this configuration, open a fresh overflow
    /// store under `path` and return an empty log.
    pub fn open<P>(&self) -> io::Result<IntentLog<P>> {
        self.validate()?;

        let overflow = OverflowStore::open(self)?;

        Ok(IntentLog::from_parts(self.clone(), overflow))
    }

    pub(crate) fn validate(&self) -> io::Result<()> {
        if self.capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Config's capacity must be non-zero",
            ));
        }

        // every resident entry holds a distinct log key
        if self.capacity > i32::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "Config's capacity of {} is larger than the {} log keys a \
                     transaction can hand out",
                    self.capacity,
                    i32::MAX
                ),
            ));
        }

        if self.max_container_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Config's max_container_size must be non-zero",
            ));
        }

        if let Some(level) = self.zstd_compression_level {
            let max_level = zstd_safe::max_c_level();
            if level > max_level {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!(
                        "Config's zstd_compression_level of {} is higher than the maximum \
                         supported level of {}",
                        level, max_level
                    ),
                ));
            }
        }

        Ok(())
    }
}
