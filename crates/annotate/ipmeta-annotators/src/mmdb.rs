//! Shared MaxMind database reader handle.

use ipmeta_error::AnnotateError;
use maxminddb::MaxMindDBError;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

/// How to open the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MmdbMode {
    /// Memory-map the file.
    #[default]
    Mmap,
    /// Read the whole file into memory.
    Memory,
}

impl MmdbMode {
    /// Parse the mode from its flag value.
    pub fn parse(raw: &str) -> Result<Self, AnnotateError> {
        match raw {
            "mmap" => Ok(Self::Mmap),
            "memory" => Ok(Self::Memory),
            other => Err(AnnotateError::Config(format!(
                "invalid database open mode {other:?} (expected mmap or memory)"
            ))),
        }
    }
}

/// An opened MMDB, queried concurrently by all workers of an adapter.
pub enum MmdbReader {
    Memory(maxminddb::Reader<Vec<u8>>),
    Mmap(maxminddb::Reader<maxminddb::Mmap>),
}

impl MmdbReader {
    /// Open and validate a database file.
    ///
    /// A successful open has parsed the metadata section; that is the
    /// startup integrity check.
    pub fn open(path: &Path, mode: MmdbMode) -> Result<Self, AnnotateError> {
        let reader = match mode {
            MmdbMode::Memory => {
                let bytes = std::fs::read(path).map_err(|e| {
                    AnnotateError::Database(format!("{}: {e}", path.display()))
                })?;
                Self::Memory(maxminddb::Reader::from_source(bytes).map_err(|e| {
                    AnnotateError::Database(format!("{}: {e}", path.display()))
                })?)
            }
            MmdbMode::Mmap => Self::Mmap(maxminddb::Reader::open_mmap(path).map_err(|e| {
                AnnotateError::Database(format!("{}: {e}", path.display()))
            })?),
        };

        let metadata = reader.metadata();
        info!(
            path = %path.display(),
            database_type = %metadata.database_type,
            build_epoch = metadata.build_epoch,
            "opened MMDB"
        );
        Ok(reader)
    }

    /// Point lookup for one IP.
    pub fn lookup<'a, T: Deserialize<'a>>(&'a self, ip: IpAddr) -> Result<T, MaxMindDBError> {
        match self {
            Self::Memory(reader) => reader.lookup(ip),
            Self::Mmap(reader) => reader.lookup(ip),
        }
    }

    fn metadata(&self) -> &maxminddb::Metadata {
        match self {
            Self::Memory(reader) => &reader.metadata,
            Self::Mmap(reader) => &reader.metadata,
        }
    }
}

/// Whether a lookup error just means the address is absent from the DB.
pub(crate) fn is_not_found(error: &MaxMindDBError) -> bool {
    matches!(error, MaxMindDBError::AddressNotFoundError(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(MmdbMode::parse("mmap").unwrap(), MmdbMode::Mmap);
        assert_eq!(MmdbMode::parse("memory").unwrap(), MmdbMode::Memory);
        assert!(MmdbMode::parse("disk").is_err());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let err = MmdbReader::open(Path::new("/nonexistent/asn.mmdb"), MmdbMode::Memory)
            .err()
            .expect("open should fail");
        assert!(matches!(err, AnnotateError::Database(_)));
    }
}
