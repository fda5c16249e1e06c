use std::io;

use bincode::{DefaultOptions, Options as _};
use fault_injection::annotate;
use lazy_static::lazy_static;
use serde::{de::DeserializeOwned, Serialize};

lazy_static! {
    static ref BINCODE: DefaultOptions = DefaultOptions::new();
}

const COMPLETE_BIT: u8 = 1;
const MODIFIED_BIT: u8 = 1 << 1;

/// The opaque handle that `IntentLog::get` passes through to
/// the overflow tier so that spilled pages can be decoded. The
/// log itself never calls it.
pub trait PageReader<P> {
    fn deserialize_page(&self, bytes: &[u8]) -> io::Result<P>;
}

/// Decodes pages that were spilled with their serde
/// `Serialize` implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeReader;

impl<P: DeserializeOwned> PageReader<P> for BincodeReader {
    fn deserialize_page(&self, bytes: &[u8]) -> io::Result<P> {
        BINCODE.deserialize(bytes).map_err(|e| {
            annotate!(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize spilled page: {}", e)
            ))
        })
    }
}

/// The page versions logged for a single `PageReference`:
/// the complete page, and the modified page that the
/// transaction writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContainer<P> {
    pub complete: Option<P>,
    pub modified: Option<P>,
}

impl<P> Default for PageContainer<P> {
    fn default() -> PageContainer<P> {
        PageContainer::EMPTY
    }
}

impl<P> PageContainer<P> {
    /// A container without any pages. The overflow tier returns
    /// it for slots that have been tombstoned, and the log
    /// treats it like a miss.
    pub const EMPTY: PageContainer<P> = PageContainer {
        complete: None,
        modified: None,
    };

    pub fn new(complete: P, modified: P) -> PageContainer<P> {
        PageContainer {
            complete: Some(complete),
            modified: Some(modified),
        }
    }

    pub fn complete(&self) -> Option<&P> {
        self.complete.as_ref()
    }

    pub fn modified(&self) -> Option<&P> {
        self.modified.as_ref()
    }

    pub fn modified_mut(&mut self) -> Option<&mut P> {
        self.modified.as_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.complete.is_none() && self.modified.is_none()
    }
}

impl<P: Serialize> PageContainer<P> {
    /// flag byte, then a little-endian length and the bincode
    /// bytes for each present page, complete first.
    pub(crate) fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut flags = 0;
        if self.complete.is_some() {
            flags |= COMPLETE_BIT;
        }
        if self.modified.is_some() {
            flags |= MODIFIED_BIT;
        }

        let mut buf = vec![flags];

        for page in [&self.complete, &self.modified].into_iter().flatten() {
            let page_bytes = BINCODE.serialize(page).map_err(|e| {
                annotate!(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("failed to serialize page for spilling: {}", e)
                ))
            })?;
            buf.extend_from_slice(&(page_bytes.len() as u64).to_le_bytes());
            buf.extend_from_slice(&page_bytes);
        }

        Ok(buf)
    }
}

impl<P> PageContainer<P> {
    pub(crate) fn deserialize<R: PageReader<P> + ?Sized>(
        buf: &[u8],
        reader: &R,
    ) -> io::Result<PageContainer<P>> {
        let (flags, mut rest) = match buf.split_first() {
            Some((flags, rest)) => (*flags, rest),
            None => return Err(corrupted("container body is empty")),
        };

        if flags & !(COMPLETE_BIT | MODIFIED_BIT) != 0 {
            return Err(corrupted("unknown container flags"));
        }

        let mut container = PageContainer::EMPTY;

        if flags & COMPLETE_BIT != 0 {
            let (page_bytes, tail) = split_page(rest)?;
            container.complete = Some(reader.deserialize_page(page_bytes)?);
            rest = tail;
        }

        if flags & MODIFIED_BIT != 0 {
            let (page_bytes, tail) = split_page(rest)?;
            container.modified = Some(reader.deserialize_page(page_bytes)?);
            rest = tail;
        }

        if !rest.is_empty() {
            return Err(corrupted("trailing bytes after container body"));
        }

        Ok(container)
    }
}

fn split_page(buf: &[u8]) -> io::Result<(&[u8], &[u8])> {
    if buf.len() < 8 {
        return Err(corrupted("truncated page length"));
    }

    let (len_buf, rest) = buf.split_at(8);
    let len = u64::from_le_bytes(len_buf.try_into().unwrap());

    match usize::try_from(len) {
        Ok(len) if len <= rest.len() => Ok(rest.split_at(len)),
        _ => Err(corrupted("page length exceeds container body")),
    }
}

fn corrupted(msg: &str) -> io::Error {
    annotate!(io::Error::new(io::ErrorKind::InvalidData, msg))
}
