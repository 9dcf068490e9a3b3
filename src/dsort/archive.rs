//! Tar codec for shards: records in, records out.

use std::io::Read;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SortError, StoreError};

/// Reads every regular-file entry of `bytes` as `(entry path, content)`.
///
/// Checks `cancel` before each entry.
pub fn read_records(
    shard: &str,
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<Vec<(String, Vec<u8>)>> {
    let io_err = |e: std::io::Error| SortError::from(StoreError::io(shard, e));

    let mut archive = tar::Archive::new(bytes);
    let mut records = Vec::new();

    for entry in archive.entries().map_err(io_err)? {
        if cancel.is_cancelled() {
            return Err(SortError::Aborted);
        }
        let mut entry = entry.map_err(io_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path().map_err(io_err)?.to_string_lossy().to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data).map_err(io_err)?;
        records.push((path, data));
    }

    Ok(records)
}

/// Builds a complete tar archive in memory. Nothing is returned if cancelled midway.
pub fn write_archive(
    shard: &str,
    records: &[(&str, &[u8])],
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for (key, data) in records {
        if cancel.is_cancelled() {
            return Err(SortError::Aborted);
        }
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, key, *data)
            .map_err(|e| SortError::partial_write(shard, e))?;
    }

    builder
        .into_inner()
        .map_err(|e| SortError::partial_write(shard, e))
}
