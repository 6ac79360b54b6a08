//! File chunking -- the transport's two file-system touch points.
//!
//! The sender reads the whole file up front and slices it into chunks of at
//! most [`CHUNK_SIZE`] bytes; the receiver writes delivered chunks back out
//! in order.

use std::path::Path;

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{FerryError, Result};
use crate::packet::CHUNK_SIZE;

/// Read `path` into an ordered list of chunks of at most `CHUNK_SIZE` bytes.
///
/// The file is buffered in memory; chunks are zero-copy slices of it.
pub async fn read_chunks(path: &Path) -> Result<Vec<Bytes>> {
    let data = match fs::read(path).await {
        Ok(data) => Bytes::from(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FerryError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut chunks = Vec::with_capacity(data.len().div_ceil(CHUNK_SIZE));
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    Ok(chunks)
}

/// Write `chunks` to `path` in order, replacing any existing file.
pub async fn write_chunks(path: &Path, chunks: &[Bytes]) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    for chunk in chunks {
        file.write_all(chunk).await?;
    }
    file.flush().await?;
    Ok(())
}
