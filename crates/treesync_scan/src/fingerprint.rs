//! Content fingerprints: `(size, mtime, sparse checksum)`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Summary of a file's content. Equality implies identical content with
/// overwhelming probability without reading the whole file: four CRC32
/// words are taken over the head, two middle offsets, and the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime: i64,
    pub checksum: [u32; 4],
}

const SAMPLE_LEN: u64 = 4096;

/// Computes a fingerprint by sampling the file's content. Returns `Ok(None)`
/// for zero-length files (checksum of nothing is defined as all-zero).
pub fn compute(path: &Path, size: u64, mtime: i64) -> std::io::Result<Fingerprint> {
    if size == 0 {
        return Ok(Fingerprint {
            size,
            mtime,
            checksum: [0; 4],
        });
    }
    let mut file = File::open(path)?;
    let head = read_sample(&mut file, 0, size)?;
    let mid1 = read_sample(&mut file, size / 3, size)?;
    let mid2 = read_sample(&mut file, (size * 2) / 3, size)?;
    let tail = read_sample(&mut file, size.saturating_sub(SAMPLE_LEN), size)?;

    Ok(Fingerprint {
        size,
        mtime,
        checksum: [
            crc32fast::hash(&head),
            crc32fast::hash(&mid1),
            crc32fast::hash(&mid2),
            crc32fast::hash(&tail),
        ],
    })
}

fn read_sample(file: &mut File, offset: u64, size: u64) -> std::io::Result<Vec<u8>> {
    let len = SAMPLE_LEN.min(size.saturating_sub(offset)) as usize;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}
