//! On-disk archive format for filters that have aged out of the current
//! slot: `{lo}.filter` files under the configured archive directory.
//!
//! Each file is `[lo: i64][hi: i64][k: u32][m: u64][bits...]`, little
//! endian, written to a temp file in the same directory and renamed into
//! place so a reader never observes a partial write.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const RECORD_HEADER_LEN: usize = 8 + 8 + 4 + 8;

pub struct FilterRecord {
    pub lo: i64,
    pub hi: i64,
    pub k: u32,
    pub m: u64,
    pub bits: Vec<u8>,
}

fn file_name(lo: i64) -> String {
    format!("{lo}.filter")
}

pub fn write_atomic(dir: &Path, rec: &FilterRecord) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&rec.lo.to_le_bytes())?;
    tmp.write_all(&rec.hi.to_le_bytes())?;
    tmp.write_all(&rec.k.to_le_bytes())?;
    tmp.write_all(&rec.m.to_le_bytes())?;
    tmp.write_all(&rec.bits)?;
    tmp.flush()?;
    tmp.persist(dir.join(file_name(rec.lo)))
        .map_err(|e| e.error)?;
    Ok(())
}

pub fn read(path: &Path) -> io::Result<FilterRecord> {
    let mut buf = Vec::new();
    fs::File::open(path)?.read_to_end(&mut buf)?;
    if buf.len() < RECORD_HEADER_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated filter record"));
    }
    let lo = i64::from_le_bytes(buf[0..8].try_into().unwrap());
    let hi = i64::from_le_bytes(buf[8..16].try_into().unwrap());
    let k = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    let m = u64::from_le_bytes(buf[20..28].try_into().unwrap());
    let bits = buf[RECORD_HEADER_LEN..].to_vec();
    let expected_bytes = ((m + 7) / 8) as usize;
    if bits.len() != expected_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "filter record bit length does not match its own header",
        ));
    }
    Ok(FilterRecord { lo, hi, k, m, bits })
}

pub fn delete(dir: &Path, lo: i64) -> io::Result<()> {
    match fs::remove_file(dir.join(file_name(lo))) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Lists `*.filter` files in `dir`, parsed as `(lo, path)`. Entries whose
/// file stem does not parse as an `i64` are deleted on sight: they cannot
/// be recovery candidates under this format.
pub fn list_files(dir: &Path) -> io::Result<Vec<(i64, PathBuf)>> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("filter") {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str());
        match stem.and_then(|s| s.parse::<i64>().ok()) {
            Some(lo) => out.push((lo, path)),
            None => {
                tracing::warn!(path = %path.display(), "unparseable archive file name, removing");
                let _ = fs::remove_file(&path);
            }
        }
    }
    Ok(out)
}
