//! Write-ahead log of epoch boundaries (§4.8, §6 "Persisted layout").
//!
//! Each record is `{tag: u8, epoch: u64, crc32: u32}`, length-prefixed.
//! The writer fsyncs after every append; the reader tolerates a partial
//! trailing record left by a crash mid-write by stopping there instead
//! of erroring.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::Path;

pub const BEGIN_EPOCH: u8 = 1;
pub const END_EPOCH: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalRecord {
    pub tag: u8,
    pub epoch: u64,
}

impl WalRecord {
    fn encode(self) -> Vec<u8> {
        let mut body = Vec::with_capacity(9);
        body.push(self.tag);
        body.extend_from_slice(&self.epoch.to_le_bytes());
        let crc = crc32fast::hash(&body);

        let mut out = Vec::with_capacity(4 + body.len() + 4);
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }
}

pub struct WalWriter {
    file: File,
}

impl WalWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn append(&mut self, tag: u8, epoch: u64) -> Result<()> {
        let record = WalRecord { tag, epoch }.encode();
        self.file.write_all(&record)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn begin_epoch(&mut self, epoch: u64) -> Result<()> {
        self.append(BEGIN_EPOCH, epoch)
    }

    pub fn end_epoch(&mut self, epoch: u64) -> Result<()> {
        self.append(END_EPOCH, epoch)
    }
}

/// Reads every complete, CRC-valid record from the WAL at `path`. A
/// truncated or corrupt trailing record is silently dropped rather than
/// treated as an error — it is the signature of a crash mid-append.
pub fn read_all(path: &Path) -> Result<Vec<WalRecord>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::StorageIo(e)),
    };
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();

    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len < 4 {
            break;
        }
        let mut rest = vec![0u8; len];
        if reader.read_exact(&mut rest).is_err() {
            break;
        }
        let (body, crc_bytes) = rest.split_at(len - 4);
        let expected_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        if crc32fast::hash(body) != expected_crc || body.len() != 9 {
            break;
        }
        records.push(WalRecord {
            tag: body[0],
            epoch: u64::from_le_bytes(body[1..9].try_into().unwrap()),
        });
    }
    Ok(records)
}
