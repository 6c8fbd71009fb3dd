//! Checkpoint manifest: the list of per-operator state files that make
//! up one epoch's checkpoint, with a trailing CRC-32 over the encoded
//! contents (§4.8, §6 "Persisted layout").

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

pub const MANIFEST_VERSION: u16 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub op_id: u64,
    pub file: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub version: u16,
    pub epoch: u64,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(epoch: u64, entries: Vec<ManifestEntry>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            epoch,
            entries,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.epoch.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            out.extend_from_slice(&e.op_id.to_le_bytes());
            let name = e.file.as_bytes();
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name);
            out.extend_from_slice(&e.size.to_le_bytes());
        }
        out
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = self.encode_body();
        let crc = crc32fast::hash(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::Serialization("manifest too short".into()));
        }
        let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        let found = crc32fast::hash(body);
        if found != expected {
            return Err(Error::CrcMismatch { expected, found });
        }

        let mut pos = 0usize;
        let version = read_u16(body, &mut pos)?;
        let epoch = read_u64(body, &mut pos)?;
        let count = read_u32(body, &mut pos)? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let op_id = read_u64(body, &mut pos)?;
            let name_len = read_u32(body, &mut pos)? as usize;
            let name = read_bytes(body, &mut pos, name_len)?;
            let file = String::from_utf8(name.to_vec())
                .map_err(|e| Error::Serialization(e.to_string()))?;
            let size = read_u64(body, &mut pos)?;
            entries.push(ManifestEntry { op_id, file, size });
        }
        Ok(Manifest { version, epoch, entries })
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.encode())?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}

fn read_bytes<'a>(body: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).ok_or_else(|| Error::Serialization("manifest overflow".into()))?;
    let slice = body
        .get(*pos..end)
        .ok_or_else(|| Error::Serialization("manifest truncated".into()))?;
    *pos = end;
    Ok(slice)
}

fn read_u16(body: &[u8], pos: &mut usize) -> Result<u16> {
    Ok(u16::from_le_bytes(read_bytes(body, pos, 2)?.try_into().unwrap()))
}

fn read_u32(body: &[u8], pos: &mut usize) -> Result<u32> {
    Ok(u32::from_le_bytes(read_bytes(body, pos, 4)?.try_into().unwrap()))
}

fn read_u64(body: &[u8], pos: &mut usize) -> Result<u64> {
    Ok(u64::from_le_bytes(read_bytes(body, pos, 8)?.try_into().unwrap()))
}
