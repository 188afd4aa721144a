//! Control-channel wire format.
//!
//! Client to provider: 16-byte commands, two little-endian `u64`
//! (`opcode`, `argument`).
//!
//! | Opcode | Command | Argument |
//! |--------|---------|----------|
//! | 0 | REQUEST | 0 |
//! | 1 | FREE | handle |
//! | 2 | FREE_AND_REQUEST | handle |
//!
//! Provider to client: one 64-byte little-endian frame descriptor per
//! request.
//!
//! ```text
//! 0        8          16     20     24      28       32           48           64
//! │ handle │ timestamp│ dim1 │ dim2 │ format│ planes │ offsets[4] │ strides[4] │
//! ```
//!
//! Plane offsets are relative to the handle. Audio formats pack
//! `rate << 8 | channels` into `dim2`.

use crate::clock::Timestamp;
use crate::error::{Error, Result};
use crate::format::{MAX_PLANES, MediaFormat, Plane, Planes};
use crate::sample::Sample;

/// Size of an encoded command.
pub const COMMAND_SIZE: usize = 16;

/// Size of an encoded frame descriptor.
pub const DESCRIPTOR_SIZE: usize = 64;

const OP_REQUEST: u64 = 0;
const OP_FREE: u64 = 1;
const OP_FREE_AND_REQUEST: u64 = 2;

/// Client-to-provider command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for a frame newer than the last one received.
    Request,
    /// Release a held frame.
    Free(u64),
    /// Release a held frame, then ask for a newer one.
    FreeAndRequest(u64),
}

impl Command {
    /// Encode to the 16-byte wire form.
    pub fn encode(&self) -> [u8; COMMAND_SIZE] {
        let (op, arg) = match *self {
            Command::Request => (OP_REQUEST, 0),
            Command::Free(handle) => (OP_FREE, handle),
            Command::FreeAndRequest(handle) => (OP_FREE_AND_REQUEST, handle),
        };
        let mut bytes = [0u8; COMMAND_SIZE];
        bytes[..8].copy_from_slice(&op.to_le_bytes());
        bytes[8..].copy_from_slice(&arg.to_le_bytes());
        bytes
    }

    /// Decode from the wire form; unknown opcodes are protocol errors.
    pub fn decode(bytes: &[u8; COMMAND_SIZE]) -> Result<Self> {
        let op = read_u64(bytes, 0);
        let arg = read_u64(bytes, 8);
        match op {
            OP_REQUEST => Ok(Command::Request),
            OP_FREE => Ok(Command::Free(arg)),
            OP_FREE_AND_REQUEST => Ok(Command::FreeAndRequest(arg)),
            other => Err(Error::Protocol(format!("unknown opcode {}", other))),
        }
    }
}

/// Provider-to-client frame descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// Arena handle of the first byte of the frame's buffer.
    pub handle: u64,
    /// Frame timestamp.
    pub timestamp: Timestamp,
    /// Frame format.
    pub format: MediaFormat,
    /// Planes, offsets relative to `handle`.
    pub planes: Planes,
}

impl FrameDescriptor {
    /// Describe `sample`, whose buffer starts at arena handle `handle`.
    pub fn for_sample(handle: u64, timestamp: Timestamp, sample: &Sample) -> Result<Self> {
        for plane in sample.planes() {
            if u32::try_from(plane.offset).is_err() || u32::try_from(plane.stride).is_err() {
                return Err(Error::InvalidArgument(format!(
                    "plane {:?} does not fit the 32-bit descriptor fields",
                    plane
                )));
            }
        }
        Ok(Self {
            handle,
            timestamp,
            format: *sample.format(),
            planes: sample.planes().iter().copied().collect(),
        })
    }

    /// Bytes from `handle` the client must be able to read.
    pub fn required_len(&self) -> Result<usize> {
        self.format.required_len(&self.planes)
    }

    /// Encode to the 64-byte wire form.
    pub fn encode(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        let (dim1, dim2) = self.format.wire_dims();
        bytes[0..8].copy_from_slice(&self.handle.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.timestamp.micros().to_le_bytes());
        bytes[16..20].copy_from_slice(&dim1.to_le_bytes());
        bytes[20..24].copy_from_slice(&dim2.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.format.code().to_le_bytes());
        bytes[28..32].copy_from_slice(&(self.planes.len() as u32).to_le_bytes());
        for (i, plane) in self.planes.iter().take(MAX_PLANES).enumerate() {
            let offset = 32 + i * 4;
            let stride = 48 + i * 4;
            bytes[offset..offset + 4].copy_from_slice(&(plane.offset as u32).to_le_bytes());
            bytes[stride..stride + 4].copy_from_slice(&(plane.stride as u32).to_le_bytes());
        }
        bytes
    }

    /// Decode from the wire form.
    ///
    /// Fails with [`Error::Protocol`] on unknown format codes and on plane
    /// counts that disagree with the format.
    pub fn decode(bytes: &[u8; DESCRIPTOR_SIZE]) -> Result<Self> {
        let handle = read_u64(bytes, 0);
        let timestamp = Timestamp::from_micros(read_u64(bytes, 8) as i64);
        let dim1 = read_u32(bytes, 16);
        let dim2 = read_u32(bytes, 20);
        let format = MediaFormat::from_wire(read_u32(bytes, 24), dim1, dim2)?;
        format
            .validate()
            .map_err(|e| Error::Protocol(format!("invalid format in descriptor: {}", e)))?;

        let plane_count = read_u32(bytes, 28) as usize;
        if plane_count == 0 || plane_count > MAX_PLANES || plane_count != format.plane_count() {
            return Err(Error::Protocol(format!(
                "descriptor carries {} planes for {}",
                plane_count, format
            )));
        }
        let planes = (0..plane_count)
            .map(|i| {
                Plane::new(
                    read_u32(bytes, 32 + i * 4) as usize,
                    read_u32(bytes, 48 + i * 4) as usize,
                )
            })
            .collect();

        Ok(Self {
            handle,
            timestamp,
            format,
            planes,
        })
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}
