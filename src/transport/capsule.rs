//! NVMe-oF capsule wire layouts: the 64 B command (submission queue entry),
//! the 16 B completion (completion queue entry), and the keyed/data-block
//! SGL descriptor carried in the command's single SGL slot.

use std::mem;

use super::error::NvmeStatusCode;

/// Size of an NVMe submission-queue entry, i.e. a command capsule.
pub const CAPSULE_HEADER_SIZE: usize = mem::size_of::<CommandCapsule>();

/// Size of an NVMe completion-queue entry.
pub const COMPLETION_SIZE: usize = mem::size_of::<CompletionCapsule>();

/// SGL descriptor type, occupying the high nibble of the descriptor's type
/// byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SglDescriptorType {
    /// Keyed data block: remote virtual address + rkey, for one-sided RDMA.
    KeyedDataBlock,
    /// Data block: either in-capsule (subtype `Offset`) or otherwise inline.
    DataBlock,
    /// Anything this transport does not implement.
    Other(u8),
}

/// SGL descriptor subtype, occupying the low nibble of the type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SglDescriptorSubtype {
    Address,
    Offset,
    InvalidateKey,
    Other(u8),
}

impl SglDescriptorType {
    fn from_nibble(n: u8) -> Self {
        match n {
            0x4 => SglDescriptorType::KeyedDataBlock,
            0x0 => SglDescriptorType::DataBlock,
            other => SglDescriptorType::Other(other),
        }
    }
}

impl SglDescriptorSubtype {
    fn from_nibble(n: u8) -> Self {
        match n {
            0x0 => SglDescriptorSubtype::Address,
            0x1 => SglDescriptorSubtype::Offset,
            0x2 => SglDescriptorSubtype::InvalidateKey,
            other => SglDescriptorSubtype::Other(other),
        }
    }
}

/// The single SGL descriptor embedded in a command capsule's DPTR field.
///
/// Wire layout (16 bytes): `address` (8 B), reserved (3 B), `subtype` +
/// `type` packed into the low/high nibbles of one byte, then `length` (4 B)
/// and `key` (4 B) for the keyed form (the data-block/offset form reuses
/// the same field positions, with `address` read as an in-capsule offset
/// and `key` unused).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SglDescriptor {
    pub address: u64,
    pub length: u32,
    pub key: u32,
    pub type_and_subtype: u8,
    _reserved: [u8; 3],
}

impl SglDescriptor {
    pub fn ty(&self) -> SglDescriptorType {
        SglDescriptorType::from_nibble(self.type_and_subtype >> 4)
    }

    pub fn subtype(&self) -> SglDescriptorSubtype {
        SglDescriptorSubtype::from_nibble(self.type_and_subtype & 0x0F)
    }
}

/// A 64-byte NVMe-oF command capsule (submission queue entry).
///
/// Only the fields the transport itself reads or writes are named; the
/// remaining command-specific bytes (`cdw10`..`cdw15`) are opaque to the
/// transport and pass through to the (out-of-scope) executor untouched.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCapsule {
    pub opcode: u8,
    pub flags: u8,
    pub cid: u16,
    pub nsid: u32,
    _reserved0: [u8; 8],
    pub mptr: u64,
    pub sgl: SglDescriptor,
    pub cdw10: [u32; 6],
}

const _: () = assert!(mem::size_of::<CommandCapsule>() == 64);

/// A 16-byte NVMe-oF completion capsule (completion queue entry).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionCapsule {
    pub cdw0: u32,
    _reserved: u32,
    pub sqhd: u16,
    pub sqid: u16,
    pub cid: u16,
    pub status: u16,
}

const _: () = assert!(mem::size_of::<CompletionCapsule>() == 16);

impl CompletionCapsule {
    /// Reset to an all-success completion for request `cid`.
    pub fn reset(&mut self, cid: u16) {
        *self = CompletionCapsule {
            cid,
            ..Default::default()
        };
    }

    /// Set the status code, leaving the "do not retry"/"more" phase bits at
    /// their default (success-shaped) values.
    pub fn set_status(&mut self, sc: NvmeStatusCode) {
        self.status = (sc as u16) << 1;
    }
}

/// Outcome of parsing a command capsule's SGL descriptor, per §4.C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// No data transfer: zero-length SGL, or a failed parse.
    None,
    /// Host-to-controller: an incoming write, requiring RDMA Read to pull
    /// the payload from the host before execution.
    HostToCtrl,
    /// Controller-to-host: an outgoing read, requiring RDMA Write to push
    /// the payload to the host after execution.
    CtrlToHost,
}

/// Result of [`parse_sgl`]: where the payload lives and how large it is.
#[derive(Debug, Clone, Copy)]
pub enum ParsedSgl {
    /// No payload (length 0, or capsule carries no data).
    Empty,
    /// Payload referenced by remote VA + rkey, to be bounced through either
    /// the in-capsule buffer or a session bounce buffer depending on
    /// `length`.
    Keyed { addr: u64, length: u32, rkey: u32 },
    /// Payload already resident in the in-capsule buffer at `offset`.
    InCapsule { offset: u32, length: u32 },
}

/// Parse a command capsule's SGL descriptor against the rules in spec §4.C.
///
/// `dir` says whether the command is a host-to-controller write or a
/// controller-to-host read; the transport learns this from the opcode,
/// which is the executor's domain, so it is passed in rather than derived
/// here.
pub fn parse_sgl(
    sgl: &SglDescriptor,
    in_capsule_data_size: u32,
    max_io_size: u32,
) -> Result<ParsedSgl, NvmeStatusCode> {
    match (sgl.ty(), sgl.subtype()) {
        (SglDescriptorType::KeyedDataBlock, SglDescriptorSubtype::Address)
        | (SglDescriptorType::KeyedDataBlock, SglDescriptorSubtype::InvalidateKey) => {
            if sgl.length > max_io_size {
                return Err(NvmeStatusCode::DataSglLengthInvalid);
            }
            if sgl.length == 0 {
                return Ok(ParsedSgl::Empty);
            }
            Ok(ParsedSgl::Keyed {
                addr: sgl.address,
                length: sgl.length,
                rkey: sgl.key,
            })
        }
        (SglDescriptorType::DataBlock, SglDescriptorSubtype::Offset) => {
            let offset = sgl.address as u32;
            if offset > in_capsule_data_size {
                return Err(NvmeStatusCode::InvalidSglOffset);
            }
            if sgl.length > in_capsule_data_size - offset {
                return Err(NvmeStatusCode::DataSglLengthInvalid);
            }
            if sgl.length == 0 {
                return Ok(ParsedSgl::Empty);
            }
            Ok(ParsedSgl::InCapsule {
                offset,
                length: sgl.length,
            })
        }
        _ => Err(NvmeStatusCode::SglDescriptorTypeInvalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(addr: u64, length: u32, key: u32) -> SglDescriptor {
        SglDescriptor {
            address: addr,
            length,
            key,
            type_and_subtype: 0x40,
            _reserved: [0; 3],
        }
    }

    fn offset_desc(offset: u64, length: u32) -> SglDescriptor {
        SglDescriptor {
            address: offset,
            length,
            key: 0,
            type_and_subtype: 0x01,
            _reserved: [0; 3],
        }
    }

    #[test]
    fn keyed_length_at_max_io_size_succeeds() {
        let sgl = keyed(0x1000, 131072, 0xA1);
        let parsed = parse_sgl(&sgl, 4096, 131072).unwrap();
        assert!(matches!(parsed, ParsedSgl::Keyed { length: 131072, .. }));
    }

    #[test]
    fn keyed_length_over_max_io_size_fails() {
        let sgl = keyed(0x1000, 131073, 0xA1);
        assert_eq!(
            parse_sgl(&sgl, 4096, 131072).unwrap_err(),
            NvmeStatusCode::DataSglLengthInvalid
        );
    }

    #[test]
    fn keyed_zero_length_downgrades_to_empty() {
        let sgl = keyed(0x1000, 0, 0xA1);
        assert!(matches!(
            parse_sgl(&sgl, 4096, 131072).unwrap(),
            ParsedSgl::Empty
        ));
    }

    #[test]
    fn in_capsule_offset_at_boundary_is_rejected() {
        let sgl = offset_desc(4096, 1);
        assert_eq!(
            parse_sgl(&sgl, 4096, 131072).unwrap_err(),
            NvmeStatusCode::InvalidSglOffset
        );
    }

    #[test]
    fn in_capsule_offset_one_below_boundary_with_length_one_succeeds() {
        let sgl = offset_desc(4095, 1);
        assert!(matches!(
            parse_sgl(&sgl, 4096, 131072).unwrap(),
            ParsedSgl::InCapsule {
                offset: 4095,
                length: 1
            }
        ));
    }

    #[test]
    fn in_capsule_offset_with_length_overflow_fails() {
        let sgl = offset_desc(4000, 97);
        assert_eq!(
            parse_sgl(&sgl, 4096, 131072).unwrap_err(),
            NvmeStatusCode::DataSglLengthInvalid
        );
    }

    #[test]
    fn unsupported_descriptor_is_rejected() {
        let mut sgl = keyed(0, 16, 0);
        sgl.type_and_subtype = 0x21; // data block, InvalidateKey subtype: unsupported combo
        assert_eq!(
            parse_sgl(&sgl, 4096, 131072).unwrap_err(),
            NvmeStatusCode::SglDescriptorTypeInvalid
        );
    }
}
