// SPDX-License-Identifier: MPL-2.0
//! Wire layouts of the open-channel command set.
//!
//! Every multi-byte field is stored little-endian through the `zerocopy` byte-order
//! wrappers, so the layouts are byte-exact on any host. All structures are unaligned and
//! free of padding; their sizes are checked at build time.
use core::mem::offset_of;
use static_assertions::{assert_eq_size, const_assert_eq};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, LE, U16, U32, U64};

/// Capacity of the MLC pairing table embedded in an identity group.
pub const LP_MLC_PAIRS: usize = 886;

/// Number of identity groups in the identify response.
pub const ID_GROUPS: usize = 4;

/// Tag at the start of every bad block table.
pub const BB_TABLE_TAG: [u8; 4] = *b"BBLT";

/// The only bad block table version we understand.
pub const BB_TABLE_VERSION: u16 = 1;

/// Dwords 0 and 1, shared by every command.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct CommonCommand {
    pub opcode: u8,
    pub flags: u8,
    pub command_id: U16<LE>,
    pub nsid: U32<LE>,
}
assert_eq_size!(CommonCommand, [u8; 8]);

/// Host-block (legacy) read/write.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct HbRw {
    pub common: CommonCommand,
    _rsvd2: U64<LE>,
    /// DMA address of the out-of-band metadata list
    pub metadata: U64<LE>,
    pub prp1: U64<LE>,
    pub prp2: U64<LE>,
    /// Starting physical address, or DMA address of the PPA list
    pub spba: U64<LE>,
    /// Number of addresses, zero based
    pub length: U16<LE>,
    pub control: U16<LE>,
    pub dsmgmt: U32<LE>,
    /// Starting logical block
    pub slba: U64<LE>,
}
assert_eq_size!(HbRw, [u8; 64]);

/// Physical-page read/write.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct PhRw {
    pub common: CommonCommand,
    _rsvd2: U64<LE>,
    pub metadata: U64<LE>,
    pub prp1: U64<LE>,
    pub prp2: U64<LE>,
    pub spba: U64<LE>,
    pub length: U16<LE>,
    pub control: U16<LE>,
    pub dsmgmt: U32<LE>,
    _resv: U64<LE>,
}
assert_eq_size!(PhRw, [u8; 64]);

/// Device identification (admin).
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct Identity {
    pub common: CommonCommand,
    _rsvd: [u8; 16],
    pub prp1: U64<LE>,
    pub prp2: U64<LE>,
    /// First channel to report
    pub chnl_off: U32<LE>,
    _rsvd11: [u8; 20],
}
assert_eq_size!(Identity, [u8; 64]);

/// Logical-to-physical table fetch (admin).
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct L2pTbl {
    pub common: CommonCommand,
    _cdw2: [u8; 16],
    pub prp1: U64<LE>,
    pub prp2: U64<LE>,
    pub slba: U64<LE>,
    /// Number of entries, not zero based
    pub nlb: U32<LE>,
    _cdw14: [u8; 12],
}
assert_eq_size!(L2pTbl, [u8; 64]);

/// Bad block table fetch (admin).
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct GetBbTbl {
    pub common: CommonCommand,
    _rsvd: [u8; 16],
    pub prp1: U64<LE>,
    pub prp2: U64<LE>,
    pub spba: U64<LE>,
    _rsvd4: [u8; 16],
}
assert_eq_size!(GetBbTbl, [u8; 64]);

/// Bad block table update (admin).
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct SetBbTbl {
    pub common: CommonCommand,
    _rsvd: [u8; 16],
    pub prp1: U64<LE>,
    pub prp2: U64<LE>,
    pub spba: U64<LE>,
    /// Number of addresses, zero based
    pub nlb: U16<LE>,
    /// Block state to record
    pub value: u8,
    _rsvd3: u8,
    _rsvd4: [u8; 12],
}
assert_eq_size!(SetBbTbl, [u8; 64]);

/// Block erase (I/O).
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct EraseBlk {
    pub common: CommonCommand,
    _rsvd: [u8; 16],
    pub prp1: U64<LE>,
    pub prp2: U64<LE>,
    pub spba: U64<LE>,
    pub length: U16<LE>,
    pub control: U16<LE>,
    pub dsmgmt: U32<LE>,
    _resv: U64<LE>,
}
assert_eq_size!(EraseBlk, [u8; 64]);

// The common header sits at offset 0 of every variant, and the address fields line up
// across the I/O variants.
const_assert_eq!(offset_of!(HbRw, common), 0);
const_assert_eq!(offset_of!(Identity, chnl_off), 40);
const_assert_eq!(offset_of!(L2pTbl, slba), 40);
const_assert_eq!(offset_of!(L2pTbl, nlb), 48);
const_assert_eq!(offset_of!(HbRw, spba), 40);
const_assert_eq!(offset_of!(PhRw, spba), 40);
const_assert_eq!(offset_of!(GetBbTbl, spba), 40);
const_assert_eq!(offset_of!(SetBbTbl, spba), 40);
const_assert_eq!(offset_of!(EraseBlk, spba), 40);
const_assert_eq!(offset_of!(HbRw, length), 48);
const_assert_eq!(offset_of!(EraseBlk, length), 48);
const_assert_eq!(offset_of!(HbRw, slba), 56);

impl HbRw {
    pub(crate) fn new(common: CommonCommand) -> Self {
        HbRw {
            common,
            ..Default::default()
        }
    }
}

impl PhRw {
    pub(crate) fn new(common: CommonCommand) -> Self {
        PhRw {
            common,
            ..Default::default()
        }
    }
}

impl Identity {
    pub(crate) fn new(common: CommonCommand) -> Self {
        Identity {
            common,
            ..Default::default()
        }
    }
}

impl L2pTbl {
    pub(crate) fn new(common: CommonCommand) -> Self {
        L2pTbl {
            common,
            ..Default::default()
        }
    }
}

impl GetBbTbl {
    pub(crate) fn new(common: CommonCommand) -> Self {
        GetBbTbl {
            common,
            ..Default::default()
        }
    }
}

impl SetBbTbl {
    pub(crate) fn new(common: CommonCommand) -> Self {
        SetBbTbl {
            common,
            ..Default::default()
        }
    }
}

impl EraseBlk {
    pub(crate) fn new(common: CommonCommand) -> Self {
        EraseBlk {
            common,
            ..Default::default()
        }
    }
}

/// Completion queue entry as returned for open-channel commands.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct NvmCompletion {
    /// PPA completion status: one bit per address of a vector command
    pub result: U64<LE>,
    /// How much of the submission queue may be reclaimed
    pub sq_head: U16<LE>,
    /// Submission queue that generated this entry
    pub sq_id: U16<LE>,
    /// Identifier of the command that completed
    pub command_id: U16<LE>,
    /// Status field; zero on success
    pub status: U16<LE>,
}
assert_eq_size!(NvmCompletion, [u8; 16]);

/// Command and completion kept in one allocation for the lifetime of a request.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct CommandBuffer {
    pub command: [u8; 64],
    pub completion: NvmCompletion,
}
assert_eq_size!(CommandBuffer, [u8; 80]);

/// How a physical address packs its coordinates: bit offset and width of each field.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct NvmeAddrFormat {
    pub ch_offset: u8,
    pub ch_len: u8,
    pub lun_offset: u8,
    pub lun_len: u8,
    pub pln_offset: u8,
    pub pln_len: u8,
    pub blk_offset: u8,
    pub blk_len: u8,
    pub pg_offset: u8,
    pub pg_len: u8,
    pub sect_offset: u8,
    pub sect_len: u8,
    _res: [u8; 4],
}
assert_eq_size!(NvmeAddrFormat, [u8; 16]);

/// MLC lower/upper page pairing table.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct NvmeLpTbl {
    pub id: [u8; 8],
    pub num_pairs: U16<LE>,
    pub pairs: [u8; LP_MLC_PAIRS],
}
assert_eq_size!(NvmeLpTbl, [u8; 896]);

/// One parallel unit group of the identify response.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct NvmeIdGroup {
    /// Media type
    pub mtype: u8,
    /// Flash media type; MLC groups carry a pairing table
    pub fmtype: u8,
    _res16: U16<LE>,
    pub num_ch: u8,
    pub num_lun: u8,
    pub num_pln: u8,
    _rsvd1: u8,
    pub num_blk: U16<LE>,
    pub num_pg: U16<LE>,
    /// Flash page size
    pub fpg_sz: U16<LE>,
    /// Controller sector size
    pub csecs: U16<LE>,
    /// Out-of-band area size per sector
    pub sos: U16<LE>,
    _rsvd2: U16<LE>,
    /// Typical and maximum read time
    pub trdt: U32<LE>,
    pub trdm: U32<LE>,
    /// Typical and maximum program time
    pub tprt: U32<LE>,
    pub tprm: U32<LE>,
    /// Typical and maximum erase time
    pub tbet: U32<LE>,
    pub tbem: U32<LE>,
    /// Multi-plane operation support
    pub mpos: U32<LE>,
    /// Media and controller capabilities
    pub mccap: U32<LE>,
    /// Channel parallelism
    pub cpar: U16<LE>,
    _reserved: [u8; 10],
    pub lptbl: NvmeLpTbl,
}
assert_eq_size!(NvmeIdGroup, [u8; 960]);

/// Identify response of an open-channel controller.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct NvmeIdResponse {
    pub ver_id: u8,
    /// Vendor-specific NVM type
    pub vmnt: u8,
    /// Number of configuration groups
    pub cgrps: u8,
    _res: u8,
    /// Capability bitmap
    pub cap: U32<LE>,
    /// Device operating mode bitmap
    pub dom: U32<LE>,
    pub ppaf: NvmeAddrFormat,
    _resv: [u8; 228],
    pub groups: [NvmeIdGroup; ID_GROUPS],
}
assert_eq_size!(NvmeIdResponse, [u8; 4096]);
const_assert_eq!(offset_of!(NvmeIdResponse, ppaf), 12);
const_assert_eq!(offset_of!(NvmeIdResponse, groups), 256);

/// Fixed header of a bad block table. One status byte per block follows it.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct NvmeBbTblHeader {
    /// Must be `BBLT`
    pub tblid: [u8; 4],
    pub verid: U16<LE>,
    pub revid: U16<LE>,
    _rvsd1: U32<LE>,
    /// Total blocks described by the table
    pub tblks: U32<LE>,
    /// Factory bad blocks
    pub tfact: U32<LE>,
    /// Grown bad blocks
    pub tgrown: U32<LE>,
    /// Device reserved blocks
    pub tdresv: U32<LE>,
    /// Host reserved blocks
    pub thresv: U32<LE>,
    _rsvd2: [u8; 32],
}
assert_eq_size!(NvmeBbTblHeader, [u8; 64]);
const_assert_eq!(offset_of!(NvmeBbTblHeader, tblks), 12);
