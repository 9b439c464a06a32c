// SPDX-License-Identifier: MPL-2.0
//! The generic open-channel model this shim translates into, and the contracts of the
//! subsystem that consumes it.
use crate::commands::IoOpcode;
use crate::error::Result;
use crate::structs::LP_MLC_PAIRS;
use crate::transport::{Bio, DmaAlloc, DmaPool, TransportError, UserBuffer};
use alloc::boxed::Box;
use alloc::sync::Arc;
use bit_field::BitField;
use bitflags::bitflags;
use core::future::Future;
use core::ops::ControlFlow;
use core::pin::Pin;
use heapless::{String, Vec};

/// Flash media type of a group with single-level cells.
pub const NVM_ID_FMTYPE_SLC: u8 = 0;
/// Flash media type of a group with multi-level cells. Only these carry a pairing table.
pub const NVM_ID_FMTYPE_MLC: u8 = 1;

/// Maximum number of groups an identify response describes.
pub const NVM_MAX_GROUPS: usize = 4;

/// Length of a device name, including the terminator the generic layer expects.
pub const DISK_NAME_LEN: usize = 32;

bitflags! {
    /// Control flags of a physical I/O command.
    pub struct IoFlags: u16 {
        const SNGL_ACCESS = 0x0;
        const DUAL_ACCESS = 0x1;
        const QUAD_ACCESS = 0x2;
        const SUSPEND = 0x80;
        const SLC_MODE = 0x100;
        const SCRAMBLE_ENABLE = 0x200;
    }
}

bitflags! {
    /// Device capabilities (`cap`) of the identify response.
    pub struct Capability: u32 {
        const SLC = 0x1;
        const CMD_SUPPORT = 0x2;
    }
}

bitflags! {
    /// Device operating mode (`dom`) of the identify response.
    pub struct DeviceMode: u32 {
        const BBLKMGMT = 0x1;
        const ECC = 0x2;
    }
}

/// State of one block in a bad block table.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BlockState {
    Good = 0x0,
    FactoryBad = 0x1,
    GrownBad = 0x2,
    DeviceReserved = 0x4,
    HostReserved = 0x8,
}

/// A packed physical address. The bit layout is described by [`NvmAddrFormat`].
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PpaAddr(pub u64);

impl PpaAddr {
    pub fn ppa(&self) -> u64 {
        self.0
    }
}

/// Address format descriptor. Offsets and lengths are in bits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct NvmAddrFormat {
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
}

/// Coordinates of a physical sector, independent of any device layout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GenericPpa {
    pub ch: u64,
    pub lun: u64,
    pub pln: u64,
    pub blk: u64,
    pub pg: u64,
    pub sec: u64,
}

/// Converts between [`GenericPpa`] and the packed layout a device reported.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct PpaFormat {
    fields: [(u8, u8); 6],
}

impl PpaFormat {
    /// Derives a converter from the device address format. Fields that would extend past
    /// bit 63 are truncated to fit.
    pub fn new(ppaf: &NvmAddrFormat) -> Self {
        let clamp = |off: u8, len: u8| {
            let off = off.min(64);
            (off, len.min(64 - off))
        };
        PpaFormat {
            fields: [
                clamp(ppaf.ch_offset, ppaf.ch_len),
                clamp(ppaf.lun_offset, ppaf.lun_len),
                clamp(ppaf.pln_offset, ppaf.pln_len),
                clamp(ppaf.blk_offset, ppaf.blk_len),
                clamp(ppaf.pg_offset, ppaf.pg_len),
                clamp(ppaf.sect_offset, ppaf.sect_len),
            ],
        }
    }

    /// Packs `addr` into the device layout. Coordinates wider than their field are masked.
    pub fn to_dev(&self, addr: &GenericPpa) -> PpaAddr {
        let values = [addr.ch, addr.lun, addr.pln, addr.blk, addr.pg, addr.sec];
        let mut ppa = 0u64;
        for (&(off, len), value) in self.fields.iter().zip(values) {
            if len == 0 {
                continue;
            }
            let (off, len) = (usize::from(off), usize::from(len));
            let mask = if len == 64 { u64::MAX } else { (1u64 << len) - 1 };
            ppa.set_bits(off..off + len, value & mask);
        }
        PpaAddr(ppa)
    }

    /// Unpacks a device address.
    pub fn to_generic(&self, ppa: PpaAddr) -> GenericPpa {
        let get = |(off, len): (u8, u8)| {
            if len == 0 {
                0
            } else {
                ppa.0
                    .get_bits(usize::from(off)..usize::from(off) + usize::from(len))
            }
        };
        GenericPpa {
            ch: get(self.fields[0]),
            lun: get(self.fields[1]),
            pln: get(self.fields[2]),
            blk: get(self.fields[3]),
            pg: get(self.fields[4]),
            sec: get(self.fields[5]),
        }
    }
}

/// MLC lower/upper page pairing table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NvmLpTbl {
    pub id: [u8; 8],
    pub pairs: Vec<u8, LP_MLC_PAIRS>,
}

/// One parallel unit group, in host order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NvmIdGroup {
    pub mtype: u8,
    pub fmtype: u8,
    pub num_ch: u8,
    pub num_lun: u8,
    pub num_pln: u8,
    pub num_blk: u16,
    pub num_pg: u16,
    pub fpg_sz: u16,
    pub csecs: u16,
    pub sos: u16,
    pub trdt: u32,
    pub trdm: u32,
    pub tprt: u32,
    pub tprm: u32,
    pub tbet: u32,
    pub tbem: u32,
    pub mpos: u32,
    pub mccap: u32,
    pub cpar: u16,
    /// Only populated for multi-level cell groups
    pub lptbl: NvmLpTbl,
}

/// Identity of an open-channel device.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NvmId {
    pub ver_id: u8,
    pub vmnt: u8,
    /// Number of groups the device reported; may exceed `groups.len()`
    pub cgrps: u8,
    pub cap: u32,
    pub dom: u32,
    pub ppaf: NvmAddrFormat,
    pub groups: Vec<NvmIdGroup, NVM_MAX_GROUPS>,
}

impl NvmId {
    pub fn capabilities(&self) -> Capability {
        Capability::from_bits_truncate(self.cap)
    }

    pub fn mode(&self) -> DeviceMode {
        DeviceMode::from_bits_truncate(self.dom)
    }
}

/// A vector I/O request from the generic layer.
#[derive(Debug)]
pub struct NvmRq {
    pub opcode: IoOpcode,
    /// Single address, or the DMA address of the address list when `nr_ppas > 1`
    pub ppa_addr: PpaAddr,
    /// DMA address of the out-of-band metadata list
    pub dma_meta_list: u64,
    /// Number of addresses; at least one
    pub nr_ppas: u16,
    pub flags: IoFlags,
    pub bio: Option<Bio>,
    /// Per-address completion bits reported by the device
    pub ppa_status: u64,
    /// Transport status of the round-trip; zero on success
    pub error: i32,
}

impl NvmRq {
    pub fn new(opcode: IoOpcode, ppa_addr: PpaAddr, nr_ppas: u16) -> Self {
        NvmRq {
            opcode,
            ppa_addr,
            dma_meta_list: 0,
            nr_ppas,
            flags: IoFlags::empty(),
            bio: None,
            ppa_status: 0,
            error: 0,
        }
    }
}

/// Notification the generic layer receives when a request submitted through
/// [`NvmDevOps::submit_io`] finishes.
pub type NvmEndIo = Box<dyn FnOnce(NvmRq, core::result::Result<(), TransportError>) + Send>;

/// Future returned by [`NvmDevOps::submit_user_io`].
pub type UserIoFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Operation table a device publishes to the generic layer.
pub trait NvmDevOps: Send + Sync {
    /// Reads the device identity and geometry.
    fn identity(&self) -> Result<NvmId>;

    /// Fetches `nlb` entries of the logical-to-physical table starting at `slba`. `update`
    /// receives each chunk in ascending order as `(slba, nlb, entries)` and may stop the
    /// transfer by returning [`ControlFlow::Break`].
    fn get_l2p_tbl(
        &self,
        slba: u64,
        nlb: u32,
        update: &mut dyn FnMut(u64, u32, &[u8]) -> ControlFlow<()>,
    ) -> Result<()>;

    /// Reads the bad block table of the unit addressed by `ppa` into `blks`.
    fn get_bb_tbl(&self, dev: &NvmDev, ppa: PpaAddr, blks: &mut [u8]) -> Result<()>;

    /// Marks `nr_ppas` blocks starting at `ppas[0]` with `value`.
    fn set_bb_tbl(&self, ppas: &[PpaAddr], nr_ppas: u16, value: BlockState) -> Result<()>;

    /// Queues `rqd` without waiting. `end_io` runs exactly once when it completes.
    fn submit_io(&self, rqd: NvmRq, end_io: NvmEndIo) -> Result<()>;

    /// Runs `rqd` with an optional caller buffer mapped in and resolves once it completes.
    fn submit_user_io<'a>(&'a self, rqd: &'a mut NvmRq, buf: Option<UserBuffer>)
        -> UserIoFuture<'a>;

    /// Erases the blocks addressed by `rqd`.
    fn erase_block(&self, rqd: &NvmRq) -> Result<()>;

    fn create_dma_pool(&self, name: &str) -> Result<DmaPool>;
    fn destroy_dma_pool(&self, pool: DmaPool);
    fn dev_dma_alloc(&self, pool: DmaPool) -> Result<DmaAlloc>;
    fn dev_dma_free(&self, pool: DmaPool, alloc: DmaAlloc);

    /// Maximum number of physical sectors in one vector request.
    fn max_phys_sect(&self) -> u32;
}

/// Device descriptor handed to the generic layer.
pub struct NvmDev {
    pub name: String<DISK_NAME_LEN>,
    pub node: i32,
    pub ops: Arc<dyn NvmDevOps>,
    /// Sector size; filled in by the generic layer after identify
    pub sec_size: u32,
    pub blks_per_lun: u32,
    /// Planes accessed together by one command
    pub plane_mode: u32,
}

impl NvmDev {
    /// Creates a descriptor. Names longer than [`DISK_NAME_LEN`] are truncated.
    pub fn new(name: &str, node: i32, ops: Arc<dyn NvmDevOps>) -> Self {
        let mut dev_name = String::new();
        for c in name.chars() {
            if dev_name.push(c).is_err() {
                break;
            }
        }
        NvmDev {
            name: dev_name,
            node,
            ops,
            sec_size: 0,
            blks_per_lun: 0,
            plane_mode: 0,
        }
    }

    /// Number of blocks a bad block table for one unit describes.
    pub fn bb_tbl_blocks(&self) -> u32 {
        self.blks_per_lun.saturating_mul(self.plane_mode)
    }
}

impl core::fmt::Debug for NvmDev {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NvmDev")
            .field("name", &self.name)
            .field("node", &self.node)
            .field("sec_size", &self.sec_size)
            .field("blks_per_lun", &self.blks_per_lun)
            .field("plane_mode", &self.plane_mode)
            .finish()
    }
}

/// Registration interface of the generic layer.
pub trait Registrar {
    /// Takes ownership of `dev`, identifies it and fills in its derived geometry.
    fn register(&self, dev: &mut NvmDev) -> Result<()>;

    /// Releases a device registered earlier.
    fn unregister(&self, dev: &NvmDev);
}
