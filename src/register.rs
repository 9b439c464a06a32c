// SPDX-License-Identifier: MPL-2.0
//! Device registration: publishes the NVMe-backed operation table to the generic layer.
use crate::commands::{admin, io};
use crate::config::Config;
use crate::error::Result;
use crate::lightnvm::{
    BlockState, NvmDev, NvmDevOps, NvmEndIo, NvmId, NvmRq, PpaAddr, Registrar, UserIoFuture,
};
use crate::transport::{DmaAlloc, DmaPool, Transport, UserBuffer};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::ops::ControlFlow;
use core::sync::atomic::{AtomicU32, Ordering};
use log::*;

pub const PCI_VENDOR_ID_CNEX: u16 = 0x1d1d;
pub const PCI_DEVICE_ID_CNEX_WL: u16 = 0x2807;
pub const PCI_DEVICE_ID_CNEX_QEMU: u16 = 0x1f1f;
pub const PCI_DEVICE_ID_CNEX_0E01: u16 = 0x0e01;

/// Sector size the block layer addresses in.
const SECTOR_SHIFT: u32 = 9;

/// The NVMe namespace a device is attached to.
#[derive(Debug)]
pub struct Namespace {
    nsid: u32,
    lba_shift: AtomicU32,
}

impl Namespace {
    /// Until registration derives it, the namespace addresses 512-byte blocks.
    pub fn new(nsid: u32) -> Self {
        Namespace {
            nsid,
            lba_shift: AtomicU32::new(SECTOR_SHIFT),
        }
    }

    pub fn nsid(&self) -> u32 {
        self.nsid
    }

    pub fn lba_shift(&self) -> u32 {
        self.lba_shift.load(Ordering::Acquire)
    }

    pub fn set_lba_shift(&self, shift: u32) {
        self.lba_shift.store(shift, Ordering::Release);
    }

    /// Converts a 512-byte sector number into a namespace block number.
    pub fn block_nr(&self, sector: u64) -> u64 {
        sector >> self.lba_shift().saturating_sub(SECTOR_SHIFT).min(63)
    }
}

/// Whether the namespace belongs to a controller known to speak the open-channel command
/// set: a CNEX Labs device (or the QEMU model of one) whose identify-namespace
/// vendor-specific byte 0 is set.
pub fn ns_supported(vendor: u16, device: u16, vs0: u8) -> bool {
    vendor == PCI_VENDOR_ID_CNEX
        && matches!(
            device,
            PCI_DEVICE_ID_CNEX_QEMU | PCI_DEVICE_ID_CNEX_WL | PCI_DEVICE_ID_CNEX_0E01
        )
        && vs0 == 0x1
}

/// Optional discovery attributes published next to a registered device.
pub trait Attributes {
    fn publish(&self, dev: &NvmDev) -> anyhow::Result<()>;
}

/// Operation table of an open-channel device behind an NVMe namespace.
pub struct NvmeNvm {
    ns: Arc<Namespace>,
    transport: Arc<dyn Transport>,
    cfg: Config,
}

impl NvmeNvm {
    pub fn new(ns: Arc<Namespace>, transport: Arc<dyn Transport>, cfg: Config) -> Self {
        NvmeNvm { ns, transport, cfg }
    }
}

impl NvmDevOps for NvmeNvm {
    fn identity(&self) -> Result<NvmId> {
        admin::identity(self.transport.as_ref(), self.ns.nsid(), &self.cfg)
    }

    fn get_l2p_tbl(
        &self,
        slba: u64,
        nlb: u32,
        update: &mut dyn FnMut(u64, u32, &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        admin::get_l2p_tbl(
            self.transport.as_ref(),
            self.ns.nsid(),
            &self.cfg,
            slba,
            nlb,
            update,
        )
    }

    fn get_bb_tbl(&self, dev: &NvmDev, ppa: PpaAddr, blks: &mut [u8]) -> Result<()> {
        admin::get_bb_tbl(
            self.transport.as_ref(),
            self.ns.nsid(),
            dev.bb_tbl_blocks(),
            ppa,
            blks,
        )
    }

    fn set_bb_tbl(&self, ppas: &[PpaAddr], nr_ppas: u16, value: BlockState) -> Result<()> {
        admin::set_bb_tbl(self.transport.as_ref(), self.ns.nsid(), ppas, nr_ppas, value)
    }

    fn submit_io(&self, rqd: NvmRq, end_io: NvmEndIo) -> Result<()> {
        io::submit_io(&self.transport, &self.ns, rqd, end_io)
    }

    fn submit_user_io<'a>(
        &'a self,
        rqd: &'a mut NvmRq,
        buf: Option<UserBuffer>,
    ) -> UserIoFuture<'a> {
        Box::pin(io::submit_user_io(&self.transport, &self.ns, rqd, buf))
    }

    fn erase_block(&self, rqd: &NvmRq) -> Result<()> {
        io::erase_block(self.transport.as_ref(), &self.ns, rqd)
    }

    fn create_dma_pool(&self, name: &str) -> Result<DmaPool> {
        self.transport
            .dma_pool_create(name, self.cfg.dma_pool_size, self.cfg.dma_pool_align)
            .map_err(|e| {
                error!("creating DMA pool {} failed ({})", name, e);
                crate::error::Error::NoMemory
            })
    }

    fn destroy_dma_pool(&self, pool: DmaPool) {
        self.transport.dma_pool_destroy(pool);
    }

    fn dev_dma_alloc(&self, pool: DmaPool) -> Result<DmaAlloc> {
        self.transport
            .dma_pool_alloc(pool)
            .map_err(|_| crate::error::Error::NoMemory)
    }

    fn dev_dma_free(&self, pool: DmaPool, alloc: DmaAlloc) {
        self.transport.dma_pool_free(pool, alloc);
    }

    fn max_phys_sect(&self) -> u32 {
        self.cfg.max_phys_sect
    }
}

/// Registers the open-channel device behind `ns` with the generic layer.
///
/// After registration the namespace block size follows the sector size the generic layer
/// derived. Failing to publish `attrs` is logged and otherwise ignored.
pub fn register(
    ns: Arc<Namespace>,
    transport: Arc<dyn Transport>,
    cfg: Config,
    disk_name: &str,
    node: i32,
    registrar: &dyn Registrar,
    attrs: Option<&dyn Attributes>,
) -> Result<NvmDev> {
    let ops = Arc::new(NvmeNvm::new(ns.clone(), transport, cfg));
    let mut dev = NvmDev::new(disk_name, node, ops);
    registrar.register(&mut dev).map_err(|e| {
        error!("{}: registration failed ({})", disk_name, e);
        e
    })?;
    match dev.sec_size.checked_ilog2() {
        Some(shift) => ns.set_lba_shift(shift),
        None => warn!("{}: no sector size after registration", disk_name),
    }
    info!(
        "{}: registered open-channel device, nsid {}, sector size {}",
        dev.name,
        ns.nsid(),
        dev.sec_size
    );
    if let Some(attrs) = attrs {
        if let Err(e) = attrs.publish(&dev) {
            warn!(
                "{}: failed to create attribute group for identification: {}",
                disk_name, e
            );
        }
    }
    Ok(dev)
}

/// Hands `dev` back to the generic layer.
pub fn unregister(dev: NvmDev, registrar: &dyn Registrar) {
    info!("{}: unregistering open-channel device", dev.name);
    registrar.unregister(&dev);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_controllers_need_vendor_bit() {
        assert!(ns_supported(0x1d1d, 0x1f1f, 1));
        assert!(ns_supported(0x1d1d, 0x2807, 1));
        assert!(ns_supported(0x1d1d, 0x0e01, 1));
        assert!(!ns_supported(0x1d1d, 0x2807, 0));
        assert!(!ns_supported(0x1d1d, 0x1234, 1));
        assert!(!ns_supported(0x8086, 0x1f1f, 1));
    }

    #[test]
    fn block_nr_follows_lba_shift() {
        let ns = Namespace::new(1);
        assert_eq!(ns.block_nr(100), 100);
        ns.set_lba_shift(12);
        assert_eq!(ns.block_nr(100), 12);
        ns.set_lba_shift(4);
        assert_eq!(ns.block_nr(100), 100);
    }
}
