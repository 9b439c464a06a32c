// SPDX-License-Identifier: MPL-2.0
//! Admin-queue operations: identify, L2P table transfer and bad block table management.
use super::NvmCommand;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::geometry;
use crate::lightnvm::{BlockState, NvmId, PpaAddr};
use crate::structs::{NvmeBbTblHeader, NvmeIdResponse, BB_TABLE_TAG, BB_TABLE_VERSION};
use crate::transport::{CommandBytes, Queue, Transport, TransportError};
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};
use core::mem::size_of;
use core::ops::ControlFlow;
use log::*;
use zerocopy::{FromBytes, FromZeros, IntoBytes};

/// Size of one L2P table entry on the wire.
pub const L2P_ENTRY_SIZE: usize = size_of::<u64>();

fn submit_admin(
    t: &dyn Transport,
    cmd: &CommandBytes,
    data: Option<&mut [u8]>,
) -> core::result::Result<(), TransportError> {
    trace!("admin submit: opcode {:#04X}", cmd[0]);
    #[cfg(feature = "peek")]
    crate::peek::peek(cmd, None);
    t.submit_sync(Queue::Admin, cmd, data)
}

/// Allocates a zeroed buffer, reporting failure instead of aborting.
pub(crate) fn zeroed_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Reads the device identity.
pub fn identity(t: &dyn Transport, nsid: u32, cfg: &Config) -> Result<NvmId> {
    let cmd = NvmCommand::identity(nsid, cfg.identify_chnl_off).encode();
    let mut id = NvmeIdResponse::new_box_zeroed()?;
    if let Err(e) = submit_admin(t, &cmd, Some(id.as_mut_bytes())) {
        error!("identify failed ({})", e);
        return Err(Error::Io(e));
    }
    let id = geometry::translate_id(&id)?;
    debug!(
        "identify: version {}, {} of {} groups, cap {:#X}, dom {:#X}",
        id.ver_id,
        id.groups.len(),
        id.cgrps,
        id.cap,
        id.dom
    );
    Ok(id)
}

/// Fetches `nlb` L2P entries starting at `slba`, in chunks no larger than one admin
/// transfer. Chunks reach `update` in ascending address order, each as the raw
/// little-endian entries it covers.
pub fn get_l2p_tbl(
    t: &dyn Transport,
    nsid: u32,
    cfg: &Config,
    slba: u64,
    nlb: u32,
    update: &mut dyn FnMut(u64, u32, &[u8]) -> ControlFlow<()>,
) -> Result<()> {
    if nlb == 0 {
        return Ok(());
    }
    if slba.checked_add(u64::from(nlb) - 1).is_none() {
        error!("L2P table transfer: {} entries from {:#X} pass the last address", nlb, slba);
        return Err(Error::InvalidArgument);
    }
    let len = cfg.l2p_transfer_len(t.max_hw_sectors(Queue::Admin).saturating_mul(512));
    let nlb_pr_rq = len / L2P_ENTRY_SIZE as u32;
    if nlb_pr_rq == 0 {
        error!("L2P table transfer: {} byte transfers hold no entries", len);
        return Err(Error::InvalidArgument);
    }
    let mut entries = zeroed_buffer(len as usize)?;
    let mut cmd_slba = slba;
    let mut remaining = nlb;
    while remaining > 0 {
        let cmd_nlb = remaining.min(nlb_pr_rq);
        let cmd = NvmCommand::l2p_table(nsid, cmd_slba, cmd_nlb).encode();
        if let Err(e) = submit_admin(t, &cmd, Some(&mut entries[..])) {
            error!("L2P table transfer failed ({})", e.errno());
            return Err(Error::Io(e));
        }
        let chunk = &entries[..cmd_nlb as usize * L2P_ENTRY_SIZE];
        if update(cmd_slba, cmd_nlb, chunk).is_break() {
            debug!("L2P table transfer stopped at {:#X}", cmd_slba);
            return Err(Error::Interrupted);
        }
        remaining -= cmd_nlb;
        if remaining > 0 {
            cmd_slba += u64::from(cmd_nlb);
        }
    }
    Ok(())
}

/// Decodes the raw entries of one L2P chunk.
pub fn l2p_entries(chunk: &[u8]) -> impl Iterator<Item = u64> + '_ {
    chunk.chunks_exact(L2P_ENTRY_SIZE).map(LittleEndian::read_u64)
}

/// Reads the bad block table of the unit at `ppa` into `blks`. `nr_blks` comes from the
/// device geometry; the count in the table itself is only cross-checked against it.
/// `blks` is left untouched unless every check passes.
pub fn get_bb_tbl(
    t: &dyn Transport,
    nsid: u32,
    nr_blks: u32,
    ppa: PpaAddr,
    blks: &mut [u8],
) -> Result<()> {
    let nr = nr_blks as usize;
    if blks.len() < nr {
        error!(
            "get bad block table: output holds {} of {} blocks",
            blks.len(),
            nr
        );
        return Err(Error::InvalidArgument);
    }
    let tblsz = size_of::<NvmeBbTblHeader>() + nr;
    let mut tbl = zeroed_buffer(tblsz)?;
    let cmd = NvmCommand::get_bb_table(nsid, ppa.ppa()).encode();
    if let Err(e) = submit_admin(t, &cmd, Some(&mut tbl[..])) {
        error!("get bad block table failed ({})", e.errno());
        return Err(Error::Io(e));
    }
    let (hdr, body) =
        NvmeBbTblHeader::ref_from_prefix(&tbl[..]).map_err(|_| Error::InvalidArgument)?;
    if hdr.tblid != BB_TABLE_TAG {
        error!("bbt format mismatch ({:02X?})", hdr.tblid);
        return Err(Error::BadTableFormat { tag: hdr.tblid });
    }
    if hdr.verid.get() != BB_TABLE_VERSION {
        error!("bbt version {} not supported", hdr.verid.get());
        return Err(Error::UnsupportedVersion(hdr.verid.get()));
    }
    if hdr.tblks.get() != nr_blks {
        error!(
            "bbt unexpected blocks returned ({}!={})",
            hdr.tblks.get(),
            nr_blks
        );
        return Err(Error::BlockCountMismatch {
            expected: nr_blks,
            reported: hdr.tblks.get(),
        });
    }
    debug!(
        "bbt {:#X}: {} blocks, {} factory bad, {} grown bad, {} device reserved, {} host reserved",
        ppa.ppa(),
        hdr.tblks.get(),
        hdr.tfact.get(),
        hdr.tgrown.get(),
        hdr.tdresv.get(),
        hdr.thresv.get()
    );
    blks[..nr].copy_from_slice(&body[..nr]);
    Ok(())
}

/// Marks `nr_ppas` blocks starting at `ppas[0]` with `value`.
pub fn set_bb_tbl(
    t: &dyn Transport,
    nsid: u32,
    ppas: &[PpaAddr],
    nr_ppas: u16,
    value: BlockState,
) -> Result<()> {
    let base = match ppas.first() {
        Some(ppa) if nr_ppas > 0 => *ppa,
        _ => return Err(Error::InvalidArgument),
    };
    let cmd = NvmCommand::set_bb_table(nsid, base.ppa(), nr_ppas - 1, value as u8).encode();
    submit_admin(t, &cmd, None).map_err(|e| {
        error!("set bad block table failed ({})", e.errno());
        Error::Io(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2p_entries_are_little_endian() {
        let chunk = [1, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xee, 0, 0, 0, 0, 0, 0x80];
        let entries: Vec<u64> = l2p_entries(&chunk).collect();
        assert_eq!(entries, [1, 0x8000_0000_0000_eeff]);
    }

    #[test]
    fn zeroed_buffer_is_zeroed() {
        let buf = zeroed_buffer(576).unwrap();
        assert_eq!(buf.len(), 576);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
