// SPDX-License-Identifier: MPL-2.0
//! Translation of the identify response into the generic geometry model.
use crate::error::{Error, Result};
use crate::lightnvm::{
    NvmAddrFormat, NvmId, NvmIdGroup, NvmLpTbl, NVM_ID_FMTYPE_MLC, NVM_MAX_GROUPS,
};
use crate::structs::{NvmeAddrFormat, NvmeIdGroup, NvmeIdResponse, LP_MLC_PAIRS};
use heapless::Vec;
use log::*;

/// The address format is a flat byte layout and is copied as is.
pub fn addr_format(src: &NvmeAddrFormat) -> NvmAddrFormat {
    NvmAddrFormat {
        ch_offset: src.ch_offset,
        ch_len: src.ch_len,
        lun_offset: src.lun_offset,
        lun_len: src.lun_len,
        pln_offset: src.pln_offset,
        pln_len: src.pln_len,
        blk_offset: src.blk_offset,
        blk_len: src.blk_len,
        pg_offset: src.pg_offset,
        pg_len: src.pg_len,
        sect_offset: src.sect_offset,
        sect_len: src.sect_len,
    }
}

/// Translates one group. The pairing table is read only for MLC groups and only after its
/// count has been checked against the embedded capacity.
pub fn translate_group(src: &NvmeIdGroup) -> Result<NvmIdGroup> {
    let mut dst = NvmIdGroup {
        mtype: src.mtype,
        fmtype: src.fmtype,
        num_ch: src.num_ch,
        num_lun: src.num_lun,
        num_pln: src.num_pln,
        num_blk: src.num_blk.get(),
        num_pg: src.num_pg.get(),
        fpg_sz: src.fpg_sz.get(),
        csecs: src.csecs.get(),
        sos: src.sos.get(),
        trdt: src.trdt.get(),
        trdm: src.trdm.get(),
        tprt: src.tprt.get(),
        tprm: src.tprm.get(),
        tbet: src.tbet.get(),
        tbem: src.tbem.get(),
        mpos: src.mpos.get(),
        mccap: src.mccap.get(),
        cpar: src.cpar.get(),
        lptbl: NvmLpTbl::default(),
    };
    if dst.fmtype == NVM_ID_FMTYPE_MLC {
        let count = src.lptbl.num_pairs.get();
        if usize::from(count) > LP_MLC_PAIRS {
            error!(
                "nvm: number of MLC pairs not supported ({} > {})",
                count, LP_MLC_PAIRS
            );
            return Err(Error::TooManyPairs {
                count,
                capacity: LP_MLC_PAIRS,
            });
        }
        dst.lptbl.id = src.lptbl.id;
        dst.lptbl.pairs = Vec::from_slice(&src.lptbl.pairs[..usize::from(count)])
            .map_err(|_| Error::TooManyPairs {
                count,
                capacity: LP_MLC_PAIRS,
            })?;
    }
    Ok(dst)
}

/// Translates a full identify response. Only the first `min(4, cgrps)` groups are read.
pub fn translate_id(src: &NvmeIdResponse) -> Result<NvmId> {
    let mut id = NvmId {
        ver_id: src.ver_id,
        vmnt: src.vmnt,
        cgrps: src.cgrps,
        cap: src.cap.get(),
        dom: src.dom.get(),
        ppaf: addr_format(&src.ppaf),
        groups: Vec::new(),
    };
    let end = usize::from(src.cgrps).min(NVM_MAX_GROUPS);
    if usize::from(src.cgrps) > NVM_MAX_GROUPS {
        debug!(
            "nvm: device reports {} groups, translating the first {}",
            src.cgrps, NVM_MAX_GROUPS
        );
    }
    for group in &src.groups[..end] {
        let group = translate_group(group)?;
        if id.groups.push(group).is_err() {
            break;
        }
    }
    Ok(id)
}
