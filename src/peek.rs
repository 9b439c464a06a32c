// SPDX-License-Identifier: MPL-2.0
//! Structural checks of marshaled commands, for debugging live traffic.
//!
//! Nothing here changes a result; findings are only logged. Address lists live in DMA
//! memory the shim cannot reach, so callers that can resolve `spba` pass the list in.
use crate::commands::{IoOpcode, NvmCommand, RwParams};
use crate::lightnvm::IoFlags;
use crate::transport::CommandBytes;
use log::*;

/// Addresses written together as one plane/sector group.
const WRITE_GROUP: usize = 16;
/// Addresses of one multi-plane erase.
const ERASE_GROUP: usize = 4;

/// Inspects `cmd` and returns the number of findings logged.
pub fn peek(cmd: &CommandBytes, ppa_list: Option<&[u64]>) -> usize {
    match NvmCommand::decode(cmd) {
        Some(NvmCommand::PhysicalRw(rw)) if rw.opcode == IoOpcode::PhysRead => peek_pread(&rw),
        Some(NvmCommand::PhysicalRw(rw)) => peek_pwrite(&rw, ppa_list),
        Some(NvmCommand::Erase {
            control, length, ..
        }) => peek_erase(control, length, ppa_list),
        Some(NvmCommand::SetBbTable {
            nsid,
            spba,
            nlb,
            value,
            ..
        }) => {
            info!(
                "set_bb{{ nsid({}), spba({:#X}), nlb({}), value({}) }}",
                nsid, spba, nlb, value
            );
            if let Some(list) = ppa_list {
                for (i, ppa) in list.iter().take(usize::from(nlb) + 1).enumerate() {
                    info!("set_bb{{ ppa_list[{}] = {:#018X} }}", i, ppa);
                }
            }
            0
        }
        _ => {
            info!("opcode({:#04X})", cmd[0]);
            0
        }
    }
}

fn dump(list: &[u64]) {
    for (j, ppa) in list.iter().enumerate() {
        error!("dev[{}]:{:#X}", j, ppa);
    }
}

fn peek_pread(rw: &RwParams) -> usize {
    let expected = (IoFlags::SNGL_ACCESS | IoFlags::SUSPEND).bits();
    if rw.control != expected {
        error!("R ERROR - flags:{:#X}", rw.control);
        return 1;
    }
    0
}

fn peek_pwrite(rw: &RwParams, ppa_list: Option<&[u64]>) -> usize {
    let mut findings = 0;
    let nppas = usize::from(rw.length) + 1;
    if rw.control != IoFlags::QUAD_ACCESS.bits() {
        error!("W ERROR - flags:{:#X}", rw.control);
        findings += 1;
    }
    if nppas % WRITE_GROUP != 0 {
        error!("W ERROR - nppas:{}", nppas);
        findings += 1;
    }
    let list = match ppa_list {
        Some(list) => &list[..nppas.min(list.len())],
        None => return findings,
    };
    for group in list.chunks(WRITE_GROUP) {
        let upper = group[0] & 0xFFFF_FF0F;
        for (i, &ppa) in group.iter().enumerate() {
            let sector = (ppa & 0xF0) >> 4;
            if ppa & 0xFFFF_FF0F != upper {
                error!("W ERROR - exp:{:#X}, ppa2:{:#X}", upper, ppa & 0xFFFF_FF0F);
                dump(group);
                findings += 1;
            }
            if sector != i as u64 {
                error!("W ERROR - exp:{}, ppa1:{}", i, sector);
                dump(group);
                findings += 1;
            }
            if ppa >> 31 != 0 {
                error!("W ERROR - corrupted");
                dump(group);
                findings += 1;
            }
        }
    }
    findings
}

fn peek_erase(control: u16, length: u16, ppa_list: Option<&[u64]>) -> usize {
    let mut findings = 0;
    let nppas = usize::from(length) + 1;
    if control != IoFlags::QUAD_ACCESS.bits() {
        error!("E ERROR - flags:{:#X}", control);
        findings += 1;
    }
    if nppas != ERASE_GROUP {
        error!("E ERROR - nppas:{}", nppas);
        findings += 1;
    }
    if let Some(list) = ppa_list {
        let list = &list[..nppas.min(list.len())];
        for (i, &ppa) in list.iter().enumerate() {
            let plane = (ppa & 0xC0) >> 6;
            if plane != i as u64 {
                error!("E ERROR - exp:{}, ppa:{}", i, plane);
                dump(list);
                findings += 1;
            }
        }
    }
    findings
}
