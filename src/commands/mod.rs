// SPDX-License-Identifier: MPL-2.0
//! Open-channel command codec.
//!
//! [`NvmCommand`] is the closed set of commands this shim issues. Each variant encodes
//! into one of the 64-byte layouts in [`crate::structs`] and decodes back from it.
pub mod admin;
pub mod io;

use crate::structs::*;
use crate::transport::{CommandBytes, Direction};
use zerocopy::{transmute, FromBytes, IntoBytes};

/// Vendor admin commands.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AdminOpcode {
    Identity = 0xE2,
    GetL2pTbl = 0xEA,
    GetBbTbl = 0xF2,
    SetBbTbl = 0xF1,
}

/// Open-channel I/O commands.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum IoOpcode {
    HbRead = 0x02,
    HbWrite = 0x81,
    Erase = 0x90,
    PhysWrite = 0x91,
    PhysRead = 0x92,
}

impl IoOpcode {
    /// Host-block commands carry a logical block address next to the physical one.
    pub fn is_host_block(self) -> bool {
        matches!(self, IoOpcode::HbRead | IoOpcode::HbWrite)
    }

    /// Data direction, from the low opcode bit.
    pub fn direction(self) -> Direction {
        if (self as u8) & 1 == 1 {
            Direction::Write
        } else {
            Direction::Read
        }
    }
}

impl TryFrom<u8> for IoOpcode {
    type Error = u8;

    fn try_from(op: u8) -> Result<Self, u8> {
        match op {
            0x02 => Ok(IoOpcode::HbRead),
            0x81 => Ok(IoOpcode::HbWrite),
            0x90 => Ok(IoOpcode::Erase),
            0x91 => Ok(IoOpcode::PhysWrite),
            0x92 => Ok(IoOpcode::PhysRead),
            op => Err(op),
        }
    }
}

/// Fields shared by physical and host-block read/write.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RwParams {
    pub opcode: IoOpcode,
    pub nsid: u32,
    pub metadata: u64,
    pub prp1: u64,
    pub prp2: u64,
    /// Starting physical address, or DMA address of the address list
    pub spba: u64,
    /// Number of addresses, zero based
    pub length: u16,
    pub control: u16,
    pub dsmgmt: u32,
}

/// One open-channel command with its semantic parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NvmCommand {
    Identity {
        nsid: u32,
        chnl_off: u32,
        prp1: u64,
        prp2: u64,
    },
    HostBlockRw {
        rw: RwParams,
        slba: u64,
    },
    PhysicalRw(RwParams),
    L2pTable {
        nsid: u32,
        slba: u64,
        /// Entry count, not zero based
        nlb: u32,
        prp1: u64,
        prp2: u64,
    },
    GetBbTable {
        nsid: u32,
        spba: u64,
        prp1: u64,
        prp2: u64,
    },
    SetBbTable {
        nsid: u32,
        spba: u64,
        /// Number of addresses, zero based
        nlb: u16,
        value: u8,
        prp1: u64,
        prp2: u64,
    },
    Erase {
        nsid: u32,
        spba: u64,
        /// Number of addresses, zero based
        length: u16,
        control: u16,
        dsmgmt: u32,
        prp1: u64,
        prp2: u64,
    },
}

fn common(opcode: u8, nsid: u32) -> CommonCommand {
    CommonCommand {
        opcode,
        flags: 0,
        command_id: 0u16.into(),
        nsid: nsid.into(),
    }
}

impl NvmCommand {
    pub fn identity(nsid: u32, chnl_off: u32) -> Self {
        NvmCommand::Identity {
            nsid,
            chnl_off,
            prp1: 0,
            prp2: 0,
        }
    }

    pub fn l2p_table(nsid: u32, slba: u64, nlb: u32) -> Self {
        NvmCommand::L2pTable {
            nsid,
            slba,
            nlb,
            prp1: 0,
            prp2: 0,
        }
    }

    pub fn get_bb_table(nsid: u32, spba: u64) -> Self {
        NvmCommand::GetBbTable {
            nsid,
            spba,
            prp1: 0,
            prp2: 0,
        }
    }

    /// `nlb` is the number of addresses, zero based.
    pub fn set_bb_table(nsid: u32, spba: u64, nlb: u16, value: u8) -> Self {
        NvmCommand::SetBbTable {
            nsid,
            spba,
            nlb,
            value,
            prp1: 0,
            prp2: 0,
        }
    }

    /// `length` is the number of addresses, zero based.
    pub fn erase(nsid: u32, spba: u64, length: u16) -> Self {
        NvmCommand::Erase {
            nsid,
            spba,
            length,
            control: 0,
            dsmgmt: 0,
            prp1: 0,
            prp2: 0,
        }
    }

    /// Picks the layout matching the opcode: host-block commands carry `slba`, erase
    /// carries no data pointers.
    pub fn rw(rw: RwParams, slba: u64) -> Self {
        match rw.opcode {
            IoOpcode::HbRead | IoOpcode::HbWrite => NvmCommand::HostBlockRw { rw, slba },
            IoOpcode::Erase => NvmCommand::Erase {
                nsid: rw.nsid,
                spba: rw.spba,
                length: rw.length,
                control: rw.control,
                dsmgmt: rw.dsmgmt,
                prp1: rw.prp1,
                prp2: rw.prp2,
            },
            IoOpcode::PhysRead | IoOpcode::PhysWrite => NvmCommand::PhysicalRw(rw),
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            NvmCommand::Identity { .. } => AdminOpcode::Identity as u8,
            NvmCommand::HostBlockRw { rw, .. } | NvmCommand::PhysicalRw(rw) => rw.opcode as u8,
            NvmCommand::L2pTable { .. } => AdminOpcode::GetL2pTbl as u8,
            NvmCommand::GetBbTable { .. } => AdminOpcode::GetBbTbl as u8,
            NvmCommand::SetBbTable { .. } => AdminOpcode::SetBbTbl as u8,
            NvmCommand::Erase { .. } => IoOpcode::Erase as u8,
        }
    }

    /// Marshals the command into its 64-byte wire form.
    pub fn encode(&self) -> CommandBytes {
        match *self {
            NvmCommand::Identity {
                nsid,
                chnl_off,
                prp1,
                prp2,
            } => {
                let mut c = Identity::new(common(self.opcode(), nsid));
                c.prp1.set(prp1);
                c.prp2.set(prp2);
                c.chnl_off.set(chnl_off);
                transmute!(c)
            }
            NvmCommand::HostBlockRw { rw, slba } => {
                let mut c = HbRw::new(common(self.opcode(), rw.nsid));
                c.metadata.set(rw.metadata);
                c.prp1.set(rw.prp1);
                c.prp2.set(rw.prp2);
                c.spba.set(rw.spba);
                c.length.set(rw.length);
                c.control.set(rw.control);
                c.dsmgmt.set(rw.dsmgmt);
                c.slba.set(slba);
                transmute!(c)
            }
            NvmCommand::PhysicalRw(rw) => {
                let mut c = PhRw::new(common(self.opcode(), rw.nsid));
                c.metadata.set(rw.metadata);
                c.prp1.set(rw.prp1);
                c.prp2.set(rw.prp2);
                c.spba.set(rw.spba);
                c.length.set(rw.length);
                c.control.set(rw.control);
                c.dsmgmt.set(rw.dsmgmt);
                transmute!(c)
            }
            NvmCommand::L2pTable {
                nsid,
                slba,
                nlb,
                prp1,
                prp2,
            } => {
                let mut c = L2pTbl::new(common(self.opcode(), nsid));
                c.prp1.set(prp1);
                c.prp2.set(prp2);
                c.slba.set(slba);
                c.nlb.set(nlb);
                transmute!(c)
            }
            NvmCommand::GetBbTable {
                nsid,
                spba,
                prp1,
                prp2,
            } => {
                let mut c = GetBbTbl::new(common(self.opcode(), nsid));
                c.prp1.set(prp1);
                c.prp2.set(prp2);
                c.spba.set(spba);
                transmute!(c)
            }
            NvmCommand::SetBbTable {
                nsid,
                spba,
                nlb,
                value,
                prp1,
                prp2,
            } => {
                let mut c = SetBbTbl::new(common(self.opcode(), nsid));
                c.prp1.set(prp1);
                c.prp2.set(prp2);
                c.spba.set(spba);
                c.nlb.set(nlb);
                c.value = value;
                transmute!(c)
            }
            NvmCommand::Erase {
                nsid,
                spba,
                length,
                control,
                dsmgmt,
                prp1,
                prp2,
            } => {
                let mut c = EraseBlk::new(common(self.opcode(), nsid));
                c.prp1.set(prp1);
                c.prp2.set(prp2);
                c.spba.set(spba);
                c.length.set(length);
                c.control.set(control);
                c.dsmgmt.set(dsmgmt);
                transmute!(c)
            }
        }
    }

    /// Parses a marshaled command. Returns `None` for opcodes this shim never issues.
    pub fn decode(bytes: &CommandBytes) -> Option<Self> {
        let opcode = bytes[0];
        if let Ok(op) = IoOpcode::try_from(opcode) {
            return Some(match op {
                IoOpcode::Erase => {
                    let c: EraseBlk = transmute!(*bytes);
                    NvmCommand::Erase {
                        nsid: c.common.nsid.get(),
                        spba: c.spba.get(),
                        length: c.length.get(),
                        control: c.control.get(),
                        dsmgmt: c.dsmgmt.get(),
                        prp1: c.prp1.get(),
                        prp2: c.prp2.get(),
                    }
                }
                IoOpcode::HbRead | IoOpcode::HbWrite => {
                    let c: HbRw = transmute!(*bytes);
                    NvmCommand::HostBlockRw {
                        rw: RwParams {
                            opcode: op,
                            nsid: c.common.nsid.get(),
                            metadata: c.metadata.get(),
                            prp1: c.prp1.get(),
                            prp2: c.prp2.get(),
                            spba: c.spba.get(),
                            length: c.length.get(),
                            control: c.control.get(),
                            dsmgmt: c.dsmgmt.get(),
                        },
                        slba: c.slba.get(),
                    }
                }
                IoOpcode::PhysRead | IoOpcode::PhysWrite => {
                    let c: PhRw = transmute!(*bytes);
                    NvmCommand::PhysicalRw(RwParams {
                        opcode: op,
                        nsid: c.common.nsid.get(),
                        metadata: c.metadata.get(),
                        prp1: c.prp1.get(),
                        prp2: c.prp2.get(),
                        spba: c.spba.get(),
                        length: c.length.get(),
                        control: c.control.get(),
                        dsmgmt: c.dsmgmt.get(),
                    })
                }
            });
        }
        match opcode {
            x if x == AdminOpcode::Identity as u8 => {
                let c: Identity = transmute!(*bytes);
                Some(NvmCommand::Identity {
                    nsid: c.common.nsid.get(),
                    chnl_off: c.chnl_off.get(),
                    prp1: c.prp1.get(),
                    prp2: c.prp2.get(),
                })
            }
            x if x == AdminOpcode::GetL2pTbl as u8 => {
                let c: L2pTbl = transmute!(*bytes);
                Some(NvmCommand::L2pTable {
                    nsid: c.common.nsid.get(),
                    slba: c.slba.get(),
                    nlb: c.nlb.get(),
                    prp1: c.prp1.get(),
                    prp2: c.prp2.get(),
                })
            }
            x if x == AdminOpcode::GetBbTbl as u8 => {
                let c: GetBbTbl = transmute!(*bytes);
                Some(NvmCommand::GetBbTable {
                    nsid: c.common.nsid.get(),
                    spba: c.spba.get(),
                    prp1: c.prp1.get(),
                    prp2: c.prp2.get(),
                })
            }
            x if x == AdminOpcode::SetBbTbl as u8 => {
                let c: SetBbTbl = transmute!(*bytes);
                Some(NvmCommand::SetBbTable {
                    nsid: c.common.nsid.get(),
                    spba: c.spba.get(),
                    nlb: c.nlb.get(),
                    value: c.value,
                    prp1: c.prp1.get(),
                    prp2: c.prp2.get(),
                })
            }
            _ => None,
        }
    }
}

/// A decoded completion queue entry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct CompletionEntry {
    /// Per-address completion bits
    pub result: u64,
    pub sq_head: u16,
    pub sq_id: u16,
    pub command_id: u16,
    pub status: u16,
}

impl CompletionEntry {
    pub fn decode(cqe: &NvmCompletion) -> Self {
        CompletionEntry {
            result: cqe.result.get(),
            sq_head: cqe.sq_head.get(),
            sq_id: cqe.sq_id.get(),
            command_id: cqe.command_id.get(),
            status: cqe.status.get(),
        }
    }

    /// Parses the 16 wire bytes of a completion. `None` if `bytes` is too short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        NvmCompletion::read_from_prefix(bytes)
            .ok()
            .map(|(cqe, _)| Self::decode(&cqe))
    }

    pub fn encode(&self) -> NvmCompletion {
        NvmCompletion {
            result: self.result.into(),
            sq_head: self.sq_head.into(),
            sq_id: self.sq_id.into(),
            command_id: self.command_id.into(),
            status: self.status.into(),
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(self.encode().as_bytes());
        out
    }
}
