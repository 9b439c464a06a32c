// SPDX-License-Identifier: MPL-2.0
//! I/O-queue operations: vector read/write in both submission modes, and erase.
use super::{CompletionEntry, NvmCommand, RwParams};
use crate::error::{Error, Result};
use crate::lightnvm::{NvmEndIo, NvmRq};
use crate::register::Namespace;
use crate::structs::CommandBuffer;
use crate::sync::{completion, Completion};
use crate::transport::{Queue, Request, Transport, TransportError, UserBuffer};
use alloc::boxed::Box;
use alloc::sync::Arc;
use log::*;
use zerocopy::FromZeros;

/// Builds the wire command for `rqd`. Host-block commands get their logical block from
/// the position of the attached payload.
pub fn rqtocmd(ns: &Namespace, rqd: &NvmRq) -> Result<NvmCommand> {
    let length = match rqd.nr_ppas.checked_sub(1) {
        Some(length) => length,
        None => {
            error!("request without addresses (opcode {:?})", rqd.opcode);
            return Err(Error::InvalidArgument);
        }
    };
    let rw = RwParams {
        opcode: rqd.opcode,
        nsid: ns.nsid(),
        metadata: rqd.dma_meta_list,
        prp1: 0,
        prp2: 0,
        spba: rqd.ppa_addr.ppa(),
        length,
        control: rqd.flags.bits(),
        dsmgmt: 0,
    };
    let slba = match (&rqd.bio, rqd.opcode.is_host_block()) {
        (Some(bio), true) => ns.block_nr(bio.sector),
        _ => 0,
    };
    Ok(NvmCommand::rw(rw, slba))
}

fn status_of(res: &core::result::Result<(), TransportError>) -> i32 {
    match res {
        Ok(()) => 0,
        Err(e) => e.errno(),
    }
}

/// Allocates a request tag and a zeroed command buffer holding `cmd`. The tag is handed
/// back to the transport if the buffer cannot be allocated.
fn alloc_request(t: &dyn Transport, rqd: &NvmRq, cmd: &NvmCommand) -> Result<Request> {
    let dir = rqd.opcode.direction();
    let tag = t.alloc_request(dir).map_err(|e| {
        warn!("no request available ({})", e);
        Error::NoMemory
    })?;
    let mut buf = match CommandBuffer::new_box_zeroed() {
        Ok(buf) => buf,
        Err(_) => {
            t.free_request(tag);
            return Err(Error::NoMemory);
        }
    };
    buf.command = cmd.encode();
    #[cfg(feature = "peek")]
    crate::peek::peek(&buf.command, None);
    Ok(Request {
        tag,
        dir,
        cmd: buf,
        bio: None,
        user: None,
        ioprio: 0,
    })
}

/// Queues `rqd` and returns without waiting. Once the transport completes it, the
/// per-address status is copied into the request, `end_io` runs, and the command buffer
/// and request tag are released.
pub fn submit_io(
    t: &Arc<dyn Transport>,
    ns: &Namespace,
    mut rqd: NvmRq,
    end_io: NvmEndIo,
) -> Result<()> {
    let cmd = rqtocmd(ns, &rqd)?;
    let mut rq = alloc_request(t.as_ref(), &rqd, &cmd)?;
    if let Some(bio) = rqd.bio.take() {
        rq.ioprio = bio.prio;
        rq.bio = Some(bio);
    }
    trace!(
        "submit_io: opcode {:#04X}, ppa {:#X}, {} addresses",
        cmd.opcode(),
        rqd.ppa_addr.ppa(),
        rqd.nr_ppas
    );
    let transport = t.clone();
    t.execute_nowait(
        rq,
        Box::new(move |mut rq: Request, res: core::result::Result<(), TransportError>| {
            rqd.ppa_status = CompletionEntry::decode(&rq.cmd.completion).result;
            rqd.error = status_of(&res);
            rqd.bio = rq.bio.take();
            end_io(rqd, res);
            let Request { tag, cmd: buf, .. } = rq;
            drop(buf);
            transport.free_request(tag);
        }),
    );
    Ok(())
}

/// Unmaps the user buffer of `rq`, if any, and releases its command buffer and tag.
fn release_user(t: &dyn Transport, mut rq: Request) {
    if let Some(buf) = rq.user.take() {
        t.unmap_user(&mut rq, buf);
    }
    let Request { tag, cmd, .. } = rq;
    drop(cmd);
    t.free_request(tag);
}

type UserCompletion = Completion<(Request, core::result::Result<(), TransportError>)>;

/// Waiting side of a user request. Whoever ends up holding the finished request releases
/// it: the waiter after a normal wake-up, this guard if the waiter is dropped between
/// completion and wake-up, or the completion callback if the waiter is already gone.
struct InFlight {
    rx: UserCompletion,
    transport: Arc<dyn Transport>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some((rq, _)) = self.rx.close() {
            debug!("user I/O tag {} abandoned after completion", rq.tag.0);
            release_user(self.transport.as_ref(), rq);
        }
    }
}

/// Runs `rqd` with `buf` mapped into the request and resolves once the transport
/// completes it. The per-address status and the transport status end up in `rqd`; the
/// buffer is unmapped and the request released before this returns. Dropping the future
/// early does not leak the request: it is released when the transport completes it.
pub async fn submit_user_io(
    t: &Arc<dyn Transport>,
    ns: &Namespace,
    rqd: &mut NvmRq,
    buf: Option<UserBuffer>,
) -> Result<()> {
    let cmd = rqtocmd(ns, rqd)?;
    let mut rq = alloc_request(t.as_ref(), rqd, &cmd)?;
    if let Some(buf) = buf {
        if let Err(e) = t.map_user(&mut rq, buf) {
            warn!("mapping {} byte user buffer failed ({})", buf.len, e);
            release_user(t.as_ref(), rq);
            return Err(Error::NoMemory);
        }
        rq.user = Some(buf);
    }
    let (tx, rx) = completion();
    let mut waiter = InFlight {
        rx,
        transport: t.clone(),
    };
    let transport = t.clone();
    t.execute_nowait(
        rq,
        Box::new(move |rq: Request, res: core::result::Result<(), TransportError>| {
            if let Err((rq, _)) = tx.complete((rq, res)) {
                debug!("user I/O tag {} completed with no waiter", rq.tag.0);
                release_user(transport.as_ref(), rq);
            }
        }),
    );
    let (rq, res) = (&mut waiter.rx).await;
    rqd.ppa_status = CompletionEntry::decode(&rq.cmd.completion).result;
    rqd.error = status_of(&res);
    if let Err(e) = res {
        debug!("user I/O {:#04X} completed with {}", cmd.opcode(), e);
    }
    release_user(t.as_ref(), rq);
    Ok(())
}

/// Erases the blocks addressed by `rqd`. A failed round-trip keeps the transport's status.
pub fn erase_block(t: &dyn Transport, ns: &Namespace, rqd: &NvmRq) -> Result<()> {
    let length = rqd.nr_ppas.checked_sub(1).ok_or(Error::InvalidArgument)?;
    let cmd = NvmCommand::erase(ns.nsid(), rqd.ppa_addr.ppa(), length).encode();
    #[cfg(feature = "peek")]
    crate::peek::peek(&cmd, None);
    t.submit_sync(Queue::Io, &cmd, None).map_err(|e| {
        error!("erase at {:#X} failed ({})", rqd.ppa_addr.ppa(), e);
        Error::Transport(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::IoOpcode;
    use crate::lightnvm::{IoFlags, PpaAddr};
    use crate::transport::Bio;

    #[test]
    fn erase_of_four_addresses_encodes_run_length_three() {
        let ns = Namespace::new(1);
        let mut rqd = NvmRq::new(IoOpcode::Erase, PpaAddr(0x1000), 4);
        rqd.flags = IoFlags::QUAD_ACCESS;
        match rqtocmd(&ns, &rqd).unwrap() {
            NvmCommand::Erase {
                length, control, ..
            } => {
                assert_eq!(length, 3);
                assert_eq!(control, IoFlags::QUAD_ACCESS.bits());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn physical_read_carries_address_and_metadata() {
        let ns = Namespace::new(7);
        let mut rqd = NvmRq::new(IoOpcode::PhysRead, PpaAddr(0xabc), 16);
        rqd.dma_meta_list = 0x8000;
        rqd.flags = IoFlags::SUSPEND;
        let cmd = rqtocmd(&ns, &rqd).unwrap();
        assert_eq!(
            cmd,
            NvmCommand::PhysicalRw(RwParams {
                opcode: IoOpcode::PhysRead,
                nsid: 7,
                metadata: 0x8000,
                prp1: 0,
                prp2: 0,
                spba: 0xabc,
                length: 15,
                control: 0x80,
                dsmgmt: 0,
            })
        );
    }

    #[test]
    fn host_block_write_derives_slba_from_sector() {
        let ns = Namespace::new(1);
        ns.set_lba_shift(12);
        let mut rqd = NvmRq::new(IoOpcode::HbWrite, PpaAddr(0), 1);
        rqd.bio = Some(Bio {
            sector: 64,
            data: alloc::vec![0; 4096],
            prio: 0,
        });
        match rqtocmd(&ns, &rqd).unwrap() {
            NvmCommand::HostBlockRw { slba, rw } => {
                assert_eq!(slba, 8);
                assert_eq!(rw.length, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn empty_request_is_rejected() {
        let ns = Namespace::new(1);
        let rqd = NvmRq::new(IoOpcode::PhysWrite, PpaAddr(0), 0);
        assert_eq!(rqtocmd(&ns, &rqd), Err(Error::InvalidArgument));
    }
}
