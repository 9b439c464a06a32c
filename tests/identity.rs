// SPDX-License-Identifier: MPL-2.0
mod common;

use common::{le, MockTransport};
use lightnvm::commands::admin;
use lightnvm::lightnvm::{Capability, NVM_ID_FMTYPE_MLC};
use lightnvm::structs::NvmeIdResponse;
use lightnvm::transport::{CommandBytes, Queue, TransportError};
use lightnvm::{Config, Error};
use std::sync::Arc;
use zerocopy::{FromZeros, IntoBytes};

fn response(cgrps: u8) -> Box<NvmeIdResponse> {
    let mut id = NvmeIdResponse::new_box_zeroed().unwrap();
    id.ver_id = 1;
    id.vmnt = 0;
    id.cgrps = cgrps;
    id.cap.set(0x3);
    id.dom.set(0x1);
    id.ppaf.ch_offset = 4;
    id.ppaf.ch_len = 4;
    id.ppaf.blk_offset = 20;
    id.ppaf.blk_len = 12;
    for (i, g) in id.groups.iter_mut().enumerate() {
        g.mtype = 0;
        g.fmtype = 0;
        g.num_ch = 8 + i as u8;
        g.num_lun = 4;
        g.num_pln = 2;
        g.num_blk.set(1000 + i as u16);
        g.num_pg.set(256);
        g.fpg_sz.set(4096);
        g.csecs.set(4096);
        g.sos.set(16);
        g.tprt.set(1_200_000);
        g.mccap.set(0x1);
    }
    id
}

fn serving(id: Box<NvmeIdResponse>) -> Arc<MockTransport> {
    MockTransport::with_responder(
        256,
        Box::new(move |_: &CommandBytes, data: Option<&mut [u8]>| {
            let data = data.expect("identify needs a buffer");
            assert_eq!(data.len(), 4096);
            data.copy_from_slice(id.as_bytes());
            Ok(())
        }),
    )
}

#[test]
fn identify_translates_header_and_groups() {
    let t = serving(response(2));
    let id = admin::identity(t.as_ref(), 3, &Config::default()).unwrap();
    assert_eq!(id.ver_id, 1);
    assert_eq!(id.cgrps, 2);
    assert_eq!(id.capabilities(), Capability::SLC | Capability::CMD_SUPPORT);
    assert_eq!(id.ppaf.ch_offset, 4);
    assert_eq!(id.ppaf.blk_len, 12);
    assert_eq!(id.groups.len(), 2);
    assert_eq!(id.groups[1].num_ch, 9);
    assert_eq!(id.groups[1].num_blk, 1001);
    assert_eq!(id.groups[0].tprt, 1_200_000);

    let sent = t.submitted();
    assert_eq!(sent.len(), 1);
    let (queue, cmd) = sent[0];
    assert_eq!(queue, Queue::Admin);
    assert_eq!(cmd[0], 0xE2);
    assert_eq!(le(&cmd, 4, 4), 3);
    assert_eq!(le(&cmd, 40, 4), 0);
}

#[test]
fn identify_sends_configured_channel_offset() {
    let t = serving(response(1));
    admin::identity(t.as_ref(), 1, &Config::default().with_identify_chnl_off(2)).unwrap();
    assert_eq!(le(&t.submitted()[0].1, 40, 4), 2);
}

#[test]
fn only_four_groups_are_translated() {
    let t = serving(response(6));
    let id = admin::identity(t.as_ref(), 1, &Config::default()).unwrap();
    assert_eq!(id.cgrps, 6);
    assert_eq!(id.groups.len(), 4);
    assert_eq!(id.groups[3].num_ch, 11);
}

#[test]
fn oversized_pairing_table_is_rejected() {
    let mut raw = response(3);
    raw.groups[1].fmtype = NVM_ID_FMTYPE_MLC;
    raw.groups[1].lptbl.num_pairs.set(887);
    let t = serving(raw);
    let err = admin::identity(t.as_ref(), 1, &Config::default()).unwrap_err();
    assert_eq!(
        err,
        Error::TooManyPairs {
            count: 887,
            capacity: 886
        }
    );
    assert!(err.is_validation());
}

#[test]
fn mlc_pairing_table_is_copied() {
    let mut raw = response(1);
    raw.groups[0].fmtype = NVM_ID_FMTYPE_MLC;
    raw.groups[0].lptbl.id = *b"PAIRTBL0";
    raw.groups[0].lptbl.num_pairs.set(4);
    raw.groups[0].lptbl.pairs[..6].copy_from_slice(&[0, 1, 2, 3, 99, 99]);
    let t = serving(raw);
    let id = admin::identity(t.as_ref(), 1, &Config::default()).unwrap();
    assert_eq!(&id.groups[0].lptbl.id, b"PAIRTBL0");
    assert_eq!(&id.groups[0].lptbl.pairs[..], &[0, 1, 2, 3]);
}

#[test]
fn transport_failure_is_an_io_error() {
    let t = MockTransport::with_responder(
        256,
        Box::new(|_: &CommandBytes, _: Option<&mut [u8]>| Err(TransportError::Timeout)),
    );
    let err = admin::identity(t.as_ref(), 1, &Config::default()).unwrap_err();
    assert_eq!(err, Error::Io(TransportError::Timeout));
    assert_eq!(err.errno(), -5);
}
