// SPDX-License-Identifier: MPL-2.0
mod common;

use anyhow::anyhow;
use common::{le, MockTransport};
use lightnvm::commands::IoOpcode;
use lightnvm::lightnvm::{NvmDev, NvmDevOps, NvmRq, PpaAddr, Registrar};
use lightnvm::register::{self, Attributes, Namespace};
use lightnvm::structs::NvmeIdResponse;
use lightnvm::transport::{Bio, CommandBytes, Transport, TransportError};
use lightnvm::{Config, Error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zerocopy::{FromZeros, IntoBytes};

/// Generic layer stand-in: identifies the device on registration and derives its geometry.
#[derive(Default)]
struct Subsystem {
    sec_size: u32,
    fail: bool,
    registered: AtomicUsize,
    unregistered: Mutex<Vec<String>>,
}

impl Registrar for Subsystem {
    fn register(&self, dev: &mut NvmDev) -> lightnvm::Result<()> {
        if self.fail {
            return Err(Error::NoMemory);
        }
        let id = dev.ops.identity()?;
        dev.sec_size = self.sec_size;
        dev.blks_per_lun = u32::from(id.groups[0].num_blk);
        dev.plane_mode = u32::from(id.groups[0].num_pln);
        self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unregister(&self, dev: &NvmDev) {
        self.unregistered.lock().unwrap().push(dev.name.to_string());
    }
}

struct BrokenAttributes;

impl Attributes for BrokenAttributes {
    fn publish(&self, dev: &NvmDev) -> anyhow::Result<()> {
        Err(anyhow!("{}: attribute group already exists", dev.name))
    }
}

/// Answers identify with one SLC group of 512 blocks on 2 planes; I/O succeeds.
fn controller() -> Arc<MockTransport> {
    MockTransport::with_responder(
        256,
        Box::new(|cmd: &CommandBytes, data: Option<&mut [u8]>| {
            if cmd[0] == 0xE2 {
                let mut id = NvmeIdResponse::new_box_zeroed().unwrap();
                id.ver_id = 1;
                id.cgrps = 1;
                id.groups[0].num_blk.set(512);
                id.groups[0].num_pln = 2;
                id.groups[0].csecs.set(4096);
                data.expect("identify needs a buffer")
                    .copy_from_slice(id.as_bytes());
            }
            Ok(())
        }),
    )
}

#[test]
fn registration_derives_the_block_size() {
    let t = controller();
    let transport: Arc<dyn Transport> = t.clone();
    let ns = Arc::new(Namespace::new(7));
    let subsys = Subsystem {
        sec_size: 4096,
        ..Default::default()
    };
    let dev = register::register(
        ns.clone(),
        transport,
        Config::default(),
        "nvme0n7",
        1,
        &subsys,
        None,
    )
    .unwrap();

    assert_eq!(subsys.registered.load(Ordering::SeqCst), 1);
    assert_eq!(dev.name.as_str(), "nvme0n7");
    assert_eq!(dev.node, 1);
    assert_eq!(dev.bb_tbl_blocks(), 1024);
    assert_eq!(ns.lba_shift(), 12);
    assert_eq!(le(&t.submitted()[0].1, 4, 4), 7);

    // Sector 64 of 512 bytes is block 8 of 4096 bytes.
    let mut rqd = NvmRq::new(IoOpcode::HbRead, PpaAddr(0x10), 1);
    rqd.bio = Some(Bio {
        sector: 64,
        data: vec![0; 4096],
        prio: 0,
    });
    dev.ops
        .submit_io(rqd, Box::new(|_: NvmRq, _: Result<(), TransportError>| {}))
        .unwrap();
    let (_, cmd) = t.submitted()[1];
    assert_eq!(cmd[0], 0x02);
    assert_eq!(le(&cmd, 56, 8), 8);
}

#[test]
fn registrar_failure_is_returned() {
    let t = controller();
    let ns = Arc::new(Namespace::new(1));
    let subsys = Subsystem {
        fail: true,
        ..Default::default()
    };
    let err = register::register(ns.clone(), t, Config::default(), "nvme0n1", 0, &subsys, None)
        .unwrap_err();
    assert_eq!(err, Error::NoMemory);
    assert_eq!(ns.lba_shift(), 9);
}

#[test]
fn attribute_failure_is_not_fatal() {
    let t = controller();
    let subsys = Subsystem {
        sec_size: 512,
        ..Default::default()
    };
    let dev = register::register(
        Arc::new(Namespace::new(1)),
        t,
        Config::default(),
        "nvme0n1",
        0,
        &subsys,
        Some(&BrokenAttributes),
    )
    .unwrap();
    assert_eq!(dev.sec_size, 512);

    register::unregister(dev, &subsys);
    assert_eq!(*subsys.unregistered.lock().unwrap(), ["nvme0n1"]);
}

#[test]
fn dma_pools_follow_the_configuration() {
    let t = controller();
    let subsys = Subsystem {
        sec_size: 4096,
        ..Default::default()
    };
    let dev = register::register(
        Arc::new(Namespace::new(1)),
        t.clone(),
        Config::default().with_dma_pool(8192, 512).with_max_phys_sect(32),
        "nvme1n1",
        0,
        &subsys,
        None,
    )
    .unwrap();
    assert_eq!(dev.ops.max_phys_sect(), 32);

    let pool = dev.ops.create_dma_pool("ppalist").unwrap();
    assert_eq!(
        *t.last_pool.lock().unwrap(),
        Some(("ppalist".to_string(), 8192, 512))
    );
    let a = dev.ops.dev_dma_alloc(pool).unwrap();
    let b = dev.ops.dev_dma_alloc(pool).unwrap();
    assert_ne!(a.dma_addr, b.dma_addr);
    dev.ops.dev_dma_free(pool, a);
    dev.ops.dev_dma_free(pool, b);
    dev.ops.destroy_dma_pool(pool);
    assert_eq!(t.pool_allocs.load(Ordering::SeqCst), 2);
    assert_eq!(t.pool_frees.load(Ordering::SeqCst), 2);
    assert_eq!(t.pools.load(Ordering::SeqCst), 0);
}

#[test]
fn default_sector_limit() {
    let t = controller();
    let subsys = Subsystem {
        sec_size: 4096,
        ..Default::default()
    };
    let dev =
        register::register(Arc::new(Namespace::new(1)), t, Config::default(), "n", 0, &subsys, None)
            .unwrap();
    assert_eq!(dev.ops.max_phys_sect(), 64);
}
