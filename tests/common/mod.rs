// SPDX-License-Identifier: MPL-2.0
#![allow(dead_code)]
//! Scripted transport and a thread-parking executor shared by the integration tests.
use lightnvm::commands::CompletionEntry;
use lightnvm::transport::*;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use std::time::Duration;

pub type Responder =
    Box<dyn FnMut(&CommandBytes, Option<&mut [u8]>) -> Result<(), TransportError> + Send>;

/// Outcome the mock reports for an asynchronous request.
#[derive(Clone, Copy, Debug)]
pub struct Outcome {
    pub result: u64,
    pub status: u16,
    pub res: Result<(), TransportError>,
}

impl Outcome {
    pub fn ok(result: u64) -> Self {
        Outcome {
            result,
            status: 0,
            res: Ok(()),
        }
    }
}

pub struct MockTransport {
    pub admin_max_sectors: u32,
    pub io_max_sectors: u32,
    responder: Mutex<Responder>,
    pub submitted: Mutex<Vec<(Queue, CommandBytes)>>,
    pending: Mutex<VecDeque<(Request, EndIo)>>,
    /// When set, asynchronous requests complete on a helper thread after a short delay.
    pub auto_complete: Mutex<Option<Outcome>>,
    pub fail_alloc: AtomicBool,
    pub fail_map: AtomicBool,
    pub allocated: AtomicUsize,
    pub freed: AtomicUsize,
    pub mapped: AtomicUsize,
    pub unmapped: AtomicUsize,
    pub pools: AtomicUsize,
    pub pool_allocs: AtomicUsize,
    pub pool_frees: AtomicUsize,
    pub last_pool: Mutex<Option<(String, usize, usize)>>,
    next_tag: AtomicUsize,
}

impl MockTransport {
    pub fn new(admin_max_sectors: u32) -> Arc<Self> {
        Self::with_responder(
            admin_max_sectors,
            Box::new(|_: &CommandBytes, _: Option<&mut [u8]>| Ok(())),
        )
    }

    pub fn with_responder(admin_max_sectors: u32, responder: Responder) -> Arc<Self> {
        Arc::new(MockTransport {
            admin_max_sectors,
            io_max_sectors: 256,
            responder: Mutex::new(responder),
            submitted: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            auto_complete: Mutex::new(None),
            fail_alloc: AtomicBool::new(false),
            fail_map: AtomicBool::new(false),
            allocated: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
            mapped: AtomicUsize::new(0),
            unmapped: AtomicUsize::new(0),
            pools: AtomicUsize::new(0),
            pool_allocs: AtomicUsize::new(0),
            pool_frees: AtomicUsize::new(0),
            last_pool: Mutex::new(None),
            next_tag: AtomicUsize::new(1),
        })
    }

    pub fn submitted(&self) -> Vec<(Queue, CommandBytes)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Completes the oldest queued request.
    pub fn complete_next(&self, outcome: Outcome) {
        let next = self.pending.lock().unwrap().pop_front();
        let (rq, done) = next.expect("no request in flight");
        finish(rq, done, outcome);
    }
}

fn finish(mut rq: Request, done: EndIo, outcome: Outcome) {
    rq.cmd.completion = CompletionEntry {
        result: outcome.result,
        sq_head: 0,
        sq_id: 1,
        command_id: rq.tag.0 as u16,
        status: outcome.status,
    }
    .encode();
    done(rq, outcome.res);
}

impl Transport for MockTransport {
    fn max_hw_sectors(&self, queue: Queue) -> u32 {
        match queue {
            Queue::Admin => self.admin_max_sectors,
            Queue::Io => self.io_max_sectors,
        }
    }

    fn submit_sync(
        &self,
        queue: Queue,
        cmd: &CommandBytes,
        data: Option<&mut [u8]>,
    ) -> Result<(), TransportError> {
        self.submitted.lock().unwrap().push((queue, *cmd));
        let mut responder = self.responder.lock().unwrap();
        (*responder)(cmd, data)
    }

    fn alloc_request(&self, _dir: Direction) -> Result<RequestTag, TransportError> {
        if self.fail_alloc.load(Ordering::SeqCst) {
            return Err(TransportError::NoResources);
        }
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(RequestTag(self.next_tag.fetch_add(1, Ordering::SeqCst) as u32))
    }

    fn free_request(&self, _tag: RequestTag) {
        self.freed.fetch_add(1, Ordering::SeqCst);
    }

    fn map_user(&self, _rq: &mut Request, _buf: UserBuffer) -> Result<(), TransportError> {
        if self.fail_map.load(Ordering::SeqCst) {
            return Err(TransportError::NoResources);
        }
        self.mapped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unmap_user(&self, _rq: &mut Request, _buf: UserBuffer) {
        self.unmapped.fetch_add(1, Ordering::SeqCst);
    }

    fn execute_nowait(&self, rq: Request, done: EndIo) {
        self.submitted
            .lock()
            .unwrap()
            .push((Queue::Io, rq.cmd.command));
        let auto = *self.auto_complete.lock().unwrap();
        match auto {
            Some(outcome) => {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(20));
                    finish(rq, done, outcome);
                });
            }
            None => self.pending.lock().unwrap().push_back((rq, done)),
        }
    }

    fn dma_pool_create(
        &self,
        name: &str,
        size: usize,
        align: usize,
    ) -> Result<DmaPool, TransportError> {
        let id = self.pools.fetch_add(1, Ordering::SeqCst);
        *self.last_pool.lock().unwrap() = Some((name.to_string(), size, align));
        Ok(DmaPool(id as u64 + 1))
    }

    fn dma_pool_destroy(&self, _pool: DmaPool) {
        self.pools.fetch_sub(1, Ordering::SeqCst);
    }

    fn dma_pool_alloc(&self, pool: DmaPool) -> Result<DmaAlloc, TransportError> {
        let n = self.pool_allocs.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(DmaAlloc {
            cpu_addr: 0x1000 * (n as usize + 1),
            dma_addr: (pool.0 << 32) | (0x1000 * (n + 1)),
        })
    }

    fn dma_pool_free(&self, _pool: DmaPool, _alloc: DmaAlloc) {
        self.pool_frees.fetch_add(1, Ordering::SeqCst);
    }
}

struct ThreadWaker(thread::Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

/// Drives `fut` to completion on the current thread, parking while it is pending.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = std::pin::pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => return out,
            Poll::Pending => thread::park(),
        }
    }
}

/// Polls `fut` a single time on the current thread.
pub fn poll_once<F: Future + ?Sized>(fut: Pin<&mut F>) -> Poll<F::Output> {
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    fut.poll(&mut Context::from_waker(&waker))
}

/// Reads a little-endian field out of a marshaled command.
pub fn le(cmd: &CommandBytes, offset: usize, width: usize) -> u64 {
    cmd[offset..offset + width]
        .iter()
        .rev()
        .fold(0, |acc, &b| (acc << 8) | u64::from(b))
}
