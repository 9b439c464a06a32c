// SPDX-License-Identifier: MPL-2.0
//! Contract of the block/request-queue transport underneath the shim.
//!
//! The transport owns the submission and completion queues, the request tags and the DMA
//! pools. The shim hands it fully marshaled 64-byte commands and gets completions back
//! through the callbacks defined here.
use crate::error;
use crate::structs::CommandBuffer;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Size of one NVMe submission queue entry.
pub const COMMAND_SIZE: usize = 64;

/// A marshaled command, ready for the submission queue.
pub type CommandBytes = [u8; COMMAND_SIZE];

/// Which queue a synchronous command is placed on.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Queue {
    /// Admin queue of the controller.
    Admin,
    /// I/O queue of the namespace.
    Io,
}

/// Data direction of a request.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Direction {
    /// Device to host.
    Read = 0,
    /// Host to device.
    Write = 1,
}

/// Transport-side failure of a round-trip.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TransportError {
    /// The controller completed the command with a non-zero status field.
    Status(u16),
    /// The command did not complete in time and was aborted.
    Timeout,
    /// No request tag or queue slot was available.
    NoResources,
    /// The controller went away.
    Disconnected,
}

impl TransportError {
    /// Status code in the form the NVMe core hands back from a synchronous submission:
    /// controller status as a positive value, host-side failures as negative errno values.
    pub fn errno(&self) -> i32 {
        match self {
            TransportError::Status(s) => i32::from(*s),
            TransportError::Timeout => -110,
            TransportError::NoResources => -error::ENOMEM,
            TransportError::Disconnected => -19,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Status(s) => write!(f, "status {:#06X}", s),
            TransportError::Timeout => write!(f, "timeout"),
            TransportError::NoResources => write!(f, "no resources"),
            TransportError::Disconnected => write!(f, "controller disconnected"),
        }
    }
}

/// Transport handle for an allocated request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RequestTag(pub u32);

/// Data attached to an I/O request by the generic layer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bio {
    /// Starting 512-byte sector of the transfer.
    pub sector: u64,
    /// Payload; empty for commands that move no data.
    pub data: Vec<u8>,
    /// I/O priority.
    pub prio: u16,
}

/// A caller (user space) buffer that the transport maps into a request.
///
/// The address is opaque to the shim; only the transport dereferences it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct UserBuffer {
    /// User virtual address.
    pub addr: u64,
    /// Length in bytes.
    pub len: usize,
}

/// One in-flight request as handed to the transport.
#[derive(Debug)]
pub struct Request {
    /// Tag obtained from [`Transport::alloc_request`].
    pub tag: RequestTag,
    /// Data direction.
    pub dir: Direction,
    /// Combined command and completion buffer. The transport fills in the completion half
    /// before invoking the end-of-I/O callback.
    pub cmd: Box<CommandBuffer>,
    /// Data of a kernel-originated request.
    pub bio: Option<Bio>,
    /// User buffer mapped into this request, if any.
    pub user: Option<UserBuffer>,
    /// I/O priority.
    pub ioprio: u16,
}

/// Callback the transport runs once a request submitted with
/// [`Transport::execute_nowait`] completes.
pub type EndIo = Box<dyn FnOnce(Request, core::result::Result<(), TransportError>) + Send>;

/// Handle of a DMA pool created by the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DmaPool(pub u64);

/// An element allocated from a [`DmaPool`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DmaAlloc {
    /// CPU virtual address of the element.
    pub cpu_addr: usize,
    /// Bus address of the element as seen by the device.
    pub dma_addr: u64,
}

/// Submission and completion primitives of the underlying transport.
pub trait Transport: Send + Sync {
    /// Maximum hardware sectors (512 bytes each) one request on `queue` may move.
    fn max_hw_sectors(&self, queue: Queue) -> u32;

    /// Submits `cmd` on `queue` and blocks until it completes. `data` is the receive buffer
    /// for commands that return data.
    fn submit_sync(
        &self,
        queue: Queue,
        cmd: &CommandBytes,
        data: Option<&mut [u8]>,
    ) -> core::result::Result<(), TransportError>;

    /// Allocates a request tag on the namespace queue.
    fn alloc_request(&self, dir: Direction) -> core::result::Result<RequestTag, TransportError>;

    /// Returns a request tag.
    fn free_request(&self, tag: RequestTag);

    /// Maps a user buffer into `rq`.
    fn map_user(&self, rq: &mut Request, buf: UserBuffer)
        -> core::result::Result<(), TransportError>;

    /// Undoes [`Transport::map_user`].
    fn unmap_user(&self, rq: &mut Request, buf: UserBuffer);

    /// Queues `rq` and returns without waiting. `done` runs exactly once, at an arbitrary
    /// later point, with the request and the outcome of the round-trip.
    fn execute_nowait(&self, rq: Request, done: EndIo);

    /// Creates a DMA pool of `size`-byte elements aligned to `align`.
    fn dma_pool_create(
        &self,
        name: &str,
        size: usize,
        align: usize,
    ) -> core::result::Result<DmaPool, TransportError>;

    /// Destroys a pool created by [`Transport::dma_pool_create`].
    fn dma_pool_destroy(&self, pool: DmaPool);

    /// Allocates one element from `pool`.
    fn dma_pool_alloc(&self, pool: DmaPool) -> core::result::Result<DmaAlloc, TransportError>;

    /// Returns an element to `pool`.
    fn dma_pool_free(&self, pool: DmaPool, alloc: DmaAlloc);
}
