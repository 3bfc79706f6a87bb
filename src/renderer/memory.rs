use gfx_hal::{
    adapter::MemoryType, buffer, memory as m, prelude::*, Backend, Limits, MemoryTypeId,
};
use std::fmt;
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

use super::buffer::Buffer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    Empty,
    Buffer(String),
    Image(String),
    NoHostVisibleMemory,
    NoDeviceLocalMemory,
    Allocation(String),
    Bind(String),
    Map(String),
    Flush(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Empty => write!(f, "nothing to upload"),
            UploadError::Buffer(e) => write!(f, "cannot create buffer: {}", e),
            UploadError::Image(e) => write!(f, "cannot create texture image: {}", e),
            UploadError::NoHostVisibleMemory => {
                write!(f, "no host-visible memory type fits the buffer")
            }
            UploadError::NoDeviceLocalMemory => {
                write!(f, "no device-local memory type fits the texture")
            }
            UploadError::Allocation(e) => write!(f, "cannot allocate buffer memory: {}", e),
            UploadError::Bind(e) => write!(f, "cannot bind buffer memory: {}", e),
            UploadError::Map(e) => write!(f, "cannot map buffer memory: {}", e),
            UploadError::Flush(e) => write!(f, "cannot flush buffer memory: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

/// A host-visible buffer plus the memory backing it. The contents are
/// written once at creation and never touched again.
pub struct Memory<'a, B: Backend> {
    pub buffer: ManuallyDrop<Buffer<'a, B>>,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend> Memory<'a, B> {
    pub fn upload(
        device: &'a B::Device,
        bytes: &[u8],
        usage: buffer::Usage,
        memory_types: &[MemoryType],
        limits: &Limits,
    ) -> Result<Self, UploadError> {
        let mut buffer = Buffer::new(device, bytes.len() as u64, usage, limits)?;
        let memory = Self::allocate_gpu_memory(&mut buffer, bytes, memory_types)?;
        Ok(Memory {
            buffer: ManuallyDrop::new(buffer),
            memory,
        })
    }

    fn allocate_gpu_memory(
        buffer: &mut Buffer<'a, B>,
        bytes: &[u8],
        memory_types: &[MemoryType],
    ) -> Result<ManuallyDrop<B::Memory>, UploadError> {
        let device = buffer.device;
        unsafe {
            let buffer_req = device.get_buffer_requirements(&buffer.buf);
            let upload_type = Self::upload_type(memory_types, &buffer_req)?;
            let memory = device
                .allocate_memory(upload_type, buffer_req.size)
                .map_err(|err| UploadError::Allocation(format!("{:?}", err)))?;

            if let Err(err) = Self::write(device, buffer, &memory, bytes) {
                device.free_memory(memory);
                return Err(err);
            }
            Ok(ManuallyDrop::new(memory))
        }
    }

    unsafe fn write(
        device: &B::Device,
        buffer: &mut Buffer<'a, B>,
        memory: &B::Memory,
        bytes: &[u8],
    ) -> Result<(), UploadError> {
        device
            .bind_buffer_memory(memory, 0, &mut buffer.buf)
            .map_err(|err| UploadError::Bind(format!("{:?}", err)))?;
        let mapping = device
            .map_memory(memory, m::Segment::ALL)
            .map_err(|err| UploadError::Map(format!("{:?}", err)))?;
        ptr::copy_nonoverlapping(bytes.as_ptr(), mapping, bytes.len());
        let flushed = device
            .flush_mapped_memory_ranges(iter::once((memory, m::Segment::ALL)))
            .map_err(|err| UploadError::Flush(format!("{:?}", err)));
        device.unmap_memory(memory);
        flushed
    }

    fn upload_type(
        properties: &[MemoryType],
        buffer_req: &m::Requirements,
    ) -> Result<MemoryTypeId, UploadError> {
        memory_type(properties, buffer_req, m::Properties::CPU_VISIBLE)
            .ok_or(UploadError::NoHostVisibleMemory)
    }
}

/// First memory type allowed by `req` that has all of `wanted`.
pub(super) fn memory_type(
    properties: &[MemoryType],
    req: &m::Requirements,
    wanted: m::Properties,
) -> Option<MemoryTypeId> {
    properties
        .iter()
        .enumerate()
        .position(|(id, mem_type)| {
            req.type_mask & (1 << id) != 0 && mem_type.properties.contains(wanted)
        })
        .map(MemoryTypeId::from)
}

impl<'a, B: Backend> Drop for Memory<'a, B> {
    fn drop(&mut self) {
        unsafe {
            let device = self.buffer.device;
            ManuallyDrop::drop(&mut self.buffer);
            device.free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)))
        }
    }
}
