use gfx_hal::{buffer, prelude::*, Backend, Limits};
use std::mem::ManuallyDrop;
use std::ptr;

use super::memory::UploadError;

/// A buffer object sized for `len` bytes, padded to the device's
/// non-coherent atom size so the whole range can be flushed.
pub struct Buffer<'a, B: Backend> {
    pub device: &'a B::Device,
    pub buf: ManuallyDrop<B::Buffer>,
    pub len: u64,
}

impl<'a, B: Backend> Buffer<'a, B> {
    pub fn new(
        device: &'a B::Device,
        len: u64,
        usage: buffer::Usage,
        limits: &Limits,
    ) -> Result<Self, UploadError> {
        if len == 0 {
            return Err(UploadError::Empty);
        }
        let non_coherent_alignment = limits.non_coherent_atom_size as u64;
        let memory_size = ((len + non_coherent_alignment - 1) / non_coherent_alignment)
            * non_coherent_alignment;

        let buf = unsafe { device.create_buffer(memory_size, usage) }
            .map_err(|err| UploadError::Buffer(format!("{:?}", err)))?;

        Ok(Buffer {
            device,
            buf: ManuallyDrop::new(buf),
            len,
        })
    }
}

impl<'a, B: Backend> Drop for Buffer<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buf)))
        }
    }
}
