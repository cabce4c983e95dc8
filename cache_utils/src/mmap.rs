use core::ffi::c_void;
use core::num::NonZeroUsize;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::slice::{from_raw_parts, from_raw_parts_mut};
use nix::errno::Errno;
use nix::sys::mman;

/// Anonymous private mapping, page aligned, unmapped on drop.
///
/// The address never changes for the lifetime of the value.
#[derive(Debug)]
pub struct MMappedMemory {
    pointer: NonNull<u8>,
    size: usize,
}

impl MMappedMemory {
    pub fn try_new(size: usize) -> nix::Result<MMappedMemory> {
        let length = NonZeroUsize::new(size).ok_or(Errno::EINVAL)?;
        let flags = mman::MapFlags::MAP_PRIVATE | mman::MapFlags::MAP_ANONYMOUS;
        let p: NonNull<c_void> = unsafe {
            mman::mmap_anonymous(
                None,
                length,
                mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE,
                flags,
            )
        }?;
        Ok(MMappedMemory {
            pointer: p.cast(),
            size,
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.pointer.as_ptr()
    }

    pub fn slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.pointer.as_ptr(), self.size) }
    }

    pub fn slice_mut(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.pointer.as_ptr(), self.size) }
    }
}

impl Drop for MMappedMemory {
    fn drop(&mut self) {
        // Nothing sensible to do if this fails.
        let _ = unsafe { mman::munmap(self.pointer.cast(), self.size) };
    }
}

impl Deref for MMappedMemory {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.slice()
    }
}

impl DerefMut for MMappedMemory {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slice_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_write_read() {
        let mut m = MMappedMemory::try_new(1 << 16).unwrap();
        assert_eq!(m.len(), 1 << 16);
        assert_eq!(m.as_ptr() as usize % 4096, 0);
        m.fill(3);
        assert!(m.iter().all(|&b| b == 3));
    }

    #[test]
    fn zero_size_is_rejected() {
        assert_eq!(MMappedMemory::try_new(0).unwrap_err(), Errno::EINVAL);
    }
}
