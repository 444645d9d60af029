use std::io;
use std::ptr::{self, NonNull};

use tracing::warn;

use crate::error::CaptureError;
use crate::platform::SharedSegment;

/// A private SysV shared memory segment mapped into this process.
pub struct SysvSegment {
    id: libc::c_int,
    address: NonNull<u8>,
    len: usize,
}

// The mapping is owned exclusively; access goes through &self/&mut self.
unsafe impl Send for SysvSegment {}

impl SysvSegment {
    pub fn create(len: usize) -> Result<Self, CaptureError> {
        if len == 0 {
            return Err(CaptureError::Resource("refusing to create an empty shared memory segment".into()));
        }
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, len, libc::IPC_CREAT | 0o600) };
        if id == -1 {
            return Err(CaptureError::Resource(format!("shmget({} bytes): {}", len, io::Error::last_os_error())));
        }
        let address = unsafe { libc::shmat(id, ptr::null(), 0) };
        if address as isize == -1 {
            let error = io::Error::last_os_error();
            unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()); }
            return Err(CaptureError::Resource(format!("shmat(segment {}): {}", id, error)));
        }
        let Some(address) = NonNull::new(address as *mut u8) else {
            unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()); }
            return Err(CaptureError::Resource(format!("shmat(segment {}) returned null", id)));
        };
        Ok(Self { id, address, len })
    }
}

impl SharedSegment for SysvSegment {
    fn id(&self) -> i32 {
        self.id
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.address.as_ptr(), self.len) }
    }
}

impl Drop for SysvSegment {
    fn drop(&mut self) {
        unsafe {
            if libc::shmdt(self.address.as_ptr() as *const libc::c_void) == -1 {
                warn!(segment = self.id, error = %io::Error::last_os_error(), "shmdt failed");
            }
            if libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) == -1 {
                warn!(segment = self.id, error = %io::Error::last_os_error(), "shmctl(IPC_RMID) failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_is_zeroed_and_sized() {
        let segment = SysvSegment::create(4096).unwrap();
        assert_eq!(segment.len(), 4096);
        assert!(segment.as_bytes().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn empty_segment_is_rejected() {
        assert!(matches!(SysvSegment::create(0), Err(CaptureError::Resource(_))));
    }
}
