// Tue Jan 13 2026 - Alex

use std::fmt;

/// Page protection, using the `VM_PROT_*` bit layout found in segment
/// commands (`initprot` / `maxprot`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protection {
    None = 0,
    Read = 1,
    Write = 2,
    ReadWrite = 3,
    Execute = 4,
    ReadExecute = 5,
    WriteExecute = 6,
    ReadWriteExecute = 7,
}

impl Protection {
    pub fn from_flags(flags: u32) -> Self {
        match flags & 7 {
            0 => Self::None,
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::ReadWrite,
            4 => Self::Execute,
            5 => Self::ReadExecute,
            6 => Self::WriteExecute,
            _ => Self::ReadWriteExecute,
        }
    }

    pub fn to_flags(self) -> u32 {
        self as u32
    }

    pub fn can_read(self) -> bool {
        self.to_flags() & 1 != 0
    }

    pub fn can_write(self) -> bool {
        self.to_flags() & 2 != 0
    }

    pub fn can_execute(self) -> bool {
        self.to_flags() & 4 != 0
    }

    /// Same protection with write access added.
    pub fn with_write(self) -> Self {
        Self::from_flags(self.to_flags() | 2)
    }

    pub fn without_write(self) -> Self {
        Self::from_flags(self.to_flags() & !2)
    }

    #[cfg(unix)]
    pub fn to_prot(self) -> libc::c_int {
        let mut prot = libc::PROT_NONE;
        if self.can_read() {
            prot |= libc::PROT_READ;
        }
        if self.can_write() {
            prot |= libc::PROT_WRITE;
        }
        if self.can_execute() {
            prot |= libc::PROT_EXEC;
        }
        prot
    }

    /// Mach protection for `mach_vm_protect`. Writable requests carry
    /// `VM_PROT_COPY` so shared copy-on-write pages get a private copy.
    #[cfg(target_os = "macos")]
    pub fn to_vm_prot(self) -> mach2::vm_prot::vm_prot_t {
        use mach2::vm_prot::{VM_PROT_COPY, VM_PROT_EXECUTE, VM_PROT_NONE, VM_PROT_READ, VM_PROT_WRITE};
        let mut prot = VM_PROT_NONE;
        if self.can_read() {
            prot |= VM_PROT_READ;
        }
        if self.can_write() {
            prot |= VM_PROT_WRITE | VM_PROT_COPY;
        }
        if self.can_execute() {
            prot |= VM_PROT_EXECUTE;
        }
        prot
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.can_read() { 'r' } else { '-' };
        let w = if self.can_write() { 'w' } else { '-' };
        let x = if self.can_execute() { 'x' } else { '-' };
        write!(f, "{}{}{}", r, w, x)
    }
}
