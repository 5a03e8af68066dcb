//! Non-volatile memory programming primitives
//!
//! The flash service (port 10) drives this interface for remote firmware
//! update. Hardware status codes travel back to the requester as-is, so the
//! error type is a raw byte rather than an enum.

/// Raw driver status code. Zero never appears here; success is `Ok(())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NvmStatus(u8);

impl NvmStatus {
    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<NvmStatus> for u8 {
    fn from(value: NvmStatus) -> Self {
        value.into_u8()
    }
}

pub trait Nvm {
    /// Size of one erase page in bytes.
    fn page_size(&self) -> u32;

    fn unlock(&mut self);

    fn lock(&mut self);

    /// Erases `pages` consecutive pages starting at `page_addr`.
    fn erase(&mut self, page_addr: u32, pages: u32) -> Result<(), NvmStatus>;

    /// Programs one aligned 32-bit word.
    fn program_word(&mut self, addr: u32, word: u32) -> Result<(), NvmStatus>;

    /// Reads one aligned 32-bit word.
    fn read_word(&self, addr: u32) -> u32;
}
