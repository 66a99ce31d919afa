use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Channel counts are not divisible by the packing/blocking factors of
    /// the kernel variant. Nothing has been written to the output.
    #[error("channel count mismatch: ch_im_in={ch_im_in} must be a multiple of {in_factor}, ch_im_out={ch_im_out} must be a multiple of {out_factor}")]
    SizeMismatch {
        ch_im_in: usize,
        ch_im_out: usize,
        in_factor: usize,
        out_factor: usize,
    },
    #[error("{buffer} buffer too small: need {needed} elements, got {got}")]
    BufferTooSmall {
        buffer: &'static str,
        needed: usize,
        got: usize,
    },
}

impl KernelError {
    pub(crate) fn check_len(buffer: &'static str, needed: usize, got: usize) -> Result<(), Self> {
        if got < needed {
            return Err(KernelError::BufferTooSmall { buffer, needed, got });
        }
        Ok(())
    }
}
