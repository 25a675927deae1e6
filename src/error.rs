use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalosharpError {
    #[error("Kernel size must be an odd number >= 3, got {size}")]
    InvalidKernelSize { size: usize },

    #[error("Kernel size {size} is too large: centre weight overflows i32")]
    KernelTooLarge { size: usize },

    #[error("Image load error: {0}")]
    ImageLoad(String),

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Partition error: {0}")]
    Partition(String),

    #[error("Communication error: {0}")]
    Comm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HalosharpError>;
