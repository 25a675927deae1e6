//! High-pass kernel synthesis and stencil evaluation.

pub mod kernel;
pub mod stencil;

pub use kernel::Kernel;
