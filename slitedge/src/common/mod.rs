//! Shared containers.

pub use common::buffer2::Buffer2;
