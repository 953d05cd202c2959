//! Heap-free collection building blocks shared by the scheduler, VM
//! manager, and device layer: a page-frame bitmap, an intrusive index list,
//! and a bounded byte FIFO.

pub mod bitmap;
pub mod fifo;
pub mod list;

pub use bitmap::Bitmap;
pub use fifo::ByteFifo;
pub use list::{IndexList, Link, LinkArena};
