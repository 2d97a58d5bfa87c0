//! Constant pool decoding over the host's native layout
//!
//! Tags, primitive entries and symbols are read directly from host memory
//! using offsets from [`HotSpotVmConfig`](crate::config::HotSpotVmConfig).
//! Anything that needs linking goes through the bridge.

mod bytecode;
mod cache_entry;
pub mod mutf8;
mod pool;
mod tag;

pub use bytecode::{Bytecode, OperandKind};
pub use cache_entry::CpCacheEntry;
pub use pool::{HotSpotConstantPool, PoolConstant};
pub use tag::{ConstantTag, TagTable};
