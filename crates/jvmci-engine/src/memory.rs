//! Raw memory access at absolute native addresses
//!
//! Higher layers that know the host's native layout (constant pools, cache
//! entries, symbols) read through [`UnsafeAccess`]. The backing store is a
//! [`NativeMemory`] implementation: the live process address space, or a
//! simulated arena when running against `hostsim`.

use std::sync::atomic::{fence, Ordering};

use parking_lot::RwLock;

/// Byte-level access to a native address space
pub trait NativeMemory: Send + Sync {
    /// Copy `out.len()` bytes starting at `address`
    fn load(&self, address: u64, out: &mut [u8]);

    /// Copy `bytes` to `address`
    fn store(&self, address: u64, bytes: &[u8]);

    /// Load with acquire ordering relative to concurrent host writes
    fn load_volatile(&self, address: u64, out: &mut [u8]) {
        self.load(address, out);
        fence(Ordering::Acquire);
    }

    /// Store with release ordering
    fn store_volatile(&self, address: u64, bytes: &[u8]) {
        fence(Ordering::Release);
        self.store(address, bytes);
    }
}

macro_rules! typed_access {
    ($get:ident, $get_volatile:ident, $put:ident, $put_volatile:ident, $ty:ty) => {
        #[doc = concat!("Read a `", stringify!($ty), "` at `address`")]
        pub fn $get(&self, address: u64) -> $ty {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            self.memory.load(address, &mut buf);
            <$ty>::from_ne_bytes(buf)
        }

        #[doc = concat!("Volatile read of a `", stringify!($ty), "` at `address`")]
        pub fn $get_volatile(&self, address: u64) -> $ty {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            self.memory.load_volatile(address, &mut buf);
            <$ty>::from_ne_bytes(buf)
        }

        #[doc = concat!("Write a `", stringify!($ty), "` at `address`")]
        pub fn $put(&self, address: u64, value: $ty) {
            self.memory.store(address, &value.to_ne_bytes());
        }

        #[doc = concat!("Volatile write of a `", stringify!($ty), "` at `address`")]
        pub fn $put_volatile(&self, address: u64, value: $ty) {
            self.memory.store_volatile(address, &value.to_ne_bytes());
        }
    };
}

/// Typed reads and writes over a [`NativeMemory`]
///
/// No bounds or validity checks are performed here; callers derive every
/// address from host-provided layout facts.
#[derive(Clone, Copy)]
pub struct UnsafeAccess<'a> {
    memory: &'a dyn NativeMemory,
}

impl<'a> UnsafeAccess<'a> {
    /// Wrap a native memory backend
    pub fn new(memory: &'a dyn NativeMemory) -> Self {
        UnsafeAccess { memory }
    }

    typed_access!(get_byte, get_byte_volatile, put_byte, put_byte_volatile, i8);
    typed_access!(get_short, get_short_volatile, put_short, put_short_volatile, i16);
    typed_access!(get_char, get_char_volatile, put_char, put_char_volatile, u16);
    typed_access!(get_int, get_int_volatile, put_int, put_int_volatile, i32);
    typed_access!(get_long, get_long_volatile, put_long, put_long_volatile, i64);
    typed_access!(get_float, get_float_volatile, put_float, put_float_volatile, f32);
    typed_access!(get_double, get_double_volatile, put_double, put_double_volatile, f64);

    /// Read an unsigned byte
    pub fn get_ubyte(&self, address: u64) -> u8 {
        self.get_byte(address) as u8
    }

    /// Read a pointer-sized word
    pub fn get_address(&self, address: u64) -> u64 {
        self.get_long(address) as u64
    }

    /// Volatile read of a pointer-sized word
    pub fn get_address_volatile(&self, address: u64) -> u64 {
        self.get_long_volatile(address) as u64
    }

    /// Write a pointer-sized word
    pub fn put_address(&self, address: u64, value: u64) {
        self.put_long(address, value as i64)
    }

    /// Copy `len` raw bytes starting at `address`
    pub fn get_bytes(&self, address: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.memory.load(address, &mut buf);
        buf
    }
}

/// The live process address space
///
/// Addresses must come from the host VM; reading anything else is undefined.
pub struct ProcessMemory;

impl NativeMemory for ProcessMemory {
    fn load(&self, address: u64, out: &mut [u8]) {
        debug_assert!(address != 0, "null native address");
        // Safety: the host guarantees `address` names `out.len()` readable bytes
        unsafe {
            std::ptr::copy_nonoverlapping(address as usize as *const u8, out.as_mut_ptr(), out.len());
        }
    }

    fn store(&self, address: u64, bytes: &[u8]) {
        debug_assert!(address != 0, "null native address");
        // Safety: the host guarantees `address` names `bytes.len()` writable bytes
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as usize as *mut u8, bytes.len());
        }
    }
}

/// Bump-allocated arena standing in for host metaspace
///
/// Addresses start at `base` and are never reused. Reads outside the arena
/// panic, which turns caller-contract violations into test failures.
pub struct SimulatedMemory {
    base: u64,
    bytes: RwLock<Vec<u8>>,
}

impl SimulatedMemory {
    /// Default arena base, chosen so that no valid address is small
    pub const DEFAULT_BASE: u64 = 0x7f00_0000_0000;

    /// Create an empty arena at [`Self::DEFAULT_BASE`]
    pub fn new() -> Self {
        Self::with_base(Self::DEFAULT_BASE)
    }

    /// Create an empty arena at `base`
    pub fn with_base(base: u64) -> Self {
        SimulatedMemory { base, bytes: RwLock::new(Vec::new()) }
    }

    /// Reserve `size` zeroed bytes aligned to `align`, returning the address
    pub fn allocate(&self, size: usize, align: usize) -> u64 {
        let align = align.max(1);
        let mut bytes = self.bytes.write();
        let start = (bytes.len() + align - 1) & !(align - 1);
        bytes.resize(start + size, 0);
        self.base + start as u64
    }

    /// Number of bytes allocated so far
    pub fn used(&self) -> usize {
        self.bytes.read().len()
    }

    fn offset(&self, address: u64, len: usize, used: usize) -> usize {
        let offset = address
            .checked_sub(self.base)
            .unwrap_or_else(|| panic!("address {address:#x} below simulated arena"));
        let offset = offset as usize;
        assert!(offset + len <= used, "access {address:#x}+{len} outside simulated arena");
        offset
    }
}

impl Default for SimulatedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeMemory for SimulatedMemory {
    fn load(&self, address: u64, out: &mut [u8]) {
        let bytes = self.bytes.read();
        let offset = self.offset(address, out.len(), bytes.len());
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
    }

    fn store(&self, address: u64, bytes: &[u8]) {
        let mut arena = self.bytes.write();
        let used = arena.len();
        let offset = self.offset(address, bytes.len(), used);
        arena[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_round_trip() {
        let mem = SimulatedMemory::new();
        let addr = mem.allocate(32, 8);
        let access = UnsafeAccess::new(&mem);

        access.put_int(addr, -7);
        access.put_long(addr + 8, 0x1122_3344_5566_7788);
        access.put_double(addr + 16, 2.5);
        access.put_char(addr + 24, 0xfffe);

        assert_eq!(access.get_int(addr), -7);
        assert_eq!(access.get_long_volatile(addr + 8), 0x1122_3344_5566_7788);
        assert_eq!(access.get_double(addr + 16), 2.5);
        assert_eq!(access.get_char(addr + 24), 0xfffe);
        assert_eq!(access.get_bytes(addr, 4), (-7i32).to_ne_bytes().to_vec());
    }

    #[test]
    fn test_allocation_alignment() {
        let mem = SimulatedMemory::with_base(0x1000);
        let a = mem.allocate(3, 1);
        let b = mem.allocate(8, 8);
        assert_eq!(a, 0x1000);
        assert_eq!(b, 0x1008);
        assert_eq!(mem.used(), 16);
    }

    #[test]
    #[should_panic]
    fn test_out_of_arena_read_panics() {
        let mem = SimulatedMemory::new();
        let addr = mem.allocate(4, 4);
        UnsafeAccess::new(&mem).get_long(addr);
    }

    #[test]
    fn test_process_memory_reads_local_value() {
        let value: i64 = 0x0bad_cafe;
        let address = &value as *const i64 as usize as u64;
        let access = UnsafeAccess::new(&ProcessMemory);
        assert_eq!(access.get_long(address), 0x0bad_cafe);
    }
}
