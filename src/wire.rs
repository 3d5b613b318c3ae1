//! Fixed-layout, little-endian payload records for gather/scatter callbacks.
//!
//! Interface messages carry no header, length prefix, or per-record tag:
//! just `item_size`-byte records in coupling order. Callbacks that move
//! numeric data can use these Pod wrappers to stay layout-stable across
//! heterogeneous ranks.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn cast_slice_from<T: Pod>(v: &[u8]) -> &[T] {
    bytemuck::cast_slice(v)
}

/// A `u64` carried on the wire.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireU64 {
    v_le: u64,
}

impl WireU64 {
    pub const SIZE: usize = 8;

    pub fn of(v: u64) -> Self {
        Self { v_le: v.to_le() }
    }

    pub fn get(&self) -> u64 {
        u64::from_le(self.v_le)
    }

    /// Serialize into an exactly [`SIZE`](Self::SIZE)-byte item slice.
    pub fn write(self, buf: &mut [u8]) {
        buf.copy_from_slice(cast_slice(std::slice::from_ref(&self)));
    }

    /// Deserialize from an item slice; tolerates unaligned buffers, which
    /// message payloads generally are.
    pub fn read(buf: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(buf)
    }
}

/// An `f64` carried on the wire as its little-endian bit pattern.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireF64 {
    bits_le: u64,
}

impl WireF64 {
    pub const SIZE: usize = 8;

    pub fn of(v: f64) -> Self {
        Self {
            bits_le: v.to_bits().to_le(),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }

    pub fn write(self, buf: &mut [u8]) {
        buf.copy_from_slice(cast_slice(std::slice::from_ref(&self)));
    }

    pub fn read(buf: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(buf)
    }
}

const_assert_eq!(std::mem::size_of::<WireU64>(), WireU64::SIZE);
const_assert_eq!(std::mem::size_of::<WireF64>(), WireF64::SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_roundtrip_through_bytes() {
        let mut buf = [0u8; WireU64::SIZE];
        WireU64::of(u64::MAX - 1).write(&mut buf);
        assert_eq!(WireU64::read(&buf).get(), u64::MAX - 1);
    }

    #[test]
    fn f64_roundtrip_through_bytes() {
        let mut buf = [0u8; WireF64::SIZE];
        WireF64::of(-2.5).write(&mut buf);
        assert_eq!(WireF64::read(&buf).get(), -2.5);
    }

    #[test]
    fn read_tolerates_unaligned_buffers() {
        let mut backing = [0u8; WireU64::SIZE + 1];
        WireU64::of(0xDEAD_BEEF).write(&mut backing[1..]);
        assert_eq!(WireU64::read(&backing[1..]).get(), 0xDEAD_BEEF);
    }
}
