use std::fmt;

use crate::common::{PageId, RecordId, SlotId};

/// Fixed-width value that can live inside a tree page.
pub trait Storable: Copy + Send + Sync + fmt::Debug + 'static {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Writes `self` into `buf[..SIZE]`.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a value from `buf[..SIZE]`.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_storable_int {
    ($($t:ty),*) => {
        $(
            impl Storable for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn encode(&self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn decode(buf: &[u8]) -> Self {
                    <$t>::from_le_bytes(buf[..Self::SIZE].try_into().unwrap())
                }
            }
        )*
    };
}

impl_storable_int!(i32, i64, u32, u64);

impl Storable for PageId {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        self.as_u32().encode(buf);
    }

    fn decode(buf: &[u8]) -> Self {
        PageId::new(u32::decode(buf))
    }
}

impl Storable for RecordId {
    const SIZE: usize = 6; // page id + slot

    fn encode(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.page_id.as_u32().to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot_id.as_u16().to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        RecordId::new(
            PageId::new(u32::from_le_bytes(buf[..4].try_into().unwrap())),
            SlotId::new(u16::from_le_bytes(buf[4..6].try_into().unwrap())),
        )
    }
}

/// Opaque fixed-width index key. Integer keys are stored little-endian in
/// the leading bytes, zero-padded to `N`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn new(data: [u8; N]) -> Self {
        Self { data }
    }

    /// Builds a key from raw bytes, truncating or zero-padding to `N`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Interprets the leading (up to 8) bytes as a signed little-endian integer.
    pub fn to_integer(&self) -> i64 {
        let mut raw = [0u8; 8];
        let len = N.min(8);
        raw[..len].copy_from_slice(&self.data[..len]);
        if len < 8 && raw[len - 1] & 0x80 != 0 {
            raw[len..].fill(0xff);
        }
        i64::from_le_bytes(raw)
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{}>({})", N, self.to_integer())
    }
}

impl<const N: usize> fmt::Display for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_integer())
    }
}

impl<const N: usize> Storable for GenericKey<N> {
    const SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Self {
        Self::from_bytes(&buf[..N])
    }
}

/// Conversion used by the bulk load helpers and tests to build keys and
/// values out of plain integers.
pub trait FromInteger {
    fn from_integer(value: i64) -> Self;
}

impl FromInteger for i32 {
    fn from_integer(value: i64) -> Self {
        value as i32
    }
}

impl FromInteger for i64 {
    fn from_integer(value: i64) -> Self {
        value
    }
}

impl FromInteger for u32 {
    fn from_integer(value: i64) -> Self {
        value as u32
    }
}

impl FromInteger for u64 {
    fn from_integer(value: i64) -> Self {
        value as u64
    }
}

impl<const N: usize> FromInteger for GenericKey<N> {
    fn from_integer(value: i64) -> Self {
        Self::from_bytes(&value.to_le_bytes())
    }
}

/// High 32 bits become the page id, low bits the slot.
impl FromInteger for RecordId {
    fn from_integer(value: i64) -> Self {
        RecordId::new(
            PageId::new((value >> 32) as u32),
            SlotId::new(value as u16),
        )
    }
}
