use crate::error::KernelError;
use core::fmt;
use core::marker::PhantomData;

/// Element width of a densely packed tensor.
///
/// Elements are packed most-significant bits first: element 0 of a byte lives
/// in its top `BITS` bits.
pub trait Packing: Copy + Default + fmt::Debug + Send + Sync + 'static {
    const BITS: u32;
    /// Elements per byte.
    const PER_BYTE: usize = 8 / Self::BITS as usize;
    /// Largest representable value, `2^BITS - 1`.
    const MAX: u8 = ((1u16 << Self::BITS) - 1) as u8;
    /// Elements per 32-bit word, the SIMD block consumed per kernel step.
    const BLOCK: usize = 32 / Self::BITS as usize;

    /// Bit offset of element `idx` inside its byte.
    #[inline(always)]
    fn shift(idx: usize) -> u32 {
        8 - Self::BITS * ((idx % Self::PER_BYTE) as u32 + 1)
    }

    #[inline(always)]
    fn get(bytes: &[u8], idx: usize) -> u8 {
        (bytes[idx / Self::PER_BYTE] >> Self::shift(idx)) & Self::MAX
    }

    /// Overwrites element `idx`, leaving its byte neighbours untouched.
    /// `value` is truncated to `BITS`.
    #[inline(always)]
    fn set(bytes: &mut [u8], idx: usize, value: u8) {
        let shift = Self::shift(idx);
        let mask = Self::MAX << shift;
        let byte = &mut bytes[idx / Self::PER_BYTE];
        *byte = (*byte & !mask) | ((value & Self::MAX) << shift);
    }

    /// Reads the four logical elements `first..first + 4`. `first` must be a
    /// multiple of 4.
    fn quad(bytes: &[u8], first: usize) -> [u8; 4];

    /// Number of bytes needed to hold `elements` values.
    #[inline]
    fn bytes_for(elements: usize) -> usize {
        elements.div_ceil(Self::PER_BYTE)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct U2;
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct U4;
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct U8;

impl Packing for U2 {
    const BITS: u32 = 2;

    #[inline(always)]
    fn quad(bytes: &[u8], first: usize) -> [u8; 4] {
        let b = bytes[first >> 2];
        [b >> 6, (b >> 4) & 0x3, (b >> 2) & 0x3, b & 0x3]
    }
}

impl Packing for U4 {
    const BITS: u32 = 4;

    #[inline(always)]
    fn quad(bytes: &[u8], first: usize) -> [u8; 4] {
        let i = first >> 1;
        let (b0, b1) = (bytes[i], bytes[i + 1]);
        [b0 >> 4, b0 & 0xF, b1 >> 4, b1 & 0xF]
    }
}

impl Packing for U8 {
    const BITS: u32 = 8;

    #[inline(always)]
    fn get(bytes: &[u8], idx: usize) -> u8 {
        bytes[idx]
    }

    #[inline(always)]
    fn set(bytes: &mut [u8], idx: usize, value: u8) {
        bytes[idx] = value;
    }

    #[inline(always)]
    fn quad(bytes: &[u8], first: usize) -> [u8; 4] {
        [bytes[first], bytes[first + 1], bytes[first + 2], bytes[first + 3]]
    }
}

/// Read-only view over a packed tensor.
#[derive(Clone, Copy)]
pub struct Packed<'a, P: Packing> {
    bytes: &'a [u8],
    _packing: PhantomData<P>,
}

impl<'a, P: Packing> Packed<'a, P> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            _packing: PhantomData,
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Capacity in elements.
    pub fn len_elements(&self) -> usize {
        self.bytes.len() * P::PER_BYTE
    }

    #[inline(always)]
    pub fn get(&self, idx: usize) -> u8 {
        P::get(self.bytes, idx)
    }

    /// Bytes starting at element `elem`, which must sit on a byte boundary.
    #[inline(always)]
    pub fn from_element(&self, elem: usize) -> &'a [u8] {
        debug_assert_eq!(elem % P::PER_BYTE, 0, "element {} is not byte aligned", elem);
        &self.bytes[elem / P::PER_BYTE..]
    }
}

impl<P: Packing> fmt::Debug for Packed<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packed")
            .field("bits", &P::BITS)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Mutable view over a packed tensor.
pub struct PackedMut<'a, P: Packing> {
    bytes: &'a mut [u8],
    _packing: PhantomData<P>,
}

impl<'a, P: Packing> PackedMut<'a, P> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self {
            bytes,
            _packing: PhantomData,
        }
    }

    pub fn len_elements(&self) -> usize {
        self.bytes.len() * P::PER_BYTE
    }

    #[inline(always)]
    pub fn get(&self, idx: usize) -> u8 {
        P::get(self.bytes, idx)
    }

    #[inline(always)]
    pub fn set(&mut self, idx: usize, value: u8) {
        P::set(self.bytes, idx, value)
    }

    /// Packs `values` (one logical element per entry) starting at element 0.
    pub fn fill_from(&mut self, values: &[u8]) {
        for (i, &v) in values.iter().enumerate() {
            P::set(self.bytes, i, v);
        }
    }
}

impl<P: Packing> fmt::Debug for PackedMut<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedMut")
            .field("bits", &P::BITS)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Weight zero-point, shared by all filters or given per output channel.
#[derive(Debug, Clone, Copy)]
pub enum WeightOffsets<'a> {
    Scalar(u8),
    PerChannel(&'a [u8]),
}

impl WeightOffsets<'_> {
    #[inline(always)]
    pub fn get(&self, ch: usize) -> u8 {
        match self {
            WeightOffsets::Scalar(z) => *z,
            WeightOffsets::PerChannel(z) => z[ch],
        }
    }

    pub(crate) fn check(&self, ch_im_out: usize) -> Result<(), KernelError> {
        match self {
            WeightOffsets::Scalar(_) => Ok(()),
            WeightOffsets::PerChannel(z) => KernelError::check_len("weight zero-point", ch_im_out, z.len()),
        }
    }
}
