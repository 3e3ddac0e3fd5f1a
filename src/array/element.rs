//! Typed access to little-endian pixel buffers.

/// A pixel element that can be decoded from and encoded to little-endian
/// bytes, and averaged.
pub trait Element: Copy + Send + Sync + 'static {
    /// Size in bytes.
    const SIZE: usize;

    /// Decode from the first `SIZE` bytes of `bytes`.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode into the first `SIZE` bytes of `out`.
    fn write_le(self, out: &mut [u8]);

    fn to_f64(self) -> f64;

    /// Convert an arithmetic mean back to this type.
    ///
    /// Integer types round half away from zero and saturate at the type's
    /// range.
    fn from_mean(mean: f64) -> Self;
}

macro_rules! impl_int_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_mean(mean: f64) -> Self {
                    // `as` saturates for out-of-range floats
                    mean.round() as $t
                }
            }
        )*
    };
}

impl_int_element!(u8, u16, u32, u64, i8, i16, i32, i64);

impl Element for f32 {
    const SIZE: usize = 4;

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_mean(mean: f64) -> Self {
        mean as f32
    }
}

impl Element for f64 {
    const SIZE: usize = 8;

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_mean(mean: f64) -> Self {
        mean
    }
}

/// Encode a slice of elements as little-endian bytes.
pub fn encode_elements<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * T::SIZE];
    for (value, slot) in values.iter().zip(out.chunks_exact_mut(T::SIZE)) {
        value.write_le(slot);
    }
    out
}

/// Decode little-endian bytes into elements. Trailing partial elements are
/// ignored.
pub fn decode_elements<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::read_le).collect()
}

/// Run `$body` with `$T` bound to the Rust element type of `$dtype`.
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::array::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::array::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::array::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::array::DataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::array::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::array::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::array::DataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::array::DataType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::array::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::array::DataType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_dtype;
