//! Byte order of fixed-width numbers.
//!
//! The swaps are plain shifts and masks, so they are usable in constants.

/// A byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// The byte order of the target.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Endian = Endian::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: Endian = Endian::Big;

    pub const fn is_native(self) -> bool {
        matches!(
            (self, Self::NATIVE),
            (Endian::Little, Endian::Little) | (Endian::Big, Endian::Big)
        )
    }
}

impl Default for Endian {
    fn default() -> Self {
        Endian::NATIVE
    }
}

pub const fn swap16(n: u16) -> u16 {
    (n << 8) | (n >> 8)
}

pub const fn swap32(n: u32) -> u32 {
    let n = ((n << 8) & 0xff00_ff00) | ((n >> 8) & 0x00ff_00ff);
    (n << 16) | (n >> 16)
}

pub const fn swap64(n: u64) -> u64 {
    let n = ((n << 8) & 0xff00_ff00_ff00_ff00) | ((n >> 8) & 0x00ff_00ff_00ff_00ff);
    let n = ((n << 16) & 0xffff_0000_ffff_0000) | ((n >> 16) & 0x0000_ffff_0000_ffff);
    (n << 32) | (n >> 32)
}

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width value that can be stored as bytes in either order.
///
/// Implemented for the primitive integers up to 64 bits, the floats and `bool`.
pub trait Scalar: Copy + Default + sealed::Sealed {
    /// The in-memory representation.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    const SIZE: usize;

    /// Reverse the byte order.
    fn swap(self) -> Self;

    /// The bytes of the value in native order.
    fn encode_ne(self) -> Self::Bytes;

    fn decode_ne(bytes: Self::Bytes) -> Self;
}

/// Convert between native order and `target`.
///
/// The conversion is its own inverse, it serves both directions.
pub fn fit_endian<T: Scalar>(target: Endian, value: T) -> T {
    if target.is_native() {
        value
    } else {
        value.swap()
    }
}

macro_rules! scalar {
    ($ty:ty, |$v:ident| $swap:expr) => {
        impl sealed::Sealed for $ty {}

        impl Scalar for $ty {
            type Bytes = [u8; core::mem::size_of::<$ty>()];

            const SIZE: usize = core::mem::size_of::<$ty>();

            fn swap(self) -> Self {
                let $v = self;
                $swap
            }

            fn encode_ne(self) -> Self::Bytes {
                <$ty>::to_ne_bytes(self)
            }

            fn decode_ne(bytes: Self::Bytes) -> Self {
                <$ty>::from_ne_bytes(bytes)
            }
        }
    };
}

scalar!(u8, |n| n);
scalar!(i8, |n| n);
scalar!(u16, |n| swap16(n));
scalar!(i16, |n| swap16(n as u16) as i16);
scalar!(u32, |n| swap32(n));
scalar!(i32, |n| swap32(n as u32) as i32);
scalar!(u64, |n| swap64(n));
scalar!(i64, |n| swap64(n as u64) as i64);
scalar!(f32, |n| f32::from_bits(swap32(n.to_bits())));
scalar!(f64, |n| f64::from_bits(swap64(n.to_bits())));

impl sealed::Sealed for bool {}

impl Scalar for bool {
    type Bytes = [u8; 1];

    const SIZE: usize = 1;

    fn swap(self) -> Self {
        self
    }

    fn encode_ne(self) -> [u8; 1] {
        [self as u8]
    }

    fn decode_ne(bytes: [u8; 1]) -> Self {
        bytes[0] != 0
    }
}

#[test]
fn swaps_reverse_bytes() {
    assert_eq!(swap16(0x0102), 0x0201);
    assert_eq!(swap32(0x0102_0304), 0x0403_0201);
    assert_eq!(swap64(0x0102_0304_0506_0708), 0x0807_0605_0403_0201);

    for n in [0u64, 1, 0xdead_beef, u64::MAX, 0x8000_0000_0000_0001] {
        assert_eq!(swap64(n), n.swap_bytes());
        assert_eq!(swap32(n as u32), (n as u32).swap_bytes());
        assert_eq!(swap16(n as u16), (n as u16).swap_bytes());
    }
}

#[test]
fn fitting_is_an_involution() {
    let foreign = match Endian::NATIVE {
        Endian::Little => Endian::Big,
        Endian::Big => Endian::Little,
    };

    assert_eq!(fit_endian(Endian::NATIVE, 0x1234u16), 0x1234);
    assert_eq!(fit_endian(foreign, 0x1234u16), 0x3412);
    assert_eq!(fit_endian(foreign, fit_endian(foreign, -2i32)), -2);
    assert_eq!(fit_endian(foreign, fit_endian(foreign, 1.5f64)), 1.5);
    assert_eq!(fit_endian(foreign, 0x7fu8), 0x7f);
    assert!(fit_endian(foreign, true));
}

#[test]
fn encoded_order_matches_target() {
    let value = 0x0102_0304u32;
    assert_eq!(fit_endian(Endian::Big, value).encode_ne(), value.to_be_bytes());
    assert_eq!(fit_endian(Endian::Little, value).encode_ne(), value.to_le_bytes());
}
