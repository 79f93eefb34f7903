//! Byte/word size constants and the handful of log2 helpers used throughout
//! region and bitmap arithmetic.

/// log2 of the number of bytes in a byte
pub const LOG_BYTES_IN_BYTE: u8 = 0;
/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a gigabyte
pub const LOG_BYTES_IN_GBYTE: u8 = 30;
/// The number of bytes in a gigabyte
pub const BYTES_IN_GBYTE: usize = 1 << LOG_BYTES_IN_GBYTE;

#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in a machine word
pub const LOG_BYTES_IN_WORD: u8 = 3;
#[cfg(target_pointer_width = "32")]
pub const LOG_BYTES_IN_WORD: u8 = 2;
/// The number of bytes in a machine word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// The minimum alignment, in bytes, any object start is guaranteed to have.
/// A region's `top` always sits on one of these boundaries.
pub const LOG_MIN_OBJECT_ALIGNMENT: u8 = LOG_BYTES_IN_WORD;
pub const MIN_OBJECT_ALIGNMENT: usize = 1 << LOG_MIN_OBJECT_ALIGNMENT;

/// Smallest region size an embedder may configure.
pub const MIN_REGION_SIZE_BYTES: usize = BYTES_IN_MBYTE;
/// Largest region size an embedder may configure.
pub const MAX_REGION_SIZE_BYTES: usize = 32 * BYTES_IN_MBYTE;
/// Default region size when the embedder doesn't pick one.
pub const DEFAULT_REGION_SIZE_BYTES: usize = 2 * BYTES_IN_MBYTE;
