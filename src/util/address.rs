//! `Address` represents an arbitrary word-aligned-or-not location in the
//! heap's reserved range and supports address arithmetic mostly in safe Rust,
//! the same shape the teacher's `util::address` module uses (`Address` as a
//! transparent `usize` newtype; `ObjectReference` as a validated `Address`
//! that is never zero).

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use super::constants::*;

/// Size, in bytes.
pub type ByteSize = usize;
/// Signed byte offset.
pub type ByteOffset = isize;

#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq)]
pub struct Address(usize);

impl Address {
    pub const ZERO: Address = Address(0);

    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub const fn from_usize(v: usize) -> Self {
        Address(v)
    }

    #[inline(always)]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn add(self, size: usize) -> Address {
        Address(self.0 + size)
    }

    #[inline(always)]
    pub const fn sub(self, size: usize) -> Address {
        Address(self.0 - size)
    }

    #[inline(always)]
    pub const fn offset(self, offset: ByteOffset) -> Address {
        Address((self.0 as isize + offset) as usize)
    }

    /// Bytes from `self` to `other`. `other` must be `>= self`.
    #[inline(always)]
    pub const fn bytes_until(self, other: Address) -> ByteSize {
        other.0 - self.0
    }

    #[inline(always)]
    pub const fn align_up(self, align: ByteSize) -> Address {
        Address((self.0 + align - 1) & !(align - 1))
    }

    #[inline(always)]
    pub const fn align_down(self, align: ByteSize) -> Address {
        Address(self.0 & !(align - 1))
    }

    #[inline(always)]
    pub const fn is_aligned_to(self, align: usize) -> bool {
        self.0 & (align - 1) == 0
    }

    /// Number of machine words between `self` (aligned down) and `other`.
    #[inline(always)]
    pub fn words_until(self, other: Address) -> usize {
        (other.0 - self.0) >> LOG_BYTES_IN_WORD
    }

    /// Reinterpret this address as an `ObjectReference`. The caller is
    /// responsible for ensuring an object actually starts here; this is the
    /// crate's one deliberately-unchecked conversion, matching the teacher's
    /// `Address::to_object_reference`.
    #[inline(always)]
    pub fn to_object_reference(self) -> Option<ObjectReference> {
        if self.is_zero() {
            None
        } else {
            Some(ObjectReference(self))
        }
    }
}

impl Add<ByteSize> for Address {
    type Output = Address;
    #[inline(always)]
    fn add(self, rhs: ByteSize) -> Address {
        Address(self.0 + rhs)
    }
}

impl AddAssign<ByteSize> for Address {
    #[inline(always)]
    fn add_assign(&mut self, rhs: ByteSize) {
        self.0 += rhs;
    }
}

impl Sub<ByteSize> for Address {
    type Output = Address;
    #[inline(always)]
    fn sub(self, rhs: ByteSize) -> Address {
        Address(self.0 - rhs)
    }
}

impl SubAssign<ByteSize> for Address {
    #[inline(always)]
    fn sub_assign(&mut self, rhs: ByteSize) {
        self.0 -= rhs;
    }
}

impl Sub<Address> for Address {
    type Output = ByteSize;
    #[inline(always)]
    fn sub(self, rhs: Address) -> ByteSize {
        self.0 - rhs.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A non-null `Address` known to be the start of a live (or formerly live,
/// pre-sweep) object. Distinct from `Address` so that object-level APIs
/// (tracing, forwarding, size queries) can't accidentally be handed an
/// arbitrary interior pointer.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq)]
pub struct ObjectReference(Address);

impl ObjectReference {
    #[inline(always)]
    pub fn to_raw_address(self) -> Address {
        self.0
    }

    #[inline(always)]
    pub fn from_raw_address(addr: Address) -> Option<ObjectReference> {
        addr.to_object_reference()
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectReference({:#x})", self.0.as_usize())
    }
}
