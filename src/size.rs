//! Overflow-checked size arithmetic shared by every allocation path.
//!
//! | Fn                        | Purpouse |
//! | --------------------------| ---------|
//! | [`clamp_min`]             | Never hand a backend a zero sized request
//! | [`checked_mul`]           | `count * elem` for element-count based allocations
//! | [`too_large`]             | Refuse requests before `size + header` could wrap
//! | [`request`]               | [`too_large`] then [`clamp_min`]

use crate::error::*;

use core::ffi::c_long;
use core::num::NonZeroUsize;



/// The size zero sized requests are rounded up to: <code>[size_of]::&lt;[c_long]&gt;()</code>.
///
/// Some backends treat `malloc(0)` as "not applicable" and return null, others return a unique pointer.
/// Rounding up makes every backend behave like the latter.
pub const MIN_SIZE : NonZeroUsize = match NonZeroUsize::new(core::mem::size_of::<c_long>()) { Some(n) => n, None => panic!("size_of::<c_long>() == 0") };

/// Requests of this many bytes or more are refused by [`too_large`].
pub const TOO_LARGE : usize = usize::MAX / 2;

/// Returns `size` if nonzero, otherwise [`MIN_SIZE`].
#[inline(always)] pub const fn clamp_min(size: usize) -> NonZeroUsize {
    match NonZeroUsize::new(size) {
        Some(size)  => size,
        None        => MIN_SIZE,
    }
}

/// `count * elem`, failing if `elem == 0` or the product would wrap.
///
/// `count > usize::MAX / elem` is checked explicitly.
/// Multiplying first and comparing the product against either operand afterwards does *not* reliably detect wraparound.
#[inline] pub const fn checked_mul(count: usize, elem: usize) -> Result<usize, SizeOverflowError> {
    if elem == 0 || count > usize::MAX / elem { return Err(SizeOverflowError { count, elem }) }
    Ok(count * elem)
}

/// `true` if `size` is at or above half the address space.
///
/// Anything that passes leaves room for `size + header + padding` without wrapping.
#[inline(always)] pub const fn too_large(size: usize) -> bool { size >= TOO_LARGE }

/// Validate and clamp a caller's request into what a backend may be asked for.
#[inline] pub const fn request(size: usize) -> Result<NonZeroUsize, ExcessiveSizeRequestedError> {
    if too_large(size) { return Err(ExcessiveSizeRequestedError { requested: size }) }
    Ok(clamp_min(size))
}



#[test] fn clamp() {
    assert_eq!(clamp_min(0), MIN_SIZE);
    assert_eq!(clamp_min(1).get(), 1);
    assert_eq!(clamp_min(4096).get(), 4096);
    assert!(MIN_SIZE.get() >= 4);
}

#[test] fn mul() {
    assert_eq!(checked_mul(0, 8), Ok(0));
    assert_eq!(checked_mul(3, 8), Ok(24));
    assert_eq!(checked_mul(usize::MAX, 1), Ok(usize::MAX));
    assert_eq!(checked_mul(usize::MAX / 2, 2), Ok(usize::MAX - 1));
    assert_eq!(checked_mul(usize::MAX / 2 + 1, 2), Err(SizeOverflowError { count: usize::MAX / 2 + 1, elem: 2 }));
    assert_eq!(checked_mul(8, 0), Err(SizeOverflowError { count: 8, elem: 0 }));
    assert_eq!(checked_mul(0, 0), Err(SizeOverflowError { count: 0, elem: 0 }));

    // the classic "product smaller than an operand" check passes this one, but it still wraps
    let elem = usize::MAX / 2 + 1;
    let wrapped = 3usize.wrapping_mul(elem);
    assert!(wrapped >= 3 && wrapped >= elem);
    assert!(checked_mul(3, elem).is_err());
}

#[test] fn large() {
    assert!(!too_large(0));
    assert!(!too_large(TOO_LARGE - 1));
    assert!( too_large(TOO_LARGE));
    assert!( too_large(usize::MAX));
    assert_eq!(request(0), Ok(MIN_SIZE));
    assert_eq!(request(TOO_LARGE), Err(ExcessiveSizeRequestedError { requested: TOO_LARGE }));
    // whatever passes must survive a generous header without wrapping
    let biggest = TOO_LARGE - 1;
    assert!(biggest.checked_add(4096).is_some());
}
