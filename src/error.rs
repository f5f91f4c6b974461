//! [`AllocError`], [`ExcessiveSizeRequestedError`], [`SizeOverflowError`]

use core::fmt::{self, Debug, Display, Formatter};



/// More bytes were requested than could ever be safely handed to a backend (see [`size::too_large`](crate::size::too_large)).
#[derive(Clone, Copy, Debug, PartialEq, Eq)] pub struct ExcessiveSizeRequestedError {
    pub requested: usize,
}

impl Display for ExcessiveSizeRequestedError { fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "requested {} bytes, but requests of {} bytes or more are refused", self.requested, crate::size::TOO_LARGE) } }
impl From<ExcessiveSizeRequestedError> for () { fn from(_: ExcessiveSizeRequestedError) -> Self { () } }
impl std::error::Error for ExcessiveSizeRequestedError { fn description(&self) -> &str { "requested too many bytes" } }



/// `count * elem` doesn't fit in a [`usize`] (or `elem` was `0`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)] pub struct SizeOverflowError {
    pub count:  usize,
    pub elem:   usize,
}

impl Display for SizeOverflowError { fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "{} elements of {} bytes overflows usize", self.count, self.elem) } }
impl From<SizeOverflowError> for () { fn from(_: SizeOverflowError) -> Self { () } }
impl std::error::Error for SizeOverflowError { fn description(&self) -> &str { "element count times element size overflowed" } }



/// Why a "try" (re)allocation of an [`Accountant`](crate::Accountant) failed.
///
/// | Variant                               | Cause |
/// | --------------------------------------| ------|
/// | [`Overflow`](Self::Overflow)          | The size arithmetic refused the request before any backend was called
/// | [`Exhausted`](Self::Exhausted)        | The backend itself returned null
#[derive(Clone, Copy, Debug, PartialEq, Eq)] pub enum AllocError {
    Overflow    { requested: usize },
    Exhausted   { requested: usize },
}

impl AllocError {
    /// The size an [`OomHandler`](crate::OomHandler) is invoked with for this failure.
    ///
    /// This is always the caller's original request - never the clamped or header-adjusted size.
    /// Element count overflows report [`usize::MAX`].
    pub const fn requested(&self) -> usize {
        match *self {
            AllocError::Overflow  { requested } => requested,
            AllocError::Exhausted { requested } => requested,
        }
    }

    pub(crate) const fn with_requested(self, requested: usize) -> Self {
        match self {
            AllocError::Overflow  { .. } => AllocError::Overflow  { requested },
            AllocError::Exhausted { .. } => AllocError::Exhausted { requested },
        }
    }

    /// `true` if no backend was involved in the failure.
    pub const fn is_overflow(&self) -> bool { matches!(self, AllocError::Overflow { .. }) }
}

impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            AllocError::Overflow  { requested } => write!(f, "allocation of {requested} bytes refused: size arithmetic would overflow"),
            AllocError::Exhausted { requested } => write!(f, "allocation of {requested} bytes failed: backend out of memory"),
        }
    }
}

impl From<ExcessiveSizeRequestedError> for AllocError { fn from(e: ExcessiveSizeRequestedError) -> Self { AllocError::Overflow { requested: e.requested } } }
impl From<SizeOverflowError> for AllocError { fn from(_: SizeOverflowError) -> Self { AllocError::Overflow { requested: usize::MAX } } }
impl From<AllocError> for () { fn from(_: AllocError) -> Self { () } }
impl std::error::Error for AllocError { fn description(&self) -> &str { "allocation failed" } }



#[test] fn requested_is_original() {
    assert_eq!(AllocError::Exhausted { requested: 42 }.requested(), 42);
    assert_eq!(AllocError::from(ExcessiveSizeRequestedError { requested: usize::MAX - 1 }).requested(), usize::MAX - 1);
    assert_eq!(AllocError::from(SizeOverflowError { count: 3, elem: usize::MAX }).requested(), usize::MAX);
}

#[test] fn overflow_vs_exhausted() {
    assert!( AllocError::from(SizeOverflowError { count: 3, elem: usize::MAX }).is_overflow());
    assert!( AllocError::from(ExcessiveSizeRequestedError { requested: usize::MAX }).is_overflow());
    assert!(!AllocError::Exhausted { requested: 1 }.is_overflow());
}

#[test] fn display() {
    use std::string::ToString;
    assert_eq!(AllocError::Exhausted { requested: 7 }.to_string(), "allocation of 7 bytes failed: backend out of memory");
    assert_eq!(SizeOverflowError { count: 2, elem: 0 }.to_string(), "2 elements of 0 bytes overflows usize");
}
