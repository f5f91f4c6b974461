/// Like [`panic!`], but meant for undefined behavior which might be worth using [`core::hint::unreachable_unchecked`] on in the future.
macro_rules! ub {
    ( $($tt:tt)* ) => {{
        $crate::_macros::maybe_eventually_sometimes_unreachable();
        panic!($($tt)*);
    }};
}

/// Forward [`thin::Introspect`](crate::thin::Introspect) through a wrapper to the wrapped backend `self.0`.
macro_rules! forward_introspect {
    ( $ty:ident < $a:ident > ) => {
        impl<$a: $crate::thin::Introspect> $crate::thin::Introspect for $ty<$a> {
            fn info(&self) -> $crate::thin::AllocatorInfo { self.0.info() }
            fn set_background_thread(&self, enable: bool) { self.0.set_background_thread(enable) }
            fn purge(&self) -> $crate::thin::Purge { self.0.purge() }
        }
    };
}



/// ### Safety
///
/// In the future, this may be equivalent to [`core::hint::unreachable_unchecked`] in some builds.
pub unsafe fn maybe_eventually_sometimes_unreachable() {}
