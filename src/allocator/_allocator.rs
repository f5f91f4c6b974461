//! Backend implementations, and the adapters that make them accountable
//!
//! | Backend                               | Feature       | [`thin::SizeOf`](crate::thin::SizeOf) | Default strategy                  |
//! | --------------------------------------| --------------| --------------------------------------| ----------------------------------|
//! | [`c::Malloc`]                         | `c`           | ❌                                    | `SizeHeader<Malloc>`
//! | `win32::ProcessHeap`                  | `win32`       | ✔️                                    | `SizeHeader<ProcessHeap>` (Windows, for over-alignment)
//! | `jemalloc::Jemalloc`                  | `jemalloc`    | ✔️                                    | `Native<Jemalloc>` (wins when enabled)
//! | [`debug::Null`], [`debug::Limit`]     |               | ✔️ / forwarded                        | tests only

#[path = "adapt/_adapt.rs"      ] pub mod adapt;
#[path = "c/_c.rs"              ] pub mod c;
#[path = "debug/_debug.rs"      ] pub mod debug;
#[path = "jemalloc/_jemalloc.rs"] pub mod jemalloc;
#[path = "win32/_win32.rs"      ] pub mod win32;
