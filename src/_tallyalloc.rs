#![doc = include_str!("../Readme.md")]
#![no_std]

#![forbid(unreachable_patterns)] // often indicates e.g. a typoed "constant" in a match statement
#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(non_snake_case)] // often indicates e.g. a typoed "constant" in a match statement
#![warn(clippy::undocumented_unsafe_blocks)]
#![allow(clippy::let_unit_value)] // very common for const assertions
#![cfg_attr(not(feature = "default"), allow(dead_code, unused_imports))] // suppress noisy "dead code" warnings in non-default build configs

extern crate std; // thread-local slot indicies, default OOM reporting, host queries

type AllocNN    = core::ptr::NonNull<core::mem::MaybeUninit<u8>>;
type AllocNN0   = core::ptr::NonNull<u8>;


#[macro_use] mod _macros;

#[path = "allocator/_allocator.rs"  ] pub mod allocator;
#[path = "host/_host.rs"            ] pub mod host;

pub mod accountant;     pub use accountant::Accountant;
pub mod counter;        pub use counter::ShardedCounter;
pub mod error;
pub mod global;
pub mod oom;            pub use oom::OomHandler;
pub mod size;
pub mod thin;
pub mod usable;         pub use usable::Usable;

#[doc(hidden)] pub mod bug;
