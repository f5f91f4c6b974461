//! [`Native`], [`SizeHeader`]: turn a [`thin`](crate::thin) backend into a [`Usable`](crate::Usable) strategy
//!
//! | Adapter                       | Backend needs                             | Per-allocation overhead   |
//! | ------------------------------| ------------------------------------------| --------------------------|
//! | <code>[Native]&lt;A&gt;</code>        | [`thin::SizeOf`](crate::thin::SizeOf)     | none
//! | <code>[SizeHeader]&lt;A&gt;</code>    | nothing beyond alloc/realloc/free         | <code>[SizeHeader::HEADER]</code> bytes

mod native;         pub use native::Native;
mod size_header;    pub use size_header::SizeHeader;
