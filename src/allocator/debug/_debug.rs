//! [`Null`], [`Limit`]: backends for exercising failure paths

mod limit;  pub use limit::Limit;
mod null;   pub use null::Null;
