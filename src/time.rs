//! Time units used across the stub.

pub use fugit::HertzU32 as Hertz;
pub use fugit::RateExtU32;
