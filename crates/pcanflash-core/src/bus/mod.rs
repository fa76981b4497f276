//! Bus abstraction

mod traits;

pub use traits::CanBus;
