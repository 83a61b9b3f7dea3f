#![allow(unreachable_pub)]

mod batch;
mod error;
mod outcome;

pub use batch::BatchResult;
pub use error::ErrorKind;
pub use outcome::{FetchError, FetchOutcome, Payload};

/// The ratefetch `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
