//! Event stream parsing.
//!
//! [`StreamParser`] turns arbitrarily split byte chunks into [`ParsedBlock`]s.
//! It holds no connection state: applying ids and retry intervals is left to
//! the caller.

pub(crate) mod constants;
mod parser;

pub use parser::{ParsedBlock, StreamParser};
