//! Session Core Components
//!
//! Building blocks shared by the token manager and the trace recorder.

pub mod ids;
pub mod jwt;
pub mod ring_buffer;
pub mod token_source;

pub use ids::*;
pub use jwt::*;
pub use ring_buffer::*;
pub use token_source::*;
