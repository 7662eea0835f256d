//! Auth-domain challenges, scope sets, and token models.

pub mod challenge;
pub mod scope;
pub mod token;

pub use challenge::*;
pub use scope::*;
pub use token::*;
