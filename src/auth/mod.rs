pub mod extractors;
pub mod token;

pub use extractors::ApiAuth;
pub use token::tokens_match;
