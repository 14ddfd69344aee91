pub mod extractors;

pub use extractors::AuthUser;
