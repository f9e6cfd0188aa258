pub mod extractors;
pub mod jwt;
pub mod password;

pub use extractors::CurrentUser;
pub use jwt::JwtKeys;
