pub mod codes;
pub mod password;
pub mod phone;

pub use codes::{random_code, random_username};
pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use phone::{canonicalize_phone, PhoneConfig};
