//! Session authentication and the login surface.
//!
//! Flow Overview: a protected request without a valid session cookie is sent to the
//! login form with its original URL; a correct TOTP code mints a session, sets the
//! cookie and sends the client back. Every authenticated access slides the TTL.

pub mod landing;
pub mod login;
pub mod page;
pub mod session;

pub use self::login::{login, login_form, LoginError};
pub use self::session::{authenticate, logout, Session, SessionError};
