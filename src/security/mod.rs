pub mod cipher;
pub mod lockout;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod totp;

pub use cipher::{CipherError, FieldCipher};
pub use lockout::{AttemptLockout, LockedOut, LoginAttemptPolicy, NoLockout};
pub use password::PasswordHasherConfig;
pub use rate_limit::{Clock, ManualClock, RateDecision, RateLimitExceeded, RateLimiter, SystemClock};
pub use session::{Identity, IssuedSession, SessionError, SessionKeys};
pub use totp::TotpVerifier;
