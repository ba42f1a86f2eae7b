pub mod error;
pub mod config;
pub mod storage;
pub mod transport;
pub mod pipeline;
pub mod identity;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, RefreshError};
pub use identity::{Role, SessionContext};
pub use pipeline::AuthenticatedClient;

// Test-only printing helper: expands to eprintln! in test and debug builds and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
