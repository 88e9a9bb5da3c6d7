//! Account service implementations.
//!
//! The [`AccountService`](crate::ticket::AccountService) trait lives in
//! [`ticket`](crate::ticket); this module holds concrete services.
//!
//! | Feature flag   | Service                        |
//! |----------------|--------------------------------|
//! | `http-account` | [`http::HttpAccountService`]   |

#[cfg(feature = "http-account")]
pub mod http;
