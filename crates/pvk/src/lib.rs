//! Client core for the PVK course sign-up tool.
//!
//! The PVK API is an Eve-style REST backend. This crate keeps an optimistic
//! local copy of its collections ([`store::ResourceStore`]), talks to it
//! through a pluggable [`transport::Transport`] and implements the student's
//! sign-up workflow on top ([`courses::UserCourses`]).

pub mod config;
pub mod courses;
pub mod overlap;
pub mod session;
pub mod store;
pub mod transport;

pub use config::ClientConfig;
pub use courses::{SignupError, UserCourses};
pub use session::{Session, User};
pub use store::{ResourceStore, StoreError};
pub use transport::{http::HttpTransport, ApiError, ApiRequest, Transport};
