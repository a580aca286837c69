//! Native backend side of logdeck
//!
//! Provides the live log hub the backend process emits into, the session
//! log directory, a file follower, and [`NativeBackend`] which exposes all of
//! it as a [`logdeck_logs::LogSource`].

mod backend;
mod follow;
mod hub;
mod sessions;

pub use backend::NativeBackend;
pub use follow::{FileFollower, FollowOptions};
pub use hub::NativeLogHub;
pub use sessions::SessionDirectory;
