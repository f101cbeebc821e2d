//! Client library for a developer community server: a real-time chat room
//! reached over WebSocket and a code-error analyzer reached over HTTP.
//!
//! The two halves share nothing but the ambient plumbing:
//!
//! - [`chat`]: session lifecycle, transcript, push channel and chat views.
//! - [`analysis`]: request controller, response dispatch and result views.
//! - [`config`], [`error`], [`html`]: configuration, the crate error type and
//!   the embedded templates both halves render through.

pub mod analysis;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod html;

pub use error::DevroomError;
