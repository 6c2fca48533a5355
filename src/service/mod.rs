//! # Service Collaborators
//!
//! Seams where an embedding application plugs in policy the protocol core
//! does not own: who may log in and what a slash command does.
//!
//! - [`CredentialVerifier`] decides whether a name and key pair is accepted
//!   during identification.
//! - [`CommandHandler`] receives chat lines starting with `/` and console
//!   input.
//! - [`console`] reads commands from stdin on its own thread.

pub mod console;

use std::sync::Arc;

use crate::server::Server;
use crate::session::Session;

/// Authentication hook consulted for every identification.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, name: &str, key: &str) -> bool;
}

/// Accepts every name and key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CredentialVerifier for AcceptAll {
    fn verify(&self, _name: &str, _key: &str) -> bool {
        true
    }
}

impl<F> CredentialVerifier for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn verify(&self, name: &str, key: &str) -> bool {
        self(name, key)
    }
}

/// Command dispatch. `caller` is `None` for console input.
///
/// Returns `false` when no command matched; the caller then reports an
/// unknown command.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, server: &Server, caller: Option<&Arc<Session>>, line: &str) -> bool;
}

/// Knows no commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommands;

impl CommandHandler for NoCommands {
    fn handle(&self, _server: &Server, _caller: Option<&Arc<Session>>, _line: &str) -> bool {
        false
    }
}

/// Split `/name args` into the command name and the
/// remaining argument text. A leading slash is optional.
pub fn split_command(line: &str) -> (&str, Option<&str>) {
    let line = line.strip_prefix('/').unwrap_or(line);
    match line.split_once(' ') {
        Some((name, args)) => (name, Some(args).filter(|a| !a.is_empty())),
        None => (line, None),
    }
}
