//! Operator console: one command per stdin line.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::server::Server;

/// Longest console line accepted; longer input is cut.
pub const CONSOLE_LINE_LIMIT: usize = 192;

/// Feed every line of `input` to the server's command handler until the
/// input ends or the server stops. Returns the number of lines handled.
pub fn run<R: BufRead>(server: &Server, input: R) -> usize {
    let mut handled = 0;
    for line in input.lines() {
        if !server.is_active() {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Console read failed");
                break;
            }
        };
        let line = truncate(line.trim_end(), CONSOLE_LINE_LIMIT);
        if line.is_empty() {
            continue;
        }
        if !server.handle_command(None, line) {
            info!("Unknown command.");
        }
        handled += 1;
    }
    handled
}

/// Start the console thread. The thread ends with stdin.
pub fn spawn(server: Arc<Server>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = io::stdin();
            run(&server, stdin.lock());
        })
}

fn truncate(line: &str, limit: usize) -> &str {
    match line.char_indices().nth(limit) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::ServerConfig;
    use crate::service::CommandHandler;
    use crate::session::Session;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl CommandHandler for Arc<Recorder> {
        fn handle(&self, _server: &Server, caller: Option<&Arc<Session>>, line: &str) -> bool {
            assert!(caller.is_none());
            self.0.lock().unwrap().push(line.to_string());
            line.starts_with("known")
        }
    }

    #[test]
    fn lines_reach_the_command_handler() {
        let recorder = Arc::new(Recorder::default());
        let server = Server::new(ServerConfig::default())
            .unwrap()
            .with_command_handler(Arc::clone(&recorder));

        let input = io::Cursor::new("known one\n\n  \nother\n");
        assert_eq!(run(&server, input), 2);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["known one", "other"]);
    }

    #[test]
    fn long_lines_are_cut() {
        let long = "x".repeat(CONSOLE_LINE_LIMIT + 10);
        assert_eq!(truncate(&long, CONSOLE_LINE_LIMIT).len(), CONSOLE_LINE_LIMIT);
    }
}
