//! Stdin producer thread and the interactive confirmation gate
//!
//! The planner's main loop must never block on stdin, so a dedicated
//! thread reads completed lines into a bounded channel (capacity 1 - the
//! reader parks until the loop drains the previous line). The same channel
//! backs the critical-action confirmation prompt.

use async_trait::async_trait;
use colored::Colorize;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::vision::ConfirmationPrompt;

/// Shared handle to the line channel; the session and the confirmer take
/// turns holding the lock
pub type InputReceiver = Arc<Mutex<mpsc::Receiver<String>>>;

/// Start the stdin reader thread and return the consuming end
pub fn spawn_input_reader() -> InputReceiver {
    let (tx, rx) = mpsc::channel::<String>(1);

    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            debug!("stdin-reader: channel closed, exiting");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin-reader: read failed, exiting");
                        break;
                    }
                }
            }
            debug!("stdin-reader: eof");
        })
        .expect("spawn stdin reader thread");

    Arc::new(Mutex::new(rx))
}

/// Channel-backed version for tests: the returned sender plays the user
pub fn channel_input() -> (mpsc::Sender<String>, InputReceiver) {
    let (tx, rx) = mpsc::channel::<String>(1);
    (tx, Arc::new(Mutex::new(rx)))
}

/// How long the confirmation prompt waits before treating silence as "no"
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Interactive critical-action gate reading from the shared input channel
pub struct StdinConfirmer {
    input: InputReceiver,
}

impl StdinConfirmer {
    pub fn new(input: InputReceiver) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ConfirmationPrompt for StdinConfirmer {
    async fn confirm(&self, message: &str) -> bool {
        println!();
        println!("{} {}", "CONFIRM:".bright_red().bold(), message);
        println!("{}", "Proceed? [y/N]".yellow());

        let mut input = self.input.lock().await;
        let answer = tokio::time::timeout(CONFIRM_TIMEOUT, input.recv()).await;
        match answer {
            Ok(Some(line)) => {
                let yes = matches!(line.trim().to_lowercase().as_str(), "y" | "yes");
                debug!(%line, yes, "confirmation answered");
                yes
            }
            Ok(None) => false,
            Err(_) => {
                warn!("confirmation timed out, treating as denied");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_input_delivers_lines() {
        let (tx, rx) = channel_input();
        tx.send("open firefox".to_string()).await.unwrap();
        let line = rx.lock().await.try_recv().unwrap();
        assert_eq!(line, "open firefox");
    }

    #[tokio::test]
    async fn test_confirmer_accepts_yes() {
        let (tx, rx) = channel_input();
        let confirmer = StdinConfirmer::new(rx);
        tx.send("y".to_string()).await.unwrap();
        assert!(confirmer.confirm("delete everything?").await);
    }

    #[tokio::test]
    async fn test_confirmer_denies_other_input() {
        let (tx, rx) = channel_input();
        let confirmer = StdinConfirmer::new(rx);
        tx.send("nope".to_string()).await.unwrap();
        assert!(!confirmer.confirm("delete everything?").await);
    }

    #[tokio::test]
    async fn test_confirmer_denies_on_closed_channel() {
        let (tx, rx) = channel_input();
        drop(tx);
        let confirmer = StdinConfirmer::new(rx);
        assert!(!confirmer.confirm("delete everything?").await);
    }
}
