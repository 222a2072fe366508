//! Background preview-ASR loop and its token-overlap merge (`spec.md`
//! §4.4, Open Question resolved in DESIGN.md).
//!
//! While `Listening`, a background task periodically snapshots the
//! capture buffer and requests a `preview-`-prefixed transcription; the
//! merge below reconciles each new preview against the previously
//! accumulated one without ever regressing a stable prefix.

use std::time::Duration;

use tokio::sync::{oneshot, watch};

pub const PREVIEW_CADENCE: Duration = Duration::from_millis(350);
pub const PREVIEW_INITIAL_DELAY: Duration = Duration::from_millis(180);

/// Merge a new preview transcript into the accumulated one.
///
/// Splits both into whitespace tokens and finds the longest run of
/// `accumulated`'s trailing tokens that is also a prefix of `incoming`'s
/// tokens; everything in `accumulated` before that run is a stable prefix
/// that is never touched, and `incoming` replaces the rest. This
/// satisfies the three properties an acceptable merge must have: it never
/// regresses a previous stable prefix, it terminates in one pass, and
/// repeated identical input converges to a fixed point.
pub fn merge_preview(accumulated: &str, incoming: &str) -> String {
    let acc_tokens: Vec<&str> = accumulated.split_whitespace().collect();
    let new_tokens: Vec<&str> = incoming.split_whitespace().collect();

    if acc_tokens.is_empty() {
        return incoming.to_string();
    }
    if new_tokens.is_empty() {
        return accumulated.to_string();
    }

    // Find the longest suffix of acc_tokens that matches a prefix of new_tokens.
    let max_overlap = acc_tokens.len().min(new_tokens.len());
    let mut overlap = 0;
    for len in (1..=max_overlap).rev() {
        if acc_tokens[acc_tokens.len() - len..] == new_tokens[..len] {
            overlap = len;
            break;
        }
    }

    let stable_prefix = &acc_tokens[..acc_tokens.len() - overlap];
    let mut merged: Vec<&str> = Vec::with_capacity(stable_prefix.len() + new_tokens.len());
    merged.extend_from_slice(stable_prefix);
    merged.extend_from_slice(&new_tokens);
    merged.join(" ")
}

/// Handle to a running [`PreviewAsrLoop`] background task.
pub struct PreviewAsrHandle {
    accumulated: watch::Receiver<String>,
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl PreviewAsrHandle {
    pub fn accumulated_transcript(&self) -> String {
        self.accumulated.borrow().clone()
    }

    /// Stop the loop without waiting for the current iteration, per
    /// `spec.md` §4.4 ("stops the preview loop without waiting").
    pub fn stop_immediately(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Stop and drain within `timeout`, used on a clean `MicUp` (not
    /// `Shutup`) so the final snapshot has a chance to land.
    pub async fn stop_and_drain(&mut self, timeout: Duration) -> String {
        self.stop_immediately();
        if let Some(join) = self.join.take() {
            let _ = tokio::time::timeout(timeout, join).await;
        }
        self.accumulated_transcript()
    }
}

/// Spawn a preview-ASR loop driven by `snapshot_and_transcribe`, a closure
/// returning the latest preview transcript for a fresh buffer snapshot
/// (typically a bound call into the voice host's `/asr` endpoint with a
/// `preview-`-prefixed session id). Returns a handle to read the
/// accumulated transcript and to stop the loop.
pub fn spawn<F, Fut>(mut snapshot_and_transcribe: F) -> PreviewAsrHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Option<String>> + Send,
{
    let (acc_tx, acc_rx) = watch::channel(String::new());
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        tokio::time::sleep(PREVIEW_INITIAL_DELAY).await;
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = tokio::time::sleep(PREVIEW_CADENCE) => {
                    if let Some(preview_text) = snapshot_and_transcribe().await {
                        let merged = merge_preview(&acc_tx.borrow().clone(), &preview_text);
                        let _ = acc_tx.send(merged);
                    }
                }
            }
        }
    });

    PreviewAsrHandle {
        accumulated: acc_rx,
        stop_tx: Some(stop_tx),
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_with_empty_accumulated_returns_incoming() {
        assert_eq!(merge_preview("", "hello there"), "hello there");
    }

    #[test]
    fn merge_extends_with_new_overlapping_tail() {
        let merged = merge_preview("hello there", "there general kenobi");
        assert_eq!(merged, "hello there general kenobi");
    }

    #[test]
    fn merge_with_no_overlap_appends() {
        let merged = merge_preview("hello there", "completely different");
        assert_eq!(merged, "hello there completely different");
    }

    #[test]
    fn merge_is_idempotent_on_identical_input() {
        let first = merge_preview("hello there", "hello there");
        let second = merge_preview(&first, "hello there");
        assert_eq!(first, second);
    }

    #[test]
    fn merge_never_drops_a_stable_prefix() {
        let acc = "the quick brown fox";
        let merged = merge_preview(acc, "brown fox jumps");
        assert!(merged.starts_with("the quick brown fox"));
    }

    #[tokio::test]
    async fn spawned_loop_accumulates_and_stops() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let mut handle = spawn(move || {
            let counter = counter_clone.clone();
            async move {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Some(format!("word{n}"))
            }
        });

        tokio::time::sleep(Duration::from_millis(800)).await;
        let transcript = handle.stop_and_drain(Duration::from_millis(500)).await;
        assert!(!transcript.is_empty());
    }
}
