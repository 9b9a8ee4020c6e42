use tokio::sync::oneshot;

use crate::error::{Result, TranscribeError};
use crate::scheduler::job::Transcription;

/// Outcome delivered to the submitting caller.
pub type Completion = Result<Transcription>;

/// Single-assignment slot filled by the worker.
///
/// The first `fill` wins; later calls are no-ops. A slot dropped without
/// being filled resolves its handle with `ServiceStopped`.
#[derive(Debug)]
pub struct CompletionSlot {
    tx: Option<oneshot::Sender<Completion>>,
}

/// The caller's side of a [`CompletionSlot`].
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<Completion>,
}

pub fn completion_pair() -> (CompletionSlot, CompletionHandle) {
    let (tx, rx) = oneshot::channel();
    (CompletionSlot { tx: Some(tx) }, CompletionHandle { rx })
}

impl CompletionSlot {
    /// Assign the outcome. Returns true only if this call assigned it and the
    /// caller was still waiting.
    pub fn fill(&mut self, outcome: Completion) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.tx.is_none()
    }

    /// True once the caller has stopped waiting (timed out or went away).
    pub fn is_abandoned(&self) -> bool {
        self.tx.as_ref().map_or(false, |tx| tx.is_closed())
    }
}

impl CompletionHandle {
    /// Suspend until the slot is filled.
    pub async fn wait(self) -> Completion {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TranscribeError::ServiceStopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn transcription(text: &str) -> Transcription {
        Transcription {
            job_id: Uuid::new_v4(),
            text: text.to_string(),
            raw_text: text.to_string(),
            language: "auto".to_string(),
            admitted_at: chrono::Utc::now(),
            processing_seconds: 0.0,
            cleaned: false,
        }
    }

    #[tokio::test]
    async fn first_fill_wins() {
        let (mut slot, handle) = completion_pair();

        assert!(slot.fill(Ok(transcription("first"))));
        assert!(slot.is_filled());
        assert!(!slot.fill(Err(TranscribeError::ServiceStopped)));

        let result = handle.wait().await.unwrap();
        assert_eq!(result.text, "first");
    }

    #[tokio::test]
    async fn dropped_slot_resolves_as_stopped() {
        let (slot, handle) = completion_pair();
        drop(slot);

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, TranscribeError::ServiceStopped));
    }

    #[test]
    fn abandoned_when_handle_dropped() {
        let (mut slot, handle) = completion_pair();
        assert!(!slot.is_abandoned());

        drop(handle);
        assert!(slot.is_abandoned());
        assert!(!slot.fill(Ok(transcription("late"))));
    }
}
