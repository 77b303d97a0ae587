use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Audio output error: {0}")]
    Output(String),
}

/// How a playback attempt ended. A dropped receiver (no outcome at all)
/// means the playback was replaced or stopped before it finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed,
}

/// The audio output device. `play` resolves when the clip has finished
/// playing; cancellation happens by aborting the driving task.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> Result<(), PlaybackError>;
}

/// Exclusive owner of the single audio output. At most one playback is ever
/// active: starting a new one releases the previous handle first, it is
/// never queued behind it. Failures resolve the outcome immediately so a
/// conversational loop waiting on playback never stalls.
pub struct PlaybackController<S: AudioSink + 'static> {
    sink: Arc<S>,
    current: Option<JoinHandle<()>>,
}

impl<S: AudioSink + 'static> PlaybackController<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            current: None,
        }
    }

    /// Start playing `audio`, releasing any active playback first. The
    /// returned receiver resolves when this playback ends; it errs if the
    /// playback was itself replaced before finishing.
    pub fn play(&mut self, audio: Vec<u8>) -> oneshot::Receiver<PlaybackOutcome> {
        self.stop();

        let (tx, rx) = oneshot::channel();
        let sink = Arc::clone(&self.sink);

        let handle = tokio::spawn(async move {
            let outcome = match sink.play(audio).await {
                Ok(()) => PlaybackOutcome::Completed,
                Err(e) => {
                    warn!("Audio playback failed: {}", e);
                    PlaybackOutcome::Failed
                }
            };
            let _ = tx.send(outcome);
        });

        self.current = Some(handle);
        rx
    }

    /// Play and wait for the end of playback. Replacement, completion and
    /// failure all count as "ended".
    pub async fn play_to_end(&mut self, audio: Vec<u8>) -> PlaybackOutcome {
        let rx = self.play(audio);
        rx.await.unwrap_or(PlaybackOutcome::Failed)
    }

    /// Release the active playback handle, if any.
    pub fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl<S: AudioSink + 'static> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingSink {
        log: Mutex<Vec<String>>,
        delay: Duration,
        fail: bool,
    }

    impl RecordingSink {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                delay,
                fail,
            })
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, audio: Vec<u8>) -> Result<(), PlaybackError> {
            let label = String::from_utf8_lossy(&audio).to_string();
            self.log.lock().unwrap().push(format!("start {}", label));
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(PlaybackError::Output("device gone".to_string()));
            }
            self.log.lock().unwrap().push(format!("end {}", label));
            Ok(())
        }
    }

    #[tokio::test]
    async fn playback_completes_and_reports() {
        let sink = RecordingSink::new(Duration::from_millis(5), false);
        let mut controller = PlaybackController::new(Arc::clone(&sink));

        let outcome = controller.play_to_end(b"a".to_vec()).await;
        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert_eq!(sink.log(), vec!["start a", "end a"]);
    }

    #[tokio::test]
    async fn starting_a_new_playback_replaces_the_old_one() {
        let sink = RecordingSink::new(Duration::from_millis(50), false);
        let mut controller = PlaybackController::new(Arc::clone(&sink));

        let first = controller.play(b"a".to_vec());
        tokio::time::sleep(Duration::from_millis(5)).await;
        let outcome = controller.play_to_end(b"b".to_vec()).await;

        assert_eq!(outcome, PlaybackOutcome::Completed);
        // The replaced playback never resolves an outcome and never ends.
        assert!(first.await.is_err());
        let log = sink.log();
        assert!(log.contains(&"start a".to_string()));
        assert!(log.contains(&"end b".to_string()));
        assert!(!log.contains(&"end a".to_string()));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn failure_still_resolves_as_ended() {
        let sink = RecordingSink::new(Duration::from_millis(1), true);
        let mut controller = PlaybackController::new(sink);

        let outcome = controller.play_to_end(b"x".to_vec()).await;
        assert_eq!(outcome, PlaybackOutcome::Failed);
    }

    #[tokio::test]
    async fn stop_releases_the_handle() {
        let sink = RecordingSink::new(Duration::from_millis(50), false);
        let mut controller = PlaybackController::new(Arc::clone(&sink));

        let rx = controller.play(b"a".to_vec());
        tokio::time::sleep(Duration::from_millis(5)).await;
        controller.stop();

        assert!(rx.await.is_err());
        assert!(!controller.is_active());
    }
}
