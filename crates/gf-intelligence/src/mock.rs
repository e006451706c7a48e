//! Scripted provider for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gf_core::settings::ProviderId;
use tokio_util::sync::CancellationToken;

use crate::provider::{ModelProvider, RunPayload};
use crate::stream::{ModelInfo, StreamError, TokenChunk, TokenStream};

/// One step of a scripted run.
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    /// Yield a content chunk.
    Chunk(String),
    /// Yield the terminal `done` marker.
    Done,
    /// Fail the stream with this error.
    Fail(StreamError),
    /// Sleep before the next step.
    Pause(Duration),
    /// Block until the run is cancelled.
    Hang,
}

/// A provider that replays queued scripts.
///
/// Each call to `run` pops the next script. With an empty queue the run
/// yields `"Mock response"` followed by `done`. A script that runs out of
/// steps without `Done` or `Fail` ends with [`StreamError::UnexpectedEof`],
/// exactly like a real stream that closed early.
pub struct MockProvider {
    id: ProviderId,
    scripts: Arc<Mutex<VecDeque<Vec<MockStep>>>>,
    captured: Arc<Mutex<Vec<RunPayload>>>,
    models: Vec<ModelInfo>,
    available: bool,
    active: Mutex<Option<CancellationToken>>,
    cancels: Arc<Mutex<usize>>,
}

impl MockProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            captured: Arc::new(Mutex::new(Vec::new())),
            models: Vec::new(),
            available: true,
            active: Mutex::new(None),
            cancels: Arc::new(Mutex::new(0)),
        }
    }

    /// Queue a run that yields `chunks` and then `done`.
    pub fn with_chunks<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<MockStep> = chunks
            .into_iter()
            .map(|c| MockStep::Chunk(c.into()))
            .collect();
        steps.push(MockStep::Done);
        self.with_script(steps)
    }

    pub fn with_script(self, steps: Vec<MockStep>) -> Self {
        self.push_script(steps);
        self
    }

    /// Queue a run that fails immediately.
    pub fn with_error(self, error: StreamError) -> Self {
        self.with_script(vec![MockStep::Fail(error)])
    }

    pub fn with_models<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = self.id;
        self.models = ids
            .into_iter()
            .map(|id| {
                let id: String = id.into();
                ModelInfo {
                    name: id.clone(),
                    id,
                    context_length: None,
                    provider: Some(provider),
                }
            })
            .collect();
        self
    }

    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Queue a script on a provider that is already shared.
    pub fn push_script(&self, steps: Vec<MockStep>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(steps);
    }

    /// Payloads received by `run`, in call order.
    pub fn captured_payloads(&self) -> Vec<RunPayload> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times `cancel` was called.
    pub fn cancel_count(&self) -> usize {
        *self.cancels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Replay {
    steps: VecDeque<MockStep>,
    cancel: CancellationToken,
    finished: bool,
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    fn run(&self, payload: RunPayload) -> TokenStream {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload);
        let steps = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| vec![MockStep::Chunk("Mock response".into()), MockStep::Done]);

        let cancel = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

        let replay = Replay {
            steps: steps.into(),
            cancel,
            finished: false,
        };
        Box::pin(futures_util::stream::unfold(replay, |mut r| async move {
            loop {
                if r.finished || r.cancel.is_cancelled() {
                    return None;
                }
                let Some(step) = r.steps.pop_front() else {
                    r.finished = true;
                    return Some((Err(StreamError::UnexpectedEof), r));
                };
                match step {
                    MockStep::Chunk(text) => return Some((Ok(TokenChunk::text(text)), r)),
                    MockStep::Done => {
                        r.finished = true;
                        return Some((Ok(TokenChunk::done()), r));
                    }
                    MockStep::Fail(error) => {
                        r.finished = true;
                        return Some((Err(error), r));
                    }
                    MockStep::Pause(duration) => {
                        tokio::select! {
                            _ = r.cancel.cancelled() => return None,
                            _ = tokio::time::sleep(duration) => {}
                        }
                    }
                    MockStep::Hang => {
                        r.cancel.cancelled().await;
                        return None;
                    }
                }
            }
        }))
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        if let Some(token) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn payload() -> RunPayload {
        RunPayload::new("m", vec![])
    }

    #[tokio::test]
    async fn default_run() {
        let mock = MockProvider::new(ProviderId::Ollama);
        let items: Vec<_> = mock.run(payload()).collect().await;
        assert_eq!(
            items,
            vec![Ok(TokenChunk::text("Mock response")), Ok(TokenChunk::done())]
        );
    }

    #[tokio::test]
    async fn exhausted_script_is_eof() {
        let mock = MockProvider::new(ProviderId::Ollama)
            .with_script(vec![MockStep::Chunk("x".into())]);
        let items: Vec<_> = mock.run(payload()).collect().await;
        assert_eq!(items, vec![Ok(TokenChunk::text("x")), Err(StreamError::UnexpectedEof)]);
    }

    #[tokio::test]
    async fn cancel_ends_hang_quietly() {
        let mock = Arc::new(
            MockProvider::new(ProviderId::Ollama)
                .with_script(vec![MockStep::Chunk("a".into()), MockStep::Hang]),
        );
        let mut stream = mock.run(payload());
        assert_eq!(stream.next().await, Some(Ok(TokenChunk::text("a"))));
        let canceller = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert_eq!(stream.next().await, None);
        assert_eq!(mock.cancel_count(), 1);
    }

    #[tokio::test]
    async fn listing_and_availability() {
        let mock = MockProvider::new(ProviderId::OpenRouter)
            .with_models(["a", "b"])
            .with_availability(false);
        assert!(!mock.is_available().await);
        let models = mock.list_models().await;
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].provider, Some(ProviderId::OpenRouter));
    }
}
