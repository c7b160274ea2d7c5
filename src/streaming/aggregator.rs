//! Stream aggregator: re-emits fragments while reducing them into one record.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_util::stream::{Fuse, FusedStream, Stream, StreamExt};
use tracing::{debug, trace, warn};

use super::accumulator::{retain_complete_tool_calls, ResponseAccumulator};
use super::cancel::{guard_stream, CancelHandle};
use super::types::{FinalResponse, Fragment, FragmentSource, FragmentStream, COMPLETION_OBJECT};
use crate::config::DEFAULT_MODEL_SENTINEL;
use crate::error::{GenerationError, Result};
use crate::usage::{TiktokenEstimator, UsageEstimator};
use crate::ChatMessage;

/// Lifecycle of a [`StreamAggregator`]
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorState {
    /// Created, no fragment pulled yet
    Idle,
    /// Fragments are being pulled and applied
    Draining,
    /// The finished record is materialized and cached
    Finalized(Arc<FinalResponse>),
}

impl AggregatorState {
    /// Lowercase state name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Draining => "draining",
            Self::Finalized(_) => "finalized",
        }
    }
}

/// Wraps an adapter's fragment sequence.
///
/// Iterating yields every fragment unchanged while folding it into the
/// accumulator. [`StreamAggregator::finalize`] continues the same drive from
/// wherever iteration stopped, so the non-replayable source is read exactly
/// once no matter how the two are mixed.
pub struct StreamAggregator {
    source: Fuse<FragmentSource>,
    cancel: CancelHandle,
    accumulator: ResponseAccumulator,
    prompt: Vec<ChatMessage>,
    model: Option<String>,
    model_sentinel: String,
    estimator: Arc<dyn UsageEstimator>,
    state: AggregatorState,
    /// Plain iteration ended without a record; only `finalize` retries.
    exhausted: bool,
}

impl StreamAggregator {
    /// Wrap `stream`; `prompt` and `model` are the outbound request values.
    pub fn new(stream: FragmentStream, prompt: Vec<ChatMessage>, model: Option<String>) -> Self {
        let FragmentStream { stream, cancel } = stream;
        Self {
            source: guard_stream(stream, &cancel).fuse(),
            cancel,
            accumulator: ResponseAccumulator::new(),
            prompt,
            model,
            model_sentinel: DEFAULT_MODEL_SENTINEL.to_string(),
            estimator: Arc::new(TiktokenEstimator::default()),
            state: AggregatorState::Idle,
            exhausted: false,
        }
    }

    /// Use `estimator` when the provider never reports usage
    pub fn with_estimator(mut self, estimator: Arc<dyn UsageEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Model name reported when neither request nor provider names one
    pub fn with_model_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.model_sentinel = sentinel.into();
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> &AggregatorState {
        &self.state
    }

    /// Whether the finished record is cached
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, AggregatorState::Finalized(_))
    }

    /// In-progress accumulator
    pub fn accumulator(&self) -> &ResponseAccumulator {
        &self.accumulator
    }

    /// Fragments applied so far
    pub fn fragments_seen(&self) -> usize {
        self.accumulator.fragments_seen()
    }

    /// Stop the stream. No fragment is emitted afterwards, and a later
    /// [`finalize`](Self::finalize) yields a best-effort, partial record.
    pub fn cancel(&self) {
        debug!(fragments = self.fragments_seen(), "cancelling fragment stream");
        self.cancel.cancel();
    }

    /// Handle for cancelling from another task while this one iterates
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Finished record, draining whatever the stream has left first.
    ///
    /// Free after the first success: the cached record is returned as-is.
    /// Upstream errors met while draining propagate unchanged.
    pub async fn finalize(&mut self) -> Result<Arc<FinalResponse>> {
        if let AggregatorState::Finalized(response) = &self.state {
            return Ok(Arc::clone(response));
        }

        while let Some(item) = futures_util::future::poll_fn(|cx| self.poll_drive(cx, true)).await {
            item?;
        }

        match &self.state {
            AggregatorState::Finalized(response) => Ok(Arc::clone(response)),
            _ => Err(GenerationError::FinalizationInvariant),
        }
    }

    /// The single drive operation behind both iteration and finalization.
    ///
    /// With `strict`, a failed materialization is yielded as an error;
    /// otherwise it is logged and the stream simply ends, leaving the state
    /// `Draining` so a later `finalize` can surface it. Further plain polls
    /// return `None` without materializing again.
    fn poll_drive(&mut self, cx: &mut Context<'_>, strict: bool) -> Poll<Option<Result<Fragment>>> {
        if self.is_finalized() || (self.exhausted && !strict) {
            return Poll::Ready(None);
        }

        if !self.cancel.is_cancelled() {
            let item = ready!(self.source.poll_next_unpin(cx));
            if item.is_some() && matches!(self.state, AggregatorState::Idle) {
                debug!("fragment stream started");
                self.state = AggregatorState::Draining;
            }
            match item {
                Some(Ok(fragment)) => {
                    trace!(fragment = self.fragments_seen(), "applying fragment");
                    self.accumulator.apply(&fragment);
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                None => {}
            }
        }

        match self.materialize() {
            Ok(response) => {
                debug!(
                    id = %response.id,
                    choices = response.choices.len(),
                    fragments = self.fragments_seen(),
                    cancelled = self.cancel.is_cancelled(),
                    "stream finalized"
                );
                self.state = AggregatorState::Finalized(Arc::new(response));
                Poll::Ready(None)
            }
            Err(err) if strict => Poll::Ready(Some(Err(err))),
            Err(err) => {
                warn!(error = %err, "could not finalize stream at end of iteration");
                self.exhausted = true;
                Poll::Ready(None)
            }
        }
    }

    fn materialize(&self) -> Result<FinalResponse> {
        let mut choices = self.accumulator.assemble_choices();

        let usage = match self.accumulator.usage() {
            Some(usage) => usage,
            None => {
                debug!("provider reported no usage, estimating locally");
                self.estimator.estimate(&self.prompt, &choices)?
            }
        };

        retain_complete_tool_calls(&mut choices);

        let model = self
            .model
            .as_deref()
            .or(self.accumulator.model())
            .unwrap_or(self.model_sentinel.as_str())
            .to_string();

        Ok(FinalResponse {
            id: FinalResponse::generate_id(),
            object: COMPLETION_OBJECT.to_string(),
            created: chrono::Utc::now().timestamp(),
            model,
            choices,
            usage,
        })
    }
}

impl Stream for StreamAggregator {
    type Item = Result<Fragment>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_drive(cx, false)
    }
}

impl FusedStream for StreamAggregator {
    fn is_terminated(&self) -> bool {
        self.is_finalized() || self.exhausted
    }
}

impl std::fmt::Debug for StreamAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAggregator")
            .field("state", &self.state.name())
            .field("fragments", &self.fragments_seen())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
