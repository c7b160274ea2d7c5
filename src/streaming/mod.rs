//! Streaming response aggregation.
//!
//! This module wraps a provider's fragment sequence, re-emits each fragment
//! unchanged and reduces them into one finished record, rebuilding tool calls
//! whose arguments arrive split across many fragments.

mod accumulator;
mod aggregator;
mod cancel;
mod types;

pub use accumulator::{
    ChoiceAccumulator, IndexedSlots, ResponseAccumulator, ToolCallAccumulator, MAX_SLOT_INDEX,
};
pub use aggregator::{AggregatorState, StreamAggregator};
pub use cancel::CancelHandle;
pub use types::{
    ChatCompletion, ChoiceDelta, Delta, FinalChoice, FinalMessage, FinalResponse, Fragment,
    FragmentSource, FragmentStream, FunctionDelta, ToolCallDelta, Usage, COMPLETION_OBJECT,
};
