//! shellmind-agent — the model-facing half of the agent: the Chat Client
//! (`spec.md` §4.B), the Context Manager (§4.C), the Response Parser
//! (§4.D), and the Turn Controller that ties them together (§4.E).

pub mod client;
pub mod context;
pub mod error;
pub mod parser;
pub mod stream;
pub mod turn;
pub mod websearch;

pub use client::{ApiMessage, ChatClient, Endpoint};
pub use context::ContextManager;
pub use error::{AgentError, Result};
pub use parser::{Action, ParsedReply, ReplyTag};
pub use stream::StreamEvent;
pub use turn::{
    CommandChoice, NoopNotifier, NotificationSink, RetryChoice, TurnConfig, TurnController,
    TurnEvent, TurnOutcome, UserInteraction,
};
pub use websearch::WebSearchClient;
