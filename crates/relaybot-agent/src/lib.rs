//! Relaybot agent: the question-answering loop, its retrieval tool,
//! translation, and the command and relay front-ends.
//!
//! This crate contains:
//! - **tools**: Tool trait and the web retrieval tool
//! - **context**: Persona prompt and per-request prompts
//! - **agent_loop**: Bounded plan / act / summarize cycle
//! - **translate**: Automatic and manual translation
//! - **relay**: Source-channel to translation-channel mirroring
//! - **commands** / **dispatcher**: Slash-command grammar and execution
//! - **router**: Bus consumer that feeds the dispatcher and the relay

pub mod agent_loop;
pub mod commands;
pub mod context;
pub mod dispatcher;
pub mod relay;
pub mod router;
pub mod tools;
pub mod translate;

pub use agent_loop::{AgentLoop, APOLOGY};
pub use commands::{parse, Command, CommandParseError, Privilege};
pub use context::ContextBuilder;
pub use dispatcher::{CommandContext, CommandDispatcher, DispatcherServices, Reply};
pub use relay::Relay;
pub use router::InboundRouter;
pub use tools::{RetrievalTool, Tool};
pub use translate::{language_name, Translator, SUPPORTED_LANGUAGES};
