//! Session and run orchestration for step-driven autonomous agents.
//!
//! `stepwire` sits between a long-running agent loop and many concurrent
//! client connections. Each connected client gets an
//! [`AgentSession`](session::AgentSession) that admits at most one run at a
//! time, drives the loop on its own tokio task, and turns every step into an
//! ordered stream of [`AgentEvent`](events::AgentEvent)s for that client
//! alone. Clients can push input and stop requests at any time; the run
//! observes them at well-defined suspension points.
//!
//! The agent loop itself is a black box behind the
//! [`AgentLoop`](agent::AgentLoop) trait: the orchestrator asks for one step,
//! gets back a tagged [`StepResult`](agent::StepResult), and decides what to
//! emit next.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use stepwire::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let core = CoreLoader::new(MyLoopFactory::default())
//!         .with_agent_version("1.4.0")
//!         .with_api_provider("openai")
//!         .load()
//!         .map_err(|e| e.to_string())?;
//!
//!     let emitter = Arc::new(ChannelEmitter::new());
//!     let registry = SessionRegistry::new(core, emitter.clone(), RegistryConfig::default());
//!
//!     let id = SessionId::generate();
//!     let mut events = emitter.subscribe(&id);
//!     registry.create_session(&id).map_err(|e| e.to_string())?;
//!
//!     let run = registry
//!         .start_run(&id, RunConfig::new("Write a haiku about borrow checking"))
//!         .map_err(|e| e.to_string())?;
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{}: {}", event.kind(), event.payload());
//!         }
//!     });
//!
//!     println!("run ended: {}", run.wait().await);
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Plug in an agent loop:** implement [`AgentLoop`](agent::AgentLoop) and
//!   [`LoopFactory`](agent::LoopFactory), then resolve them once with
//!   [`CoreLoader`](agent::CoreLoader). [`ScriptedLoop`](agent::ScriptedLoop)
//!   replays a fixed script and is handy for tests.
//!
//! - **Deliver events to clients:** implement
//!   [`EventEmitter`](events::EventEmitter). [`ChannelEmitter`](events::ChannelEmitter)
//!   hands out one channel per session, [`LoggingEmitter`](events::LoggingEmitter)
//!   logs through `tracing`, and [`CompositeEmitter`](events::CompositeEmitter)
//!   fans out to several.
//!
//! - **Manage sessions:** [`SessionRegistry`](session::SessionRegistry) is the
//!   id-addressed façade transports call; [`AgentSession`](session::AgentSession)
//!   is the per-client unit underneath.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Agent-loop contract, core loader, scripted loop |
//! | [`session`] | Sessions, run orchestration, registry, output workspaces |
//! | [`events`] | Event types and emitters |
//! | [`config`] | Run, session-limit, and registry configuration |
//! | [`error`] | Error types |

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod id;
pub mod prelude;
pub mod session;

pub use error::{CoreError, LoopError, SessionError};
pub use id::SessionId;
