//! Environment clients and their shared HTTP plumbing.
//!
//! Every environment implements the [`EnvClient`] trait so that the task pool
//! and the evaluator can drive it uniformly.
//!
//! Included environments:
//! - **BabyAI** ([`babyai`]) -- grid-world navigation.
//! - **TextCraft** ([`textcraft`]) -- Minecraft-style crafting.
//! - **ScienceWorld** ([`sciworld`]) -- science experiments.
//! - **ALFWorld** ([`alfworld`]) -- text-based household tasks.
//! - **WebShop** ([`webshop`]) -- product search and purchase.
//! - **SQLGym** ([`sqlgym`]) -- SQL question answering.
//! - **Maze** ([`maze`]) and **Wordle** ([`wordle`]) -- LMRL-Gym games.
//! - **Mock** ([`mock`]) -- scripted, in-memory episodes for offline runs.

pub mod action;
pub mod alfworld;
pub mod babyai;
pub mod maze;
pub mod mock;
pub mod registry;
pub mod sciworld;
pub mod server;
pub mod session;
pub mod sqlgym;
pub mod textcraft;
pub mod traits;
pub mod webshop;
pub mod wordle;

pub use registry::EnvRegistry;
pub use traits::{EnvClient, EnvSettings, SessionId};

use crate::conversation::{ConversationMessage, StepOutput};
use crate::error::Result;

// ---------------------------------------------------------------------------
// AnyClient: enum dispatch wrapper for runtime environment selection
// ---------------------------------------------------------------------------

/// An enum wrapper around all concrete adapters, enabling runtime selection
/// by name without `dyn` (which is incompatible with async trait methods).
#[derive(Debug)]
pub enum AnyClient {
    BabyAi(babyai::BabyAiClient),
    TextCraft(textcraft::TextCraftClient),
    SciWorld(sciworld::SciWorldClient),
    Maze(maze::MazeClient),
    Wordle(wordle::WordleClient),
    AlfWorld(alfworld::AlfWorldClient),
    WebShop(webshop::WebShopClient),
    SqlGym(sqlgym::SqlGymClient),
    Mock(mock::ScriptedClient),
}

impl EnvClient for AnyClient {
    fn name(&self) -> &str {
        match self {
            Self::BabyAi(c) => c.name(),
            Self::TextCraft(c) => c.name(),
            Self::SciWorld(c) => c.name(),
            Self::Maze(c) => c.name(),
            Self::Wordle(c) => c.name(),
            Self::AlfWorld(c) => c.name(),
            Self::WebShop(c) => c.name(),
            Self::SqlGym(c) => c.name(),
            Self::Mock(c) => c.name(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::BabyAi(c) => c.len(),
            Self::TextCraft(c) => c.len(),
            Self::SciWorld(c) => c.len(),
            Self::Maze(c) => c.len(),
            Self::Wordle(c) => c.len(),
            Self::AlfWorld(c) => c.len(),
            Self::WebShop(c) => c.len(),
            Self::SqlGym(c) => c.len(),
            Self::Mock(c) => c.len(),
        }
    }

    fn conversation_start(&self) -> &[ConversationMessage] {
        match self {
            Self::BabyAi(c) => c.conversation_start(),
            Self::TextCraft(c) => c.conversation_start(),
            Self::SciWorld(c) => c.conversation_start(),
            Self::Maze(c) => c.conversation_start(),
            Self::Wordle(c) => c.conversation_start(),
            Self::AlfWorld(c) => c.conversation_start(),
            Self::WebShop(c) => c.conversation_start(),
            Self::SqlGym(c) => c.conversation_start(),
            Self::Mock(c) => c.conversation_start(),
        }
    }

    fn observe(&self, session: &SessionId) -> String {
        match self {
            Self::BabyAi(c) => c.observe(session),
            Self::TextCraft(c) => c.observe(session),
            Self::SciWorld(c) => c.observe(session),
            Self::Maze(c) => c.observe(session),
            Self::Wordle(c) => c.observe(session),
            Self::AlfWorld(c) => c.observe(session),
            Self::WebShop(c) => c.observe(session),
            Self::SqlGym(c) => c.observe(session),
            Self::Mock(c) => c.observe(session),
        }
    }

    async fn create(&mut self) -> Result<SessionId> {
        match self {
            Self::BabyAi(c) => c.create().await,
            Self::TextCraft(c) => c.create().await,
            Self::SciWorld(c) => c.create().await,
            Self::Maze(c) => c.create().await,
            Self::Wordle(c) => c.create().await,
            Self::AlfWorld(c) => c.create().await,
            Self::WebShop(c) => c.create().await,
            Self::SqlGym(c) => c.create().await,
            Self::Mock(c) => c.create().await,
        }
    }

    async fn reset(&mut self, session: &SessionId, data_idx: usize) -> Result<serde_json::Value> {
        match self {
            Self::BabyAi(c) => c.reset(session, data_idx).await,
            Self::TextCraft(c) => c.reset(session, data_idx).await,
            Self::SciWorld(c) => c.reset(session, data_idx).await,
            Self::Maze(c) => c.reset(session, data_idx).await,
            Self::Wordle(c) => c.reset(session, data_idx).await,
            Self::AlfWorld(c) => c.reset(session, data_idx).await,
            Self::WebShop(c) => c.reset(session, data_idx).await,
            Self::SqlGym(c) => c.reset(session, data_idx).await,
            Self::Mock(c) => c.reset(session, data_idx).await,
        }
    }

    async fn step(&mut self, session: &SessionId, action_text: &str) -> Result<StepOutput> {
        match self {
            Self::BabyAi(c) => c.step(session, action_text).await,
            Self::TextCraft(c) => c.step(session, action_text).await,
            Self::SciWorld(c) => c.step(session, action_text).await,
            Self::Maze(c) => c.step(session, action_text).await,
            Self::Wordle(c) => c.step(session, action_text).await,
            Self::AlfWorld(c) => c.step(session, action_text).await,
            Self::WebShop(c) => c.step(session, action_text).await,
            Self::SqlGym(c) => c.step(session, action_text).await,
            Self::Mock(c) => c.step(session, action_text).await,
        }
    }

    async fn close(&mut self, session: &SessionId) {
        match self {
            Self::BabyAi(c) => c.close(session).await,
            Self::TextCraft(c) => c.close(session).await,
            Self::SciWorld(c) => c.close(session).await,
            Self::Maze(c) => c.close(session).await,
            Self::Wordle(c) => c.close(session).await,
            Self::AlfWorld(c) => c.close(session).await,
            Self::WebShop(c) => c.close(session).await,
            Self::SqlGym(c) => c.close(session).await,
            Self::Mock(c) => c.close(session).await,
        }
    }

    fn is_success(&self, last: &StepOutput) -> bool {
        match self {
            Self::BabyAi(c) => c.is_success(last),
            Self::TextCraft(c) => c.is_success(last),
            Self::SciWorld(c) => c.is_success(last),
            Self::Maze(c) => c.is_success(last),
            Self::Wordle(c) => c.is_success(last),
            Self::AlfWorld(c) => c.is_success(last),
            Self::WebShop(c) => c.is_success(last),
            Self::SqlGym(c) => c.is_success(last),
            Self::Mock(c) => c.is_success(last),
        }
    }
}
