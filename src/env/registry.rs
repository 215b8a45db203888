//! Name → adapter factory lookup.
//!
//! The service and the CLI resolve an environment name once per request; the
//! registry is read-only after startup.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{HarnessError, Result};

use super::traits::EnvSettings;
use super::{
    alfworld::AlfWorldClient, babyai::BabyAiClient, maze::MazeClient, mock::ScriptedClient,
    sciworld::SciWorldClient, sqlgym::SqlGymClient, textcraft::TextCraftClient,
    webshop::WebShopClient, wordle::WordleClient, AnyClient,
};

/// Builds one adapter for a pool slot.
pub type ClientFactory = fn(&EnvSettings) -> Result<AnyClient>;

/// Registered environment adapters keyed by name.
#[derive(Clone)]
pub struct EnvRegistry {
    factories: BTreeMap<&'static str, ClientFactory>,
}

impl EnvRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Every adapter shipped with the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("babyai", |s| BabyAiClient::new(s).map(AnyClient::BabyAi));
        registry.register("textcraft", |s| TextCraftClient::new(s).map(AnyClient::TextCraft));
        registry.register("sciworld", |s| SciWorldClient::new(s).map(AnyClient::SciWorld));
        registry.register("alfworld", |s| AlfWorldClient::new(s).map(AnyClient::AlfWorld));
        registry.register("webshop", |s| WebShopClient::new(s).map(AnyClient::WebShop));
        registry.register("sqlgym", |s| SqlGymClient::new(s).map(AnyClient::SqlGym));
        registry.register("maze", |s| MazeClient::new(s).map(AnyClient::Maze));
        registry.register("wordle", |s| WordleClient::new(s).map(AnyClient::Wordle));
        registry.register("mock", |s| ScriptedClient::new(s).map(AnyClient::Mock));
        registry
    }

    /// Add or replace an adapter.
    pub fn register(&mut self, name: &'static str, factory: ClientFactory) {
        self.factories.insert(name, factory);
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name.to_ascii_lowercase().as_str())
    }

    /// Look up `name` (case-insensitive) and build one client.
    pub fn build(&self, name: &str, settings: &EnvSettings) -> Result<AnyClient> {
        let key = name.to_ascii_lowercase();
        match self.factories.get(key.as_str()) {
            Some(factory) => factory(settings),
            None => Err(HarnessError::UnknownEnvironment {
                name: name.to_string(),
                known: self.names().join(", "),
            }),
        }
    }
}

impl fmt::Debug for EnvRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
