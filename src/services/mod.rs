// SPDX-License-Identifier: MIT

//! Service layer: provider clients, token management, sync, and the
//! conversational assistant.

pub mod assistant;
pub mod chat;
pub mod fatsecret;
pub mod oauth1;
pub mod scheduler;
pub mod sync;
pub mod token_vault;
pub mod whoop;

pub use assistant::OpenAiClient;
pub use chat::ChatService;
pub use fatsecret::{FatSecretClient, FatSecretService};
pub use scheduler::Scheduler;
pub use sync::SyncEngine;
pub use token_vault::TokenVault;
pub use whoop::{WhoopClient, WhoopService};
