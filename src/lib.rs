//! # kb-chat
//!
//! A chat assistant that grounds a hosted generative model in a bundled JSON
//! knowledge base.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Knowledge │──▶│ Matcher  │──▶│  Prompt  │──▶│ Gateway  │
//! │  (JSON)   │   │ (scan)   │   │ Composer │   │ (Gemini) │
//! └───────────┘   └──────────┘   └──────────┘   └────┬─────┘
//!                                                    ▼
//!          ┌──────────┐     ┌──────────────┐   ┌──────────────┐
//!          │  Voice   │────▶│ ChatSession  │──▶│ Conversation │
//!          │ rec/STT  │     └──────┬───────┘   └──────────────┘
//!          └──────────┘            │
//!                         ┌────────┴────────┐
//!                         ▼                 ▼
//!                    ┌─────────┐       ┌─────────┐
//!                    │   CLI   │       │  HTTP   │
//!                    │(kbchat) │       │  API    │
//!                    └─────────┘       └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`knowledge`] | Loading JSON assets into a [`knowledge::Document`] |
//! | [`matcher`] | Case-insensitive keyword search over a document |
//! | [`prompt`] | Prompt composition |
//! | [`gateway`] | Remote text generation and error classification |
//! | [`conversation`] | Message log and shared conversation state |
//! | [`session`] | The chat pipeline used by every surface |
//! | [`voice`] | Recording, speech-to-text and text-to-speech collaborators |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod conversation;
pub mod gateway;
pub mod knowledge;
pub mod matcher;
pub mod prompt;
pub mod server;
pub mod session;
pub mod voice;
