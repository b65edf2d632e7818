//! Absolute Learner: a WhatsApp mentor that teaches one skill a day.
//!
//! Inbound messages arrive on a Twilio webhook. `start` or `hi` hands the
//! learner the next unseen topic with a three-slot daily plan; anything else is
//! answered by an OpenAI-compatible completion API, primed with the learner's
//! current topic. Learner progress lives in SQLite.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod conversation;
pub mod learning;
pub mod logging;
pub mod orchestrator;
pub mod profiles;
pub mod providers;
pub mod server;
pub mod whatsapp;
