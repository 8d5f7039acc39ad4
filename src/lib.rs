//! Scripted customer-support chat: issue selection, ticket generation,
//! message exchange and escalation to a (simulated) live agent.

pub mod bus;
pub mod chat;
pub mod config;
pub mod entity;
pub mod error;
pub mod interface;
pub mod manager;
pub mod store;
pub mod ticket;
pub mod transition;
