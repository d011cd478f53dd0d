#![doc = "paperbot-core: core logic library for paperbot."]

//! This crate holds the publication ledger, the feed deduplication logic and
//! the publish pipeline. The posting service is reached only through the
//! [`contract::Publisher`] trait; its concrete client lives in the CLI crate.
//!
//! # Usage
//! Build a [`config::SyncConfig`], pick a [`contract::FeedSource`] (usually
//! [`feed::HttpFeedSource`]) and a [`contract::Publisher`], then call
//! [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod feed;
pub mod filter;
pub mod ledger;
pub mod synchronise;
pub mod timestamp;
