#![doc = "eelc-core: core logic library for eelc."]

//! This crate holds the data model and pipeline for exporting land-cover
//! chips for satellite tile footprints. HTTP clients for the real services
//! live in the `eelc` crate; everything here talks to them through the traits
//! in [`contract`].
//!
//! # Usage
//! Build a [`synchronise::SynchroniseConfig`], provide a
//! [`contract::ComputeService`] and a [`contract::ObjectStore`], and call
//! [`synchronise::synchronise`].

pub mod cache;
pub mod config;
pub mod contract;
pub mod error;
pub mod export;
pub mod filter;
pub mod footprint;
pub mod projection;
pub mod scheduler;
pub mod synchronise;
pub mod tile;
