//! Twelve Labs integration for the footage similarity pipeline
//!
//! This crate provides a client for the video-understanding service: listing
//! the indexed catalog, retrieving per-video embeddings and reading/writing
//! per-video user metadata.

pub mod client;

pub use client::{TwelveLabsClient, TwelveLabsConfig, TWELVELABS_API_BASE};
