#![doc = "template-publisher-core: build and publish pipeline for template packages."]

//! This crate contains the pipeline that turns a directory tree of template packages into a
//! published catalog: discovery, manifest derivation, archive packaging and upload.
//! Object-store access goes through the [`contract::ObjectStore`] trait so every phase can run
//! against a mock in tests.
//!
//! # Usage
//! The CLI crate wires a real store into [`pipeline::PipelineRunner`]; tests use
//! `contract::MockObjectStore`.

pub mod archive;
pub mod asset_key;
pub mod catalog;
pub mod config;
pub mod contract;
pub mod manifest;
pub mod pipeline;
pub mod publish;
pub mod report;
