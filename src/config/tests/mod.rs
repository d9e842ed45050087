//! Unit tests for trainbot configuration types.
//!
//! This module contains tests organised into:
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults and TOML deserialisation
//! - [`validation`] - `AppConfig::validate` rules
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
