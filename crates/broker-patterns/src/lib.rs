// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! Hierarchical wildcard pattern repository.
//!
//! Destinations are dotted token sequences (`foo.bar.baz`). Consumers
//! register values against patterns built from those tokens plus two
//! wildcards: `*` stands in for exactly one token, `#` for zero or more
//! trailing tokens. Looking a destination up walks every registered pattern
//! that matches it, orders the matches from least to most specific, and
//! either returns the most specific value outright or folds them together
//! with a caller-supplied [`Reducer`].
//!
//! # Cache coherence
//!
//! Reads are served from a [`dashmap::DashMap`] cache without taking the
//! repository's lock at all; a miss falls through to a locked recompute
//! that repopulates the cache. Every mutation clears the cache *before*
//! applying itself, so a reader racing a writer either sees the cache
//! already cleared (and recomputes under the writer's updated state) or
//! completes before the writer starts — never a result older than the
//! last completed mutation. See [`PatternRepository`] for the full
//! protocol.

pub mod error;
pub mod pattern;
pub mod repository;

pub use error::PatternError;
pub use pattern::{specificity_cmp, Pattern, MULTI_WILDCARD, SINGLE_WILDCARD};
pub use repository::{ListenerId, PatternRepository, Reducer};
