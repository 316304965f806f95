// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Multicast async subjects built on [tokio].
//!
//! ## What is a subject?
//!
//! A subject is a broadcast primitive: any number of producer tasks push
//! elements into it, and eventually a single termination signal (clean or
//! carrying a failure). Any number of consumer tasks subscribe to it, and
//! each subscription pulls its own ordered copy of every element sent after
//! it was registered, followed by the termination.
//!
//! The crate provides
//!
//! 1. The [subject::Subject] / [subject::SubjectReceiver] capability traits
//! 2. [subject::PassthroughSubject], the broadcast implementation (no replay,
//!    no current-value semantics)
//! 3. A small [subject::SubjectReceiverExt::for_each] helper to drain a
//!    subscription with a callback
//!
//! ## Crate organization
//!
//! Everything lives under the [subject] module; each module should be
//! self-documenting, and this root lib will likely contain little
//! information in favor of module-specific documentation.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! async_subjects = "0.1"
//! ```
//!

pub mod subject;
