// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # unravel
//!
//! A static JavaScript deobfuscator. `unravel` parses a script into an arena syntax tree
//! and rewrites it with a library of simplification rules until a full pass changes
//! nothing, producing equivalent and readable code.
//!
//! ## Features
//!
//! - **Fixed-point rewriting** - safe syntactic rules and oracle-backed rules alternate until convergence
//! - **Transactional edits** - rules stage marks in an [`Arborist`]; commits re-print and re-parse the script
//! - **Context collection** - the minimal ordered set of declarations needed to evaluate an expression out of place
//! - **Sandboxed evaluation** - an embedded QuickJS runtime with time and memory limits and a determinism check
//! - **Obfuscator detection** - family specific pre- and post-processing for common obfuscators
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use unravel::Deobfuscator;
//!
//! let mut deob = Deobfuscator::new("if (true) do_a(); else do_b();", true);
//! if deob.deobfuscate(false)? {
//!     println!("{}", deob.script);
//! }
//! # Ok::<(), unravel::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ast`] - arena AST, parser front-end, scope resolution, printer
//! - [`arborist`] - mutation ledger with conflict detection
//! - [`context`] - context collection for out-of-place evaluation
//! - [`oracle`] - sandboxed evaluation and value reification
//! - [`deobfuscation`] - rules, fixed-point scheduler, events, obfuscator detection
//!
//! The [`Deobfuscator`] facade ties these together for embedders.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use unravel::prelude::*;
///
/// let ast = Ast::parse("var a = 1;")?;
/// let arborist = Arborist::new();
/// assert_eq!(arborist.len(), 0);
/// # Ok::<(), unravel::Error>(())
/// ```
pub mod prelude;

pub mod arborist;
pub mod ast;
pub mod context;
pub mod deobfuscation;
pub mod oracle;

mod deobfuscator;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use unravel::{ast::Ast, Result};
///
/// fn count_calls(source: &str) -> Result<usize> {
///     let ast = Ast::parse(source)?;
///     Ok(ast.nodes_of(unravel::ast::NodeType::CallExpression).len())
/// }
/// # assert_eq!(count_calls("a(); b();").unwrap(), 2);
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `unravel` Error type
///
/// # Examples
///
/// ```rust
/// use unravel::{ast::Ast, Error};
///
/// match Ast::parse("var = ;") {
///     Ok(_) => println!("parsed"),
///     Err(Error::Parse { message, offset }) => println!("{offset}: {message}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;

pub use arborist::{Arborist, Mark, MarkAction};
pub use deobfuscator::Deobfuscator;
