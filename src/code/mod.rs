//! The typed instruction stream
//!
//! ### Structure
//!
//! A method body is an ordered, append-only list of [`Instruction`]s over typed virtual
//! registers ([`Local`]) and jump targets ([`Label`]). The [`CodeBuilder`] accumulates the list
//! for one method and eagerly enforces every statically decidable contract: register types,
//! argument counts, return types, operand sets. Failures that only whole-body information
//! reveals (an unbound label) are deferred to materialization, and failures that only execution
//! reveals (division by zero, a bad cast) are deferred to the generated code's own run.
//!
//! ### Building a body
//!
//! [`crate::generator::Generator::declare_method`] opens the one builder a method gets. Locals
//! and labels are scoped to that builder; using them with a different one is a build error.

mod code_builder;
mod instructions;
mod label;
mod local;

pub use code_builder::*;
pub use instructions::*;
pub use label::*;
pub use local::*;
