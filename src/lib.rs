//! Turn annotated markdown into an executable, self-verifying recipe.
//!
//! Shell code blocks wrapped in `<!-- STEP ... -->` / `<!-- END_STEP -->`
//! comments become steps. Each step runs its commands under a timeout and
//! checks return codes and output lines against the YAML metadata in the
//! opening comment. External links in the same document can optionally be
//! checked with bounded retries.
pub mod annotation;
pub mod command;
pub mod config;
pub mod document;
pub mod links;
pub mod matcher;
pub mod metadata;
pub mod prompt;
pub mod recipe;
mod report;
pub mod step;

pub use annotation::AnnotationError;
pub use config::{ExecuteOptions, RecipeConfig};
pub use recipe::{Recipe, RecipeOutcome};
