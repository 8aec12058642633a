//! Shared helpers for recipe integration tests.
#![allow(dead_code)]

use mdrecipe::{ExecuteOptions, Recipe, RecipeConfig, RecipeOutcome};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// True when bash is missing; callers return early.
pub fn skip_without_bash() -> bool {
    if find_in_path("bash").is_none() {
        eprintln!("Skipping: bash not found in PATH");
        return true;
    }
    false
}

/// Bash config with a short terminate grace so timeout tests stay fast.
pub fn config_in(dir: &Path) -> RecipeConfig {
    colored::control::set_override(false);
    RecipeConfig {
        working_dir: dir.to_path_buf(),
        terminate_grace: Duration::from_millis(200),
        link_backoff: Duration::from_millis(10),
        link_request_timeout: Duration::from_secs(5),
        ..RecipeConfig::default()
    }
}

pub fn parse(markdown: &str) -> Recipe {
    let dir = std::env::current_dir().expect("cwd");
    Recipe::parse_with(markdown, config_in(&dir)).expect("parse recipe")
}

pub fn run(markdown: &str, options: &ExecuteOptions) -> RecipeOutcome {
    let mut recipe = parse(markdown);
    let mut prompt = mdrecipe::prompt::ScriptedPrompt::default();
    recipe.execute_with_prompt(options, &mut prompt)
}

pub fn run_default(markdown: &str) -> RecipeOutcome {
    run(markdown, &ExecuteOptions::default())
}
