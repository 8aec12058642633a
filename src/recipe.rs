//! Whole-document orchestration: parse once, run in two passes, report.
use crate::annotation::{AnnotationError, Scanner};
use crate::config::{ExecuteOptions, RecipeConfig};
use crate::document;
use crate::links::{HttpFetcher, LinkRecord, LinkValidator};
use crate::prompt::{Prompt, TerminalPrompt};
use crate::report;
use crate::step::Step;

/// Result of one execution: the aggregate verdict and the rendered report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeOutcome {
    pub success: bool,
    pub report: String,
}

#[derive(Debug)]
pub struct Recipe {
    steps: Vec<Step>,
    links: Vec<LinkRecord>,
    config: RecipeConfig,
}

impl Recipe {
    /// Parse with the default configuration.
    pub fn parse(markdown: &str) -> Result<Self, AnnotationError> {
        Self::parse_with(markdown, RecipeConfig::default())
    }

    /// Parse `markdown` into steps and links. Nothing runs on failure.
    pub fn parse_with(markdown: &str, config: RecipeConfig) -> Result<Self, AnnotationError> {
        let mut scanner = Scanner::new(&config);
        document::render(markdown, &mut scanner)?;
        let (steps, links) = scanner.finish()?;
        tracing::debug!(steps = steps.len(), links = links.len(), "parsed recipe");
        Ok(Self {
            steps,
            links,
            config,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    pub fn links(&self) -> &[LinkRecord] {
        &self.links
    }

    pub fn config(&self) -> &RecipeConfig {
        &self.config
    }

    /// Describe every step without spawning anything.
    pub fn dry_run(&self) -> String {
        self.steps.iter().map(Step::dry_run).collect()
    }

    /// Execute on the terminal, prompting on stdin for manual pauses.
    pub fn execute(&mut self, options: &ExecuteOptions) -> RecipeOutcome {
        self.execute_with_prompt(options, &mut TerminalPrompt)
    }

    pub fn execute_with_prompt(
        &mut self,
        options: &ExecuteOptions,
        prompt: &mut dyn Prompt,
    ) -> RecipeOutcome {
        let selected: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.selected_by(&options.tags))
            .map(|(index, _)| index)
            .collect();
        tracing::info!(
            selected = selected.len(),
            total = self.steps.len(),
            "executing recipe"
        );

        let mut success = true;
        for &index in &selected {
            let step = &mut self.steps[index];
            if !step.run_all_commands(options.manual, prompt) {
                tracing::warn!(step = step.name(), "step failed; skipping remaining steps");
                success = false;
                break;
            }
        }

        // Every selected step is joined, including those never reached above,
        // so no started background process outlives the run.
        let mut report = String::new();
        for &index in &selected {
            let step = &mut self.steps[index];
            if !step.wait_for_all_background_commands() {
                success = false;
            }
            let (valid, section) = step.validate_and_report();
            if !valid {
                success = false;
            }
            report.push_str(&section);
        }

        if options.validate_links {
            let validator = LinkValidator::new(
                HttpFetcher::new(self.config.link_request_timeout),
                options.link_retries,
                self.config.link_backoff,
            );
            let (links_ok, results) = validator.validate(&self.links);
            if !links_ok {
                success = false;
            }
            report.push_str(&report::links_section(&results));
        }

        RecipeOutcome { success, report }
    }
}
