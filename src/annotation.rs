//! Directive scanner that groups document events into steps and links.
use crate::config::RecipeConfig;
use crate::document::{Event, EventSink};
use crate::links::{self, LinkRecord};
use crate::metadata::StepMetadata;
use crate::step::Step;
use thiserror::Error;

pub const STEP: &str = "STEP";
pub const END_STEP: &str = "END_STEP";
pub const IGNORE_LINKS: &str = "IGNORE_LINKS";
pub const END_IGNORE: &str = "END_IGNORE";

/// A malformed document. Always fatal before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("invalid step metadata: {0}")]
    InvalidMetadata(String),
    #[error("invalid output_match_mode {value:?} (expected one of: {valid})")]
    InvalidMatchMode { value: String, valid: String },
    #[error("invalid match_order {value:?} (expected one of: {valid})")]
    InvalidMatchOrder { value: String, valid: String },
    #[error("unexpected <!-- END_STEP --> found")]
    UnexpectedEndStep,
    #[error("<!-- STEP --> found while step {0:?} is still open")]
    NestedStep(String),
    #[error("unexpected <!-- END_IGNORE --> found")]
    UnexpectedEndIgnore,
    #[error("<!-- IGNORE_LINKS --> found inside an ignored region")]
    NestedIgnore,
    #[error("step {0:?} is missing <!-- END_STEP -->")]
    UnterminatedStep(String),
    #[error("ignored region is missing <!-- END_IGNORE -->")]
    UnterminatedIgnore,
}

/// Depth-one state machine over comment directives.
pub struct Scanner<'a> {
    config: &'a RecipeConfig,
    current: Option<Step>,
    steps: Vec<Step>,
    links: Vec<LinkRecord>,
    ignoring: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(config: &'a RecipeConfig) -> Self {
        Self {
            config,
            current: None,
            steps: Vec::new(),
            links: Vec::new(),
            ignoring: false,
        }
    }

    /// Close the scan, rejecting anything left open.
    pub fn finish(self) -> Result<(Vec<Step>, Vec<LinkRecord>), AnnotationError> {
        if let Some(step) = self.current {
            return Err(AnnotationError::UnterminatedStep(step.name().to_string()));
        }
        if self.ignoring {
            return Err(AnnotationError::UnterminatedIgnore);
        }
        Ok((self.steps, self.links))
    }

    fn comment(&mut self, body: &str) -> Result<(), AnnotationError> {
        if body.contains(END_STEP) {
            let step = self.current.take().ok_or(AnnotationError::UnexpectedEndStep)?;
            tracing::debug!(step = step.name(), "closed step");
            self.steps.push(step);
            return Ok(());
        }

        if body.contains(END_IGNORE) {
            if !self.ignoring {
                return Err(AnnotationError::UnexpectedEndIgnore);
            }
            self.ignoring = false;
            tracing::debug!("left ignored link region");
        } else if body.contains(IGNORE_LINKS) {
            if self.ignoring {
                return Err(AnnotationError::NestedIgnore);
            }
            self.ignoring = true;
            tracing::debug!("entered ignored link region");
        }

        let Some(start) = body.find(STEP) else {
            return Ok(());
        };
        if let Some(open) = &self.current {
            return Err(AnnotationError::NestedStep(open.name().to_string()));
        }
        let metadata = StepMetadata::parse(&body[start + STEP.len()..])?;
        let step = Step::from_metadata(metadata, self.config)?;
        tracing::debug!(step = step.name(), "opened step");
        self.current = Some(step);
        Ok(())
    }
}

impl EventSink for Scanner<'_> {
    type Error = AnnotationError;

    fn handle(&mut self, event: Event<'_>) -> Result<(), AnnotationError> {
        match event {
            Event::Comment(body) => self.comment(body),
            Event::CodeBlock { text, lang } => {
                if let (Some("bash" | "sh"), Some(step)) = (lang, self.current.as_mut()) {
                    step.add_command_block(text);
                }
                Ok(())
            }
            Event::Link(url) => {
                if links::is_external(url) {
                    self.links.push(LinkRecord {
                        url: url.to_string(),
                        ignored: self.ignoring,
                    });
                }
                Ok(())
            }
        }
    }
}
