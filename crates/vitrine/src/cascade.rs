//! # Client Fallback Cascade
//!
//! The retry policy an image element follows when its `src` fails to load. One
//! cascade per element; it never coordinates with other loads.
//!
//! On each load error the next applicable strategy runs, in fixed order:
//!
//! 1. `/uploads/...` → `uploads/...` (drop the leading slash)
//! 2. `blob:...` → the "processing" placeholder, terminal
//! 3. relative → origin-absolute, when an origin is known
//! 4. the canonical uploads path built from the bare filename
//!
//! A strategy runs at most once, and a URL already tried is never retried. The
//! fourth error (or running out of strategies) settles on the permanent
//! placeholder. [`ImageCascade::set_source`] starts over.

use crate::config::VitrineConfig;
use crate::model::Owner;
use crate::paths;
use serde::Serialize;
use std::collections::BTreeSet;

/// Error events after which the cascade gives up.
pub const MAX_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    StripLeadingSlash,
    ProcessingPlaceholder,
    OriginAbsolute,
    CanonicalPath,
}

const STRATEGIES: [Strategy; 4] = [
    Strategy::StripLeadingSlash,
    Strategy::ProcessingPlaceholder,
    Strategy::OriginAbsolute,
    Strategy::CanonicalPath,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeConfig {
    pub uploads_prefix: String,
    /// e.g. `https://shop.example`; strategy 3 is skipped without one.
    pub origin: Option<String>,
    pub processing_url: String,
    pub placeholder_url: String,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            uploads_prefix: "/uploads/".to_string(),
            origin: None,
            processing_url: "/static/img/processing.png".to_string(),
            placeholder_url: "/static/img/placeholder.png".to_string(),
        }
    }
}

impl From<&VitrineConfig> for CascadeConfig {
    fn from(config: &VitrineConfig) -> Self {
        Self {
            uploads_prefix: config.url_prefix(),
            origin: None,
            processing_url: config.placeholder.processing_url.clone(),
            placeholder_url: config.placeholder.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Settled {
    /// The current `src` loaded.
    Loaded,
    /// Showing the processing image for a local upload.
    Processing,
    /// Gave up; showing the permanent placeholder.
    Placeholder,
}

/// What the element should do after an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum CascadeStep {
    Retry { src: String, strategy: Strategy },
    Settled { src: String, settled: Settled },
}

#[derive(Debug, Clone)]
pub struct ImageCascade {
    config: CascadeConfig,
    owner: Option<Owner>,
    requested: String,
    current: String,
    attempts: u32,
    tried: BTreeSet<Strategy>,
    seen: BTreeSet<String>,
    settled: Option<Settled>,
}

impl ImageCascade {
    pub fn new(src: impl Into<String>, config: CascadeConfig) -> Self {
        let src = src.into();
        let mut cascade = Self {
            config,
            owner: None,
            requested: String::new(),
            current: String::new(),
            attempts: 0,
            tried: BTreeSet::new(),
            seen: BTreeSet::new(),
            settled: None,
        };
        cascade.reset(src);
        cascade
    }

    /// Lets strategy 4 build the owner's canonical path instead of a flat one.
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn current_src(&self) -> &str {
        &self.current
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn settled(&self) -> Option<Settled> {
        self.settled
    }

    /// Point the element at a different image. Same source: no-op.
    pub fn set_source(&mut self, src: impl Into<String>) {
        let src = src.into();
        if src != self.requested {
            self.reset(src);
        }
    }

    fn reset(&mut self, src: String) {
        self.requested = src.clone();
        self.current = src.clone();
        self.attempts = 0;
        self.tried.clear();
        self.seen.clear();
        self.seen.insert(src);
        self.settled = None;
    }

    pub fn on_load(&mut self) -> CascadeStep {
        if self.settled.is_none() {
            self.settled = Some(Settled::Loaded);
        }
        self.settled_step()
    }

    pub fn on_error(&mut self) -> CascadeStep {
        if self.settled.is_some() {
            // A failing placeholder must not start another round.
            if self.settled == Some(Settled::Loaded) {
                self.settle(Settled::Placeholder);
            }
            return self.settled_step();
        }

        self.attempts += 1;
        if self.attempts >= MAX_ATTEMPTS {
            self.settle(Settled::Placeholder);
            return self.settled_step();
        }

        for strategy in STRATEGIES {
            if self.tried.contains(&strategy) {
                continue;
            }
            let Some(next) = self.apply(strategy) else {
                continue;
            };
            self.tried.insert(strategy);

            if strategy == Strategy::ProcessingPlaceholder {
                self.settle(Settled::Processing);
                return self.settled_step();
            }
            if !self.seen.insert(next.clone()) {
                continue;
            }
            self.current = next;
            return CascadeStep::Retry {
                src: self.current.clone(),
                strategy,
            };
        }

        self.settle(Settled::Placeholder);
        self.settled_step()
    }

    fn settle(&mut self, settled: Settled) {
        self.current = match settled {
            Settled::Loaded => return,
            Settled::Processing => self.config.processing_url.clone(),
            Settled::Placeholder => self.config.placeholder_url.clone(),
        };
        self.settled = Some(settled);
    }

    fn settled_step(&self) -> CascadeStep {
        CascadeStep::Settled {
            src: self.current.clone(),
            settled: self.settled.unwrap_or(Settled::Placeholder),
        }
    }

    /// Candidate URL for `strategy`, if it applies to the current `src`.
    fn apply(&self, strategy: Strategy) -> Option<String> {
        let src = self.current.as_str();
        match strategy {
            Strategy::StripLeadingSlash => src
                .starts_with(&self.config.uploads_prefix)
                .then(|| src[1..].to_string()),
            Strategy::ProcessingPlaceholder => src
                .to_ascii_lowercase()
                .starts_with("blob:")
                .then(|| self.config.processing_url.clone()),
            Strategy::OriginAbsolute => {
                let origin = self.config.origin.as_deref()?;
                if is_absolute(src) {
                    return None;
                }
                Some(format!(
                    "{}/{}",
                    origin.trim_end_matches('/'),
                    src.trim_start_matches('/')
                ))
            }
            Strategy::CanonicalPath => {
                let name = file_name(src)?;
                let relative = match &self.owner {
                    Some(owner) => paths::build_path(owner, name).ok()?,
                    None => paths::validate_filename(name).ok()?.to_string(),
                };
                Some(format!("{}{}", self.config.uploads_prefix, relative))
            }
        }
    }
}

fn is_absolute(src: &str) -> bool {
    src.contains("://") || src.starts_with("//") || src.starts_with("data:") || src.starts_with("blob:")
}

/// Last path segment, without query or fragment.
fn file_name(src: &str) -> Option<&str> {
    if src.starts_with("data:") {
        return None;
    }
    let end = src.find(['?', '#']).unwrap_or(src.len());
    let name = src[..end].rsplit('/').next()?;
    (!name.is_empty()).then_some(name)
}
