//! Replay the client fallback cascade against the local uploads tree.
//!
//! Every candidate `src` is "loaded" by asking the guard for it; a load succeeds
//! only when the guard would stream a real file. Placeholders count as
//! failures, the way a broken `<img>` would look to the user.

use crate::cascade::{CascadeConfig, CascadeStep, ImageCascade, MAX_ATTEMPTS};
use crate::commands::{CmdMessage, CmdResult};
use crate::config::VitrineConfig;
use crate::error::Result;
use crate::files::FileBackend;
use crate::model::Owner;
use crate::routes;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub src: String,
    pub loaded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CascadeTrace {
    pub attempts: Vec<Attempt>,
    pub result: CascadeStep,
}

pub fn run<F: FileBackend>(
    files: &F,
    config: &VitrineConfig,
    src: &str,
    owner: Option<&Owner>,
    origin: Option<&str>,
) -> Result<CmdResult> {
    let mut cascade_config = CascadeConfig::from(config);
    cascade_config.origin = origin.map(str::to_string);
    let mut cascade = ImageCascade::new(src, cascade_config);
    if let Some(owner) = owner {
        cascade = cascade.with_owner(*owner);
    }

    let mut attempts = Vec::new();
    let mut result = CmdResult::default();
    // One load per error event plus the final successful one.
    let step = loop {
        let current = cascade.current_src().to_string();
        let loaded = loads(files, config, origin, &current);
        let step = if loaded {
            cascade.on_load()
        } else {
            cascade.on_error()
        };
        result.add_message(if loaded {
            CmdMessage::success(format!("load {}", current))
        } else {
            CmdMessage::warning(format!("error {}", current))
        });
        attempts.push(Attempt {
            src: current,
            loaded,
        });
        if matches!(step, CascadeStep::Settled { .. }) || attempts.len() > MAX_ATTEMPTS as usize {
            break step;
        }
    };

    if let CascadeStep::Settled { src, settled } = &step {
        result.add_message(CmdMessage::info(format!("settled on {} ({:?})", src, settled)));
    }
    result.with_data(&CascadeTrace {
        attempts,
        result: step,
    })
}

fn loads<F: FileBackend>(
    files: &F,
    config: &VitrineConfig,
    origin: Option<&str>,
    src: &str,
) -> bool {
    let local = match origin.and_then(|o| src.strip_prefix(o.trim_end_matches('/'))) {
        Some(rest) => rest.to_string(),
        None if src.contains(':') => return false,
        None if src.starts_with('/') => src.to_string(),
        None => format!("/{}", src),
    };
    match routes::serve_upload(files, config, &local, None) {
        Some(response) => response.status == routes::STATUS_OK && !response.is_placeholder(),
        None => false,
    }
}
