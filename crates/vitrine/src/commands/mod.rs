//! # Command Layer
//!
//! One submodule per operation. Commands do the work and return a structured
//! [`CmdResult`]; they never print, parse arguments or pick exit codes. The CLI
//! renders messages for humans and `data` for `--json`.
//!
//! Command tests run against `MemoryRecordStore` and `MemFiles`.
//!
//! - [`resolve`]: primary image of an owner
//! - [`route`]: answer an HTTP path the way the server would
//! - [`guard`]: the guard's verdict on an uploads path
//! - [`doctor`]: diagnose records against files
//! - [`repair`]: diagnose, plan and apply repairs
//! - [`promote`]: make one record the owner's sole primary
//! - [`cascade`]: simulate the client fallback cascade
//! - [`config`]: show the effective configuration

use crate::error::Result;
use serde::Serialize;
use std::path::PathBuf;

pub mod cascade;
pub mod config;
pub mod doctor;
pub mod guard;
pub mod promote;
pub mod repair;
pub mod resolve;
pub mod route;

#[derive(Debug, Clone)]
pub struct VitrinePaths {
    pub uploads_root: PathBuf,
    /// Lock serializing repair runs.
    pub lock_file: PathBuf,
    /// Where the configuration was looked up, most specific first.
    pub config_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CmdMessage {
    pub level: MessageLevel,
    pub content: String,
}

impl CmdMessage {
    pub fn info(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            content: content.into(),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            content: content.into(),
        }
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            content: content.into(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct CmdResult {
    pub messages: Vec<CmdMessage>,
    /// Machine-readable payload, emitted as-is by `--json`.
    pub data: Option<serde_json::Value>,
}

impl CmdResult {
    pub fn add_message(&mut self, message: CmdMessage) {
        self.messages.push(message);
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    pub fn has_level(&self, level: MessageLevel) -> bool {
        self.messages.iter().any(|m| m.level == level)
    }
}
