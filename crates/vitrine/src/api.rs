//! # API Facade
//!
//! The single entry point for every vitrine operation, whatever the client
//! (the CLI today, an HTTP server embedding the crate tomorrow).
//!
//! The facade:
//! - **Normalizes inputs**: owner strings (`store:4`, `product:3:21`) become
//!   [`Owner`]s, record ids (`s12`, `p7`) become [`RecordId`]s
//! - **Dispatches** to `commands/*.rs`
//! - **Returns** `Result<CmdResult>`, never prints
//!
//! Business logic belongs in the command modules, not here.
//!
//! ## Generic Over Storage
//!
//! `VitrineApi<S: ImageRecordStore, F: FileBackend>`:
//! - Production: `VitrineApi<ConfiguredStore, DiskFiles>`
//! - Testing: `VitrineApi<MemoryRecordStore, MemFiles>`

use crate::commands::{self, VitrinePaths};
use crate::config::VitrineConfig;
use crate::error::Result;
use crate::files::FileBackend;
use crate::model::{Owner, RecordId};
use crate::reconcile::RepairPolicy;
use crate::store::ImageRecordStore;

pub use crate::commands::{CmdMessage, CmdResult, MessageLevel};

pub struct VitrineApi<S: ImageRecordStore, F: FileBackend> {
    store: S,
    files: F,
    config: VitrineConfig,
    paths: VitrinePaths,
}

impl<S: ImageRecordStore, F: FileBackend> VitrineApi<S, F> {
    pub fn new(store: S, files: F, config: VitrineConfig, paths: VitrinePaths) -> Self {
        Self {
            store,
            files,
            config,
            paths,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    pub fn config(&self) -> &VitrineConfig {
        &self.config
    }

    pub fn paths(&self) -> &VitrinePaths {
        &self.paths
    }

    pub fn resolve(&self, owner: &str) -> Result<CmdResult> {
        let owner: Owner = owner.parse()?;
        commands::resolve::run(&self.store, &self.files, &self.config, &owner)
    }

    pub fn route(&self, path: &str) -> Result<CmdResult> {
        commands::route::run(&self.store, &self.files, &self.config, path)
    }

    pub fn guard(&self, path: &str, owner: Option<&str>) -> Result<CmdResult> {
        let owner = parse_owner(owner)?;
        commands::guard::run(&self.files, &self.config, path, owner.as_ref())
    }

    pub fn doctor(&mut self) -> Result<CmdResult> {
        commands::doctor::run(&mut self.store, &self.files, self.config.repair_policy())
    }

    /// `dedupe` turns dedupe mode on for this run; it never turns a configured
    /// dedupe off.
    pub fn repair(&mut self, dedupe: bool, dry_run: bool) -> Result<CmdResult> {
        let policy = RepairPolicy {
            dedupe: dedupe || self.config.repair.dedupe,
            ..self.config.repair_policy()
        };
        commands::repair::run(
            &mut self.store,
            &self.files,
            policy,
            Some(self.paths.lock_file.clone()),
            dry_run,
        )
    }

    pub fn promote(&mut self, id: &str) -> Result<CmdResult> {
        let id: RecordId = id.parse()?;
        commands::promote::run(&mut self.store, id)
    }

    pub fn cascade(
        &self,
        src: &str,
        owner: Option<&str>,
        origin: Option<&str>,
    ) -> Result<CmdResult> {
        let owner = parse_owner(owner)?;
        commands::cascade::run(&self.files, &self.config, src, owner.as_ref(), origin)
    }

    pub fn show_config(&self, template: bool) -> Result<CmdResult> {
        commands::config::run(&self.config, &self.paths, template)
    }
}

fn parse_owner(owner: Option<&str>) -> Result<Option<Owner>> {
    owner.map(str::parse).transpose()
}
