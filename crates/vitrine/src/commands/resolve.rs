use crate::commands::{CmdMessage, CmdResult};
use crate::config::VitrineConfig;
use crate::error::Result;
use crate::files::FileBackend;
use crate::model::Owner;
use crate::resolver::{FallbackStep, ResolvedImage, Resolver};
use crate::store::ImageRecordStore;

pub fn run<S: ImageRecordStore, F: FileBackend>(
    store: &S,
    files: &F,
    config: &VitrineConfig,
    owner: &Owner,
) -> Result<CmdResult> {
    let resolved = Resolver::new(store, files)
        .with_tie_break(config.tie_break)
        .with_placeholder_filename(config.placeholder.filename.clone())
        .resolve_primary(owner);

    let mut result = CmdResult::default();
    match &resolved {
        ResolvedImage::File {
            path,
            record,
            step,
            ..
        } => {
            result.add_message(CmdMessage::success(format!(
                "{} -> {} (record {})",
                owner,
                path.display(),
                record
            )));
            if *step != FallbackStep::Canonical {
                result.add_message(CmdMessage::warning(format!(
                    "Served from a legacy location ({:?}); run `vitrine repair` to move it.",
                    step
                )));
            }
        }
        ResolvedImage::Placeholder { reason } => {
            result.add_message(CmdMessage::warning(format!(
                "{} -> placeholder ({:?})",
                owner, reason
            )));
        }
    }

    result.with_data(&resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MessageLevel;
    use crate::files::mem::MemFiles;
    use crate::model::NewImage;
    use crate::store::memory::MemoryRecordStore;

    #[test]
    fn resolve_reports_legacy_location() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::product(3, 21);
        store.insert(NewImage::new(owner, "x.jpg").primary()).unwrap();
        let files = MemFiles::with_files(["x.jpg"]);

        let result = run(&store, &files, &VitrineConfig::default(), &owner).unwrap();
        assert!(result.has_level(MessageLevel::Success));
        assert!(result.messages[1].content.contains("legacy"));
        let data = result.data.unwrap();
        assert_eq!(data["outcome"], "file");
        assert_eq!(data["step"], "uploads-root");
    }

    #[test]
    fn resolve_placeholder() {
        let store = MemoryRecordStore::new();
        let files = MemFiles::new();
        let result = run(&store, &files, &VitrineConfig::default(), &Owner::store(4)).unwrap();
        assert!(result.messages[0].content.contains("placeholder"));
        assert_eq!(result.data.unwrap()["reason"], "no-records");
    }
}
