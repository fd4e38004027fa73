use crate::commands::{CmdMessage, CmdResult};
use crate::config::VitrineConfig;
use crate::error::{Result, VitrineError};
use crate::files::FileBackend;
use crate::routes::{self, ImageResponse, ImageRoute};
use crate::store::ImageRecordStore;

/// Answer `path` as the HTTP layer would: a primary-image route or an uploads
/// path.
pub fn run<S: ImageRecordStore, F: FileBackend>(
    store: &S,
    files: &F,
    config: &VitrineConfig,
    path: &str,
) -> Result<CmdResult> {
    let response = match ImageRoute::parse(path) {
        Some(route) => routes::primary_image(store, files, config, route),
        None => routes::serve_upload(files, config, path, None).ok_or_else(|| {
            VitrineError::Api(format!(
                "Not an image route or under {}: {}",
                config.url_prefix(),
                path
            ))
        })?,
    };

    let mut result = CmdResult::default();
    result.add_message(describe(&response));
    result.with_data(&response)
}

pub(crate) fn describe(response: &ImageResponse) -> CmdMessage {
    let file = response
        .file
        .as_ref()
        .map(|f| f.display().to_string())
        .unwrap_or_default();
    match (response.status, response.placeholder) {
        (routes::STATUS_OK, None) => {
            CmdMessage::success(format!("200 {} ({})", file, response.content_type))
        }
        (routes::STATUS_OK, Some(kind)) => {
            CmdMessage::warning(format!("200 placeholder {:?}: {}", kind, file))
        }
        (status, _) => CmdMessage::error(format!("{} rejected", status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MessageLevel;
    use crate::files::mem::MemFiles;
    use crate::model::{NewImage, Owner};
    use crate::store::memory::MemoryRecordStore;

    #[test]
    fn store_route_serves_file() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::store(4), "a.png").primary())
            .unwrap();
        let files = MemFiles::with_files(["stores/4/a.png"]);
        let result = run(&store, &files, &VitrineConfig::default(), "/api/stores/4/primary-image").unwrap();
        assert!(result.has_level(MessageLevel::Success));
        assert_eq!(result.data.unwrap()["status"], 200);
    }

    #[test]
    fn traversal_is_rejected() {
        let store = MemoryRecordStore::new();
        let files = MemFiles::new();
        let result = run(&store, &files, &VitrineConfig::default(), "/uploads/../../etc/passwd").unwrap();
        assert!(result.has_level(MessageLevel::Error));
        assert_eq!(result.data.unwrap()["status"], 403);
    }

    #[test]
    fn unrelated_paths_are_an_error() {
        let store = MemoryRecordStore::new();
        let files = MemFiles::new();
        assert!(run(&store, &files, &VitrineConfig::default(), "/about").is_err());
    }
}
