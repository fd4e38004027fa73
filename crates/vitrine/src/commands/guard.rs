use crate::commands::{CmdMessage, CmdResult};
use crate::config::VitrineConfig;
use crate::error::Result;
use crate::files::FileBackend;
use crate::guard::{GuardDecision, PathGuard};
use crate::model::Owner;

pub fn run<F: FileBackend>(
    files: &F,
    config: &VitrineConfig,
    path: &str,
    owner: Option<&Owner>,
) -> Result<CmdResult> {
    let decision = PathGuard::new(files, &config.uploads_url_prefix).check(path, owner);

    let message = match &decision {
        GuardDecision::Serve {
            relative,
            step: None,
            ..
        } => CmdMessage::success(format!("serve {}", relative)),
        GuardDecision::Serve {
            relative,
            step: Some(step),
            ..
        } => CmdMessage::success(format!("serve {} (found via {:?})", relative, step)),
        GuardDecision::Placeholder { kind } => {
            CmdMessage::warning(format!("placeholder ({:?})", kind))
        }
        GuardDecision::Forbidden { reason } => CmdMessage::error(format!("forbidden: {}", reason)),
        GuardDecision::NotHandled => CmdMessage::info(format!(
            "not under {}; the guard does not handle it",
            config.url_prefix()
        )),
    };

    let mut result = CmdResult::default();
    result.add_message(message);
    result.with_data(&decision)
}
