use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::model::RecordId;
use crate::store::{self, ImageRecordStore};

pub fn run<S: ImageRecordStore>(store: &mut S, id: RecordId) -> Result<CmdResult> {
    let record = store::promote(store, id)?;
    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "{} is now the primary image of {}",
        record.id, record.owner
    )));
    result.with_data(&record)
}
