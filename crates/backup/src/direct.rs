use crate::error::Error;
use crate::handler::JobHandler;
use futures::future::join_all;
use tubevault_storage::VideoItem;

/// Download and save every item concurrently, without going through the
/// job queue.
///
/// One video failing doesn't affect the others. The failures are returned in
/// input order; an empty list means everything was backed up.
pub async fn backup_immediately(handler: &JobHandler, items: &[VideoItem]) -> Vec<Error> {
    let results = join_all(items.iter().map(|item| handler.backup_video(item))).await;
    results.into_iter().filter_map(Result::err).collect()
}
