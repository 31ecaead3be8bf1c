use futures_util::{future, Stream, StreamExt};
use switchboard_core::SwitchboardResult;

/// Turns a stream of text deltas into a stream of growing snapshots.
///
/// Each item is the whole text received so far. An error is passed through
/// and the snapshot built up to it is kept for the next item.
pub fn cumulative<S>(deltas: S) -> impl Stream<Item = SwitchboardResult<String>>
where
    S: Stream<Item = SwitchboardResult<String>>,
{
    deltas.scan(String::new(), |acc, delta| {
        let item = delta.map(|d| {
            acc.push_str(&d);
            acc.clone()
        });
        future::ready(Some(item))
    })
}
