use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt};

/// The outcome of reading a stream up to its sentinel item.
pub struct ReadAhead<T> {
    /// The key the sentinel carried, if one was seen before the stream ended
    /// or failed
    pub key: Option<String>,
    /// Every item, buffered ones first, in original order
    pub items: BoxStream<'static, Result<T>>,
}

/// Consume `stream` until `sentinel` recognizes an item (or an error arrives),
/// then hand back the captured key together with a stream that replays the
/// buffered items before the untouched remainder.
pub async fn read_ahead<T, F>(mut stream: BoxStream<'static, Result<T>>, mut sentinel: F) -> ReadAhead<T>
where
    T: Send + 'static,
    F: FnMut(&T) -> Option<String>,
{
    let mut buffered = Vec::new();
    while let Some(item) = stream.next().await {
        let key = match &item {
            Ok(value) => sentinel(value),
            Err(_) => None,
        };
        let stop = key.is_some() || item.is_err();
        buffered.push(item);
        if stop {
            return ReadAhead {
                key,
                items: stream::iter(buffered).chain(stream).boxed(),
            };
        }
    }
    ReadAhead {
        key: None,
        items: stream::iter(buffered).boxed(),
    }
}
