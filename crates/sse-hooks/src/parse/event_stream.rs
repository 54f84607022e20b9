//! [`Stream`] that converts a stream of byte chunks into [`SseMessage`]s.

use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use std::collections::VecDeque;

use futures_core::Stream;

use super::frame::FrameParser;
use crate::message::SseMessage;

pin_project_lite::pin_project! {
    /// A [`Stream`] adapter that runs a [`FrameParser`] over a byte stream.
    ///
    /// Errors of the underlying stream are passed through untouched; parsing
    /// itself never produces one. When the inner stream ends, any incomplete
    /// trailing frame is dropped.
    #[project = EventStreamProjection]
    #[derive(Debug)]
    pub struct EventStream<S> {
        #[pin]
        stream: S,
        parser: FrameParser,
        pending: VecDeque<SseMessage>,
        terminated: bool,
    }
}

impl<S> EventStream<S> {
    /// Create a new [`EventStream`] from an underlying byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            parser: FrameParser::new(),
            pending: VecDeque::new(),
            terminated: false,
        }
    }
}

impl<S, E, B> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<SseMessage, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(message) = this.pending.pop_front() {
            return Poll::Ready(Some(Ok(message)));
        }
        if *this.terminated {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.pending.extend(this.parser.feed(chunk.as_ref()));
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    *this.terminated = true;
                    this.pending.extend(this.parser.finish());
                    return Poll::Ready(this.pending.pop_front().map(Ok));
                }
            }

            if let Some(message) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(message)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn frames_split_across_chunks() {
        let messages = EventStream::new(futures_util::stream::iter(vec![
            Ok::<_, ()>(Bytes::from_static(b"event: status\ndata: {\"status\":\"start\"}\n\n")),
            Ok(Bytes::from_static(b"event: thi")),
            Ok(Bytes::from_static(b"nking\ndata: {\"text\":\"x\"}\n\n")),
            Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n\n")),
        ]))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .filter_map(Result::ok)
        .collect::<Vec<_>>();

        assert_eq!(
            messages,
            vec![
                SseMessage::new("status", "{\"status\":\"start\"}"),
                SseMessage::new("thinking", "{\"text\":\"x\"}"),
                SseMessage::data("{\"content\":\"a\"}"),
            ]
        );
    }

    #[tokio::test]
    async fn several_frames_in_one_chunk_come_out_in_order() {
        let messages = EventStream::new(futures_util::stream::iter(vec![Ok::<_, ()>(
            Bytes::from_static(b"data: 1\n\ndata: 2\n\ndata: 3\n\n"),
        )]))
        .filter_map(|item| async move { item.ok() })
        .map(|message| message.data)
        .collect::<Vec<_>>()
        .await;

        assert_eq!(messages, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let mut stream = EventStream::new(futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"data: before\n\n")),
            Err("connection reset"),
            Ok(Bytes::from_static(b"data: after\n\n")),
        ]));

        assert_eq!(
            stream.next().await,
            Some(Ok(SseMessage::data("before")))
        );
        assert_eq!(stream.next().await, Some(Err("connection reset")));
    }

    #[tokio::test]
    async fn trailing_partial_frame_is_dropped() {
        let mut stream = EventStream::new(futures_util::stream::iter(vec![Ok::<_, ()>(
            Bytes::from_static(b"data: done\n\ndata: partial"),
        )]));

        assert_eq!(stream.next().await, Some(Ok(SseMessage::data("done"))));
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
    }
}
