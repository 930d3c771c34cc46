use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::model::{EventData, SessionCounters};

/// One frame of the search-progress protocol (§6.3). `serde`'s internally
/// tagged representation is the idiomatic encoding of this dynamically
/// tagged wire union.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StreamFrame {
    Session {
        session_id: Uuid,
    },
    Progress {
        message: String,
        articles_scraped: u64,
        articles_extracted: u64,
        events_matched: u64,
        sources_done: u64,
        sources_total: u64,
    },
    Event {
        event: EventData,
    },
    Complete {
        total_events: u64,
        articles_processed: u64,
        processing_time: f64,
    },
    Cancelled {
        total_events: u64,
        message: String,
    },
    Error {
        message: String,
        recoverable: bool,
    },
}

impl StreamFrame {
    pub fn progress(message: impl Into<String>, counters: SessionCounters) -> Self {
        StreamFrame::Progress {
            message: message.into(),
            articles_scraped: counters.articles_scraped,
            articles_extracted: counters.articles_extracted,
            events_matched: counters.events_matched,
            sources_done: counters.sources_done,
            sources_total: counters.sources_total,
        }
    }
}

/// Accepts a blocking `Emit(frame)`; the orchestrator does not assume acks
/// (§6.1, "Session Stream Sink"). Implementations are responsible for their
/// own back-pressure — a slow sink should slow the orchestrator, not drop
/// frames (§9).
#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn emit(&self, frame: StreamFrame);
}

/// Collects every emitted frame into memory, for tests and small CLI tools.
#[derive(Default)]
pub struct VecStreamSink {
    frames: tokio::sync::Mutex<Vec<StreamFrame>>,
}

impl VecStreamSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn into_frames(self) -> Vec<StreamFrame> {
        self.frames.into_inner()
    }

    pub async fn frames_snapshot(&self) -> Vec<StreamFrame> {
        self.frames.lock().await.clone()
    }
}

#[async_trait]
impl StreamSink for VecStreamSink {
    async fn emit(&self, frame: StreamFrame) {
        self.frames.lock().await.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_frame_serializes_with_tag() {
        let frame = StreamFrame::Session {
            session_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event_type"], "session");
        assert_eq!(json["session_id"], Uuid::nil().to_string());
    }

    #[tokio::test]
    async fn test_vec_stream_sink_collects_frames_in_order() {
        let sink = VecStreamSink::new();
        sink.emit(StreamFrame::Session {
            session_id: Uuid::nil(),
        })
        .await;
        sink.emit(StreamFrame::Complete {
            total_events: 0,
            articles_processed: 0,
            processing_time: 0.0,
        })
        .await;
        let frames = sink.frames_snapshot().await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], StreamFrame::Session { .. }));
        assert!(matches!(frames[1], StreamFrame::Complete { .. }));
    }
}
