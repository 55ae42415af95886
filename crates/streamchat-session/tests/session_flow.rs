//! Sender and receiver loops exercised through the public transport
//! traits, with the socket halves replaced by in-memory doubles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use streamchat_foundation::{SessionError, ShutdownHandler};
use streamchat_session::{
    AudioSegment, ImageFrame, Multiplexer, OutboundItem, ReceiverLoop, SenderLoop, SessionEvent,
    SessionSink, SessionStream,
};
use streamchat_telemetry::PipelineMetrics;

struct CollectingSink {
    mime_types: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SessionSink for CollectingSink {
    async fn send(&mut self, item: OutboundItem) -> Result<(), SessionError> {
        self.mime_types
            .lock()
            .unwrap()
            .push(item.mime_type().to_string());
        Ok(())
    }

    async fn send_text(&mut self, _text: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

struct ScriptedStream {
    events: VecDeque<Result<Option<SessionEvent>, SessionError>>,
}

#[async_trait]
impl SessionStream for ScriptedStream {
    async fn next_event(&mut self) -> Result<Option<SessionEvent>, SessionError> {
        self.events.pop_front().unwrap_or(Ok(None))
    }
}

#[tokio::test]
async fn queued_items_reach_the_sink_in_order() {
    let metrics = PipelineMetrics::default();
    let guard = ShutdownHandler::new().install().await;
    let (mux_tx, mux_rx) = Multiplexer::bounded(5);
    let mime_types = Arc::new(Mutex::new(Vec::new()));
    let sink = CollectingSink {
        mime_types: mime_types.clone(),
    };
    let handle = tokio::spawn(SenderLoop::new(mux_rx, sink, metrics.clone(), guard).run());

    mux_tx
        .enqueue(OutboundItem::Audio(AudioSegment::from_samples(
            &[1, 2, 3],
            16_000,
        )))
        .await
        .unwrap();
    mux_tx
        .enqueue(OutboundItem::Image(ImageFrame::new(
            vec![0x89, 0x50],
            "image/png",
        )))
        .await
        .unwrap();
    drop(mux_tx);

    handle.await.unwrap();
    assert_eq!(
        mime_types.lock().unwrap().as_slice(),
        ["audio/pcm", "image/png"]
    );
    assert_eq!(metrics.snapshot().items_sent, 2);
}

#[tokio::test]
async fn reply_stream_yields_turns_after_the_handshake() {
    let metrics = PipelineMetrics::default();
    let guard = ShutdownHandler::new().install().await;
    let (turns_tx, mut turns_rx) = mpsc::channel(8);
    let stream = ScriptedStream {
        events: VecDeque::from(vec![
            // Handshake: the session acknowledging the system message.
            Ok(Some(SessionEvent::Text("understood".into()))),
            Ok(Some(SessionEvent::TurnComplete)),
            // First real turn, split across fragments.
            Ok(Some(SessionEvent::Text("{\"message\":".into()))),
            Ok(Some(SessionEvent::Text("\"hi\",\"relevancy\":90}".into()))),
            Ok(Some(SessionEvent::TurnComplete)),
        ]),
    };

    ReceiverLoop::new(stream, turns_tx, metrics.clone(), guard)
        .run()
        .await;

    let turn = turns_rx.try_recv().expect("one completed turn");
    assert_eq!(turn, "{\"message\":\"hi\",\"relevancy\":90}");
    assert!(turns_rx.try_recv().is_err());
    assert_eq!(metrics.snapshot().turns_completed, 1);
}
