use streamchat_foundation::SessionError;
use tokio::sync::mpsc;

/// One fixed-duration chunk of canonical-format audio (mono i16 PCM at
/// the pipeline's target rate), immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pcm: Vec<u8>,
    sample_rate: u32,
}

impl AudioSegment {
    pub const MIME_TYPE: &'static str = "audio/pcm";

    /// Build from mono samples, encoding as little-endian i16 bytes.
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            pcm.extend_from_slice(&s.to_le_bytes());
        }
        Self { pcm, sample_rate }
    }

    pub fn data(&self) -> &[u8] {
        &self.pcm
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }
}

/// One encoded screen snapshot, opaque bytes plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    data: Vec<u8>,
    mime_type: String,
}

impl ImageFrame {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// The only type flowing through the multiplexer queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundItem {
    Audio(AudioSegment),
    Image(ImageFrame),
}

impl OutboundItem {
    pub fn mime_type(&self) -> &str {
        match self {
            OutboundItem::Audio(_) => AudioSegment::MIME_TYPE,
            OutboundItem::Image(frame) => frame.mime_type(),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            OutboundItem::Audio(seg) => seg.data(),
            OutboundItem::Image(frame) => frame.data(),
        }
    }
}

/// Bounded FIFO between the two producer lanes and the sender. The
/// small capacity is the point: a slow session blocks the producers
/// (admission control) instead of growing memory or dropping items.
pub struct Multiplexer;

impl Multiplexer {
    pub fn bounded(capacity: usize) -> (MuxSender, MuxReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (MuxSender { tx }, MuxReceiver { rx })
    }
}

#[derive(Clone)]
pub struct MuxSender {
    tx: mpsc::Sender<OutboundItem>,
}

impl MuxSender {
    /// Enqueue one item, suspending while the queue is full. Errors
    /// only when the consumer side is gone.
    pub async fn enqueue(&self, item: OutboundItem) -> Result<(), SessionError> {
        self.tx.send(item).await.map_err(|_| SessionError::Closed)
    }
}

pub struct MuxReceiver {
    rx: mpsc::Receiver<OutboundItem>,
}

impl MuxReceiver {
    /// Dequeue the next item in FIFO order, suspending while empty.
    /// Returns None once every producer handle has been dropped.
    pub async fn dequeue(&mut self) -> Option<OutboundItem> {
        self.rx.recv().await
    }
}
