pub mod aggregator;
pub mod audio_lane;
pub mod live;
pub mod outbound;
pub mod sender;
pub mod snapshot;
pub mod transport;

// Public API
pub use aggregator::{ReceiverLoop, TurnAggregator};
pub use audio_lane::AudioLane;
pub use live::{LiveSession, LiveSessionSink, LiveSessionStream};
pub use outbound::{AudioSegment, ImageFrame, Multiplexer, MuxReceiver, MuxSender, OutboundItem};
pub use sender::SenderLoop;
pub use snapshot::{CommandScreenSource, ScreenSource, SnapshotLoop};
pub use transport::{SessionEvent, SessionSink, SessionStream};
