pub mod consumer;
pub mod events;
pub mod framing;
pub mod record;
pub mod throttle;

pub use consumer::{CancelHandle, Increment, StreamingMetricsConsumer, Turn, TurnReport};
pub use events::TurnEvent;
pub use framing::{frame_lines, LineStream, NdjsonCodec};
pub use record::StreamRecord;
pub use throttle::RenderThrottle;

/// Presentation capability: receives the full accumulated response text
/// whenever the consumer decides a re-render is due.
pub trait Renderer: Send {
    /// A new turn starts; nothing rendered so far belongs to it.
    fn begin(&mut self) {}

    fn render(&mut self, accumulated: &str);
}
