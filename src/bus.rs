// =============================================================================
// Tick bus — single-writer, multi-reader distribution
// =============================================================================
//
// The ingest supervisor is the only publisher. The candle pipeline reads a
// bounded mpsc queue (must-consume: a full queue applies backpressure to
// ingest rather than dropping). Fan-out and diagnostics read a broadcast
// channel (best-effort: slow observers lose the oldest ticks, never slow the
// pipeline). Ordering is preserved within a symbol because there is exactly
// one publisher.
// =============================================================================

use tokio::sync::{broadcast, mpsc};

use crate::types::Tick;

/// Engine queue depth; full means the candle pipeline is behind.
const ENGINE_QUEUE: usize = 4096;
/// Observer ring depth before drop-oldest kicks in.
const OBSERVER_RING: usize = 1024;

pub struct TickBus {
    engine_tx: mpsc::Sender<Tick>,
    observers: broadcast::Sender<Tick>,
}

impl TickBus {
    /// Build the bus and hand back the engine-side receiver.
    pub fn new() -> (Self, mpsc::Receiver<Tick>) {
        let (engine_tx, engine_rx) = mpsc::channel(ENGINE_QUEUE);
        let (observers, _) = broadcast::channel(OBSERVER_RING);
        (
            Self {
                engine_tx,
                observers,
            },
            engine_rx,
        )
    }

    /// Publish one tick. Blocks when the engine queue is full (backpressure);
    /// returns false when the engine side has shut down.
    pub async fn publish(&self, tick: Tick) -> bool {
        // Observers are best-effort; an error only means nobody is listening.
        let _ = self.observers.send(tick.clone());
        self.engine_tx.send(tick).await.is_ok()
    }

    /// Best-effort observer subscription (fan-out tick topic, diagnostics
    /// sampler).
    pub fn observe(&self) -> broadcast::Receiver<Tick> {
        self.observers.subscribe()
    }
}
