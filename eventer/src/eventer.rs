//! Public pull API over the TCP state-change event stream
//!
//! An [`Eventer`] merges the event and dropped-count queues into a single
//! stream of decoded events. It is open from construction until
//! [`Eventer::close`], after which every read fails with [`EventerClosed`].

use crate::{
    config::EventerConfig,
    decoder::{CStructDecoder, Decoder},
    dropped::{DropHandler, LoggingDropHandler},
    endian::ByteOrder,
    error::EventerClosed,
    events::runtime_handle,
    factory::AyaModuleFactory,
    object::{EmbeddedObjectSource, FileObjectSource, ObjectSource},
    runner::{BpfRunner, Runner},
    types::Event,
};
use anyhow::{Context, Result};
use bytes::Bytes;
use log::warn;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc::Receiver, watch, Mutex as AsyncMutex};

/// Stream of TCP state-change events from the kernel
///
/// `event` may be awaited from several tasks at once; each item is
/// delivered to exactly one of them.
pub struct Eventer {
    decoder: Box<dyn Decoder>,
    drop_handler: Box<dyn DropHandler>,
    runner: Mutex<Option<Box<dyn Runner>>>,
    queues: AsyncMutex<Queues>,
    shutdown: watch::Sender<bool>,
}

impl Eventer {
    /// Load the embedded BPF program with the default configuration
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_config(EventerConfig::default())
    }

    /// Load the BPF program with the given configuration
    ///
    /// Must be called from within a Tokio runtime; outside one this fails
    /// before anything is loaded into the kernel.
    pub fn with_config(config: EventerConfig) -> Result<Self> {
        runtime_handle().context("loading BPF")?;

        let source: Box<dyn ObjectSource> = match &config.object_path {
            Some(path) => Box::new(FileObjectSource::new(path)),
            None => Box::new(EmbeddedObjectSource),
        };
        let factory = AyaModuleFactory::new(source);
        let runner = BpfRunner::new(&config, Box::new(factory))?;

        Self::from_parts(
            Box::new(CStructDecoder::new(ByteOrder::native())),
            Box::new(runner),
            Box::new(LoggingDropHandler),
        )
    }

    /// Run `runner` and build an eventer over its queues
    ///
    /// If the runner fails to start it is closed before the error is
    /// returned.
    ///
    /// # Arguments
    ///
    /// * `decoder` - Converts raw records into events
    /// * `runner` - Not yet run; its queues are taken once it starts
    /// * `drop_handler` - Called with each dropped event count
    ///
    /// # Returns
    ///
    /// An open eventer reading from the runner's queues
    pub fn from_parts(
        decoder: Box<dyn Decoder>,
        mut runner: Box<dyn Runner>,
        drop_handler: Box<dyn DropHandler>,
    ) -> Result<Self> {
        let queues = match runner
            .run()
            .context("loading BPF")
            .and_then(|()| Queues::take(runner.as_mut()))
        {
            Ok(queues) => queues,
            Err(err) => {
                if let Err(close_err) = runner.close() {
                    warn!("Failed to close BPF runner after load failure: {:#}", close_err);
                }
                return Err(err);
            }
        };

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            decoder,
            drop_handler,
            runner: Mutex::new(Some(runner)),
            queues: AsyncMutex::new(queues),
            shutdown,
        })
    }

    /// Wait for the next event
    ///
    /// A decode error only affects this call; the stream stays open.
    /// Dropped-event counts are passed to the drop handler and never
    /// returned. Once the eventer is closed this returns [`EventerClosed`]
    /// without waiting, including for calls already blocked here.
    pub async fn event(&self) -> Result<Event> {
        loop {
            if self.is_closed() {
                return Err(EventerClosed.into());
            }

            let delivery = tokio::select! {
                biased;
                _ = self.closed() => return Err(EventerClosed.into()),
                delivery = self.next_delivery() => delivery,
            };

            match delivery {
                Delivery::Event(data) => {
                    return self.decoder.to_event(&data).context("deserialising event");
                }
                Delivery::DropCount(count) => {
                    // Go around again to find an event that was not dropped
                    if let Err(err) = self.drop_handler.handle(count) {
                        warn!("Error handling dropped events: {:#}", err);
                    }
                }
                // The runner was closed underneath us
                Delivery::EndOfStream => return Err(EventerClosed.into()),
            }
        }
    }

    /// Stop the stream and unload the BPF program
    ///
    /// Wakes every pending [`event`](Self::event) call. Closing twice is a
    /// caller error and returns [`EventerClosed`].
    pub fn close(&self) -> Result<()> {
        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut runner) = runner else {
            return Err(EventerClosed.into());
        };

        self.shutdown.send_replace(true);

        runner.close().context("closing BPF runner")
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once `close` has been called
    async fn closed(&self) {
        let mut shutdown = self.shutdown.subscribe();
        // The sender lives as long as self, so this only returns once closed
        let _ = shutdown.wait_for(|closed| *closed).await;
    }

    async fn next_delivery(&self) -> Delivery {
        let mut queues = self.queues.lock().await;
        queues.next().await
    }
}

/// One item taken from the runner's queues
enum Delivery {
    Event(Bytes),
    DropCount(u64),
    EndOfStream,
}

struct Queues {
    events: Receiver<Bytes>,
    drop_counts: Receiver<u64>,
    /// Poll the drop count queue before the event queue on the next wait
    drops_first: bool,
}

impl Queues {
    fn take(runner: &mut dyn Runner) -> Result<Self> {
        Ok(Self {
            events: runner
                .event_queue()
                .context("BPF runner provided no event queue")?,
            drop_counts: runner
                .drop_count_queue()
                .context("BPF runner provided no drop count queue")?,
            drops_first: false,
        })
    }

    /// Wait for whichever queue is ready first
    ///
    /// When both are ready the queue not serviced last wins, so neither
    /// can starve the other.
    async fn next(&mut self) -> Delivery {
        let delivery = if self.drops_first {
            tokio::select! {
                biased;
                count = self.drop_counts.recv() => count.map_or(Delivery::EndOfStream, Delivery::DropCount),
                data = self.events.recv() => data.map_or(Delivery::EndOfStream, Delivery::Event),
            }
        } else {
            tokio::select! {
                biased;
                data = self.events.recv() => data.map_or(Delivery::EndOfStream, Delivery::Event),
                count = self.drop_counts.recv() => count.map_or(Delivery::EndOfStream, Delivery::DropCount),
            }
        };

        self.drops_first = matches!(delivery, Delivery::Event(_));
        delivery
    }
}
