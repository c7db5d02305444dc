//! Bring-up of the TCP state-change BPF program
//!
//! Creates the module, loads it into the kernel, attaches the tracepoint
//! program and starts the perf buffer feeding the event queues.

use crate::{
    config::EventerConfig,
    factory::ModuleFactory,
    module::Module,
    types::kernel::constants::{MODULE_NAME, PERF_BUFFER_NAME, PROGRAM_NAME, TRACEPOINT},
};
use anyhow::{Context, Result};
use bytes::Bytes;
use log::info;
use tokio::sync::mpsc::{self, Receiver};

/// Loads the BPF program and exposes the queues it feeds
///
/// If the kernel buffer is full and events have to be dropped, the number
/// of dropped events is delivered on the drop count queue.
pub trait Runner: Send {
    /// Load, attach and start polling. On failure, `close` must still be
    /// called to release whatever was loaded before the failing step.
    fn run(&mut self) -> Result<()>;

    /// Receiving end of the raw event queue, handed over once after `run`
    fn event_queue(&mut self) -> Option<Receiver<Bytes>>;

    /// Receiving end of the dropped event count queue, handed over once after `run`
    fn drop_count_queue(&mut self) -> Option<Receiver<u64>>;

    /// Unload the BPF program. No more items are queued afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Runner driving a [`Module`] created by a [`ModuleFactory`]
pub struct BpfRunner {
    event_queue_capacity: usize,
    drop_count_queue_capacity: usize,
    perf_buffer_pages: usize,
    factory: Box<dyn ModuleFactory>,

    module: Option<Box<dyn Module>>,
    event_queue: Option<Receiver<Bytes>>,
    drop_count_queue: Option<Receiver<u64>>,
}

impl BpfRunner {
    /// Create a runner that has not loaded anything yet
    ///
    /// # Arguments
    ///
    /// * `config` - Queue capacities and perf buffer size, validated here
    /// * `factory` - Creates the module when the runner is run
    ///
    /// # Returns
    ///
    /// BpfRunner ready to `run`, or an error if the configuration is invalid
    pub fn new(config: &EventerConfig, factory: Box<dyn ModuleFactory>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            event_queue_capacity: config.event_queue_capacity,
            drop_count_queue_capacity: config.drop_count_queue_capacity,
            perf_buffer_pages: config.perf_buffer_pages,
            factory,
            module: None,
            event_queue: None,
            drop_count_queue: None,
        })
    }
}

impl Runner for BpfRunner {
    fn run(&mut self) -> Result<()> {
        let module = self
            .factory
            .create_module(MODULE_NAME)
            .context("creating BPF module")?;
        let module = self.module.insert(module);

        module
            .load_object()
            .context("loading BPF object into kernel")?;

        let mut program = module
            .program(PROGRAM_NAME)
            .context("loading BPF program")?;
        program
            .attach_tracepoint(TRACEPOINT)
            .context("attaching to tracepoint")?;
        drop(program);

        let (events, event_queue) = mpsc::channel(self.event_queue_capacity);
        let (drop_counts, drop_count_queue) = mpsc::channel(self.drop_count_queue_capacity);

        let buffer = module
            .init_perf_buffer(PERF_BUFFER_NAME, events, drop_counts, self.perf_buffer_pages)
            .context("initialising perf buffer")?;
        self.event_queue = Some(event_queue);
        self.drop_count_queue = Some(drop_count_queue);
        buffer.start().context("starting perf buffer")?;

        info!("BPF program running");

        Ok(())
    }

    fn event_queue(&mut self) -> Option<Receiver<Bytes>> {
        self.event_queue.take()
    }

    fn drop_count_queue(&mut self) -> Option<Receiver<u64>> {
        self.drop_count_queue.take()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut module) = self.module.take() {
            info!("Closing BPF module");
            module.close();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{module::PerfBuffer, program::Program};
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::Sender;

    #[derive(Debug, thiserror::Error)]
    #[error("mock {0} error")]
    struct MockError(&'static str);

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Step {
        CreateModule,
        LoadObject,
        GetProgram,
        AttachTracepoint,
        InitPerfBuffer,
        Start,
    }

    /// Everything the mocks were asked to do
    #[derive(Default)]
    struct Calls {
        created_module: Option<String>,
        loaded_object: bool,
        requested_program: Option<String>,
        attached_tracepoint: Option<String>,
        perf_buffer: Option<(String, usize)>,
        started: bool,
        closed: bool,
        events: Option<Sender<Bytes>>,
        drop_counts: Option<Sender<u64>>,
    }

    type SharedCalls = Arc<Mutex<Calls>>;

    fn fail_at(failing: Option<Step>, step: Step, name: &'static str) -> Result<()> {
        if failing == Some(step) {
            return Err(anyhow!(MockError(name)));
        }
        Ok(())
    }

    struct MockFactory {
        calls: SharedCalls,
        failing: Option<Step>,
    }

    impl ModuleFactory for MockFactory {
        fn create_module(&self, name: &str) -> Result<Box<dyn Module>> {
            self.calls.lock().unwrap().created_module = Some(name.to_string());
            fail_at(self.failing, Step::CreateModule, "create module")?;

            Ok(Box::new(MockModule {
                calls: Arc::clone(&self.calls),
                failing: self.failing,
            }))
        }
    }

    struct MockModule {
        calls: SharedCalls,
        failing: Option<Step>,
    }

    impl Module for MockModule {
        fn load_object(&mut self) -> Result<()> {
            self.calls.lock().unwrap().loaded_object = true;
            fail_at(self.failing, Step::LoadObject, "load object")
        }

        fn program(&mut self, name: &str) -> Result<Box<dyn Program + '_>> {
            self.calls.lock().unwrap().requested_program = Some(name.to_string());
            fail_at(self.failing, Step::GetProgram, "get program")?;

            Ok(Box::new(MockProgram {
                calls: Arc::clone(&self.calls),
                failing: self.failing,
            }))
        }

        fn init_perf_buffer(
            &mut self,
            name: &str,
            events: Sender<Bytes>,
            drop_counts: Sender<u64>,
            page_count: usize,
        ) -> Result<Box<dyn PerfBuffer>> {
            {
                let mut calls = self.calls.lock().unwrap();
                calls.perf_buffer = Some((name.to_string(), page_count));
                calls.events = Some(events);
                calls.drop_counts = Some(drop_counts);
            }
            fail_at(self.failing, Step::InitPerfBuffer, "init perf buffer")?;

            Ok(Box::new(MockPerfBuffer {
                calls: Arc::clone(&self.calls),
                failing: self.failing,
            }))
        }

        fn close(&mut self) {
            let mut calls = self.calls.lock().unwrap();
            calls.closed = true;
            // Tearing down the module stops the producers
            calls.events = None;
            calls.drop_counts = None;
        }
    }

    struct MockProgram {
        calls: SharedCalls,
        failing: Option<Step>,
    }

    impl Program for MockProgram {
        fn attach_tracepoint(&mut self, tracepoint: &str) -> Result<()> {
            self.calls.lock().unwrap().attached_tracepoint = Some(tracepoint.to_string());
            fail_at(self.failing, Step::AttachTracepoint, "attach tracepoint")
        }
    }

    struct MockPerfBuffer {
        calls: SharedCalls,
        failing: Option<Step>,
    }

    impl PerfBuffer for MockPerfBuffer {
        fn start(self: Box<Self>) -> Result<()> {
            self.calls.lock().unwrap().started = true;
            fail_at(self.failing, Step::Start, "start")
        }
    }

    fn new_runner(failing: Option<Step>) -> (BpfRunner, SharedCalls) {
        let calls = SharedCalls::default();
        let factory = MockFactory {
            calls: Arc::clone(&calls),
            failing,
        };
        let runner = BpfRunner::new(&EventerConfig::default(), Box::new(factory)).unwrap();

        (runner, calls)
    }

    #[tokio::test]
    async fn test_bpf_runner() {
        let (mut runner, calls) = new_runner(None);

        runner.run().unwrap();

        {
            let calls = calls.lock().unwrap();
            assert_eq!(calls.created_module.as_deref(), Some("tcp-audit"));
            assert!(calls.loaded_object);
            // Names must match what is in the BPF C and the kernel
            assert_eq!(
                calls.requested_program.as_deref(),
                Some("tracepoint__sock_inet_sock_set_state")
            );
            assert_eq!(
                calls.attached_tracepoint.as_deref(),
                Some("sock:inet_sock_set_state")
            );
            assert_eq!(calls.perf_buffer, Some(("events".to_string(), 16)));
            assert!(calls.started);
            assert!(!calls.closed);
        }

        // Items placed on the module's queues arrive on the runner's queues
        let mut event_queue = runner.event_queue().unwrap();
        let mut drop_count_queue = runner.drop_count_queue().unwrap();
        let (events, drop_counts) = {
            let calls = calls.lock().unwrap();
            (calls.events.clone().unwrap(), calls.drop_counts.clone().unwrap())
        };

        let event_data = Bytes::from_static(&[0xCA, 0xFE, 0xF0, 0x0D]);
        events.send(event_data.clone()).await.unwrap();
        assert_eq!(event_queue.recv().await, Some(event_data));

        drop_counts.send(1).await.unwrap();
        assert_eq!(drop_count_queue.recv().await, Some(1));

        // Queues are handed over once
        assert!(runner.event_queue().is_none());
        assert!(runner.drop_count_queue().is_none());

        drop((events, drop_counts));
        runner.close().unwrap();

        assert!(calls.lock().unwrap().closed);
        assert_eq!(event_queue.recv().await, None);
        assert_eq!(drop_count_queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_bpf_runner_step_errors() {
        let tests = [
            (Step::CreateModule, "creating BPF module", "create module"),
            (Step::LoadObject, "loading BPF object into kernel", "load object"),
            (Step::GetProgram, "loading BPF program", "get program"),
            (Step::AttachTracepoint, "attaching to tracepoint", "attach tracepoint"),
            (Step::InitPerfBuffer, "initialising perf buffer", "init perf buffer"),
            (Step::Start, "starting perf buffer", "start"),
        ];

        for (step, context, mock) in tests {
            let (mut runner, calls) = new_runner(Some(step));

            let err = runner.run().unwrap_err();

            assert_eq!(err.to_string(), context, "step {:?}", step);
            assert_eq!(
                err.downcast_ref::<MockError>().map(|e| e.0),
                Some(mock),
                "step {:?}",
                step
            );

            // Nothing past the failing step ran
            {
                let calls = calls.lock().unwrap();
                assert_eq!(calls.loaded_object, step != Step::CreateModule);
                assert_eq!(calls.attached_tracepoint.is_some(), step > Step::GetProgram);
                assert_eq!(calls.started, step == Step::Start);
            }

            // A failed run still leaves a module to tear down
            runner.close().unwrap();
            assert_eq!(
                calls.lock().unwrap().closed,
                step != Step::CreateModule,
                "step {:?}",
                step
            );
        }
    }

    #[test]
    fn test_close_without_run() {
        let (mut runner, calls) = new_runner(None);

        runner.close().unwrap();

        assert!(runner.event_queue().is_none());
        assert!(!calls.lock().unwrap().closed);
    }

    #[test]
    fn test_invalid_config() {
        let config = EventerConfig {
            perf_buffer_pages: 3,
            ..Default::default()
        };
        let factory = MockFactory {
            calls: SharedCalls::default(),
            failing: None,
        };

        assert!(BpfRunner::new(&config, Box::new(factory)).is_err());
    }
}
