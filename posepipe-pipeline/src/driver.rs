//! Stream driver: runs pipeline passes on a dedicated thread
//!
//! The worker thread exclusively owns the pipeline. Every control operation
//! travels over a command channel and is applied between passes, so a
//! transformer's state is never touched from two threads. Outcomes flow back
//! on a status channel as [`StreamEvent`]s.

use crate::config::StreamConfig;
use crate::editor::PipelineEditor;
use crate::layout::{PipelineSnapshot, PipelineSpec};
use crate::param::ParamValue;
use crate::transformer::{CancelToken, Flow, PassContext, Transformer};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use posepipe_core::{Error, FrameData, Result, TransformerId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Idle => "idle",
            DriverState::Running => "running",
            DriverState::Paused => "paused",
            DriverState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Status reported to the control side
#[derive(Debug)]
pub enum StreamEvent {
    Started,
    Paused,
    Resumed,
    /// The pipeline ended the stream on its own (end of a recording)
    Completed { passes: u64 },
    /// A pass failed; the error names the transformer that raised it
    Failed { error: Error, passes: u64 },
    /// Stopped on request
    Stopped { passes: u64 },
}

impl StreamEvent {
    /// Whether the run is over after this event
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            StreamEvent::Completed { .. } | StreamEvent::Failed { .. } | StreamEvent::Stopped { .. }
        )
    }
}

type Reply<T> = Sender<Result<T>>;

enum Command {
    Build(PipelineSpec, Reply<()>),
    Add {
        pipeline: TransformerId,
        kind: String,
        position: Option<usize>,
        reply: Reply<TransformerId>,
    },
    Insert {
        pipeline: TransformerId,
        member: Box<dyn Transformer>,
        position: Option<usize>,
        reply: Reply<TransformerId>,
    },
    Remove {
        pipeline: TransformerId,
        index: usize,
        reply: Reply<()>,
    },
    Move {
        pipeline: TransformerId,
        from: usize,
        to: usize,
        reply: Reply<()>,
    },
    Nest {
        member: TransformerId,
        into: TransformerId,
        position: Option<usize>,
        reply: Reply<()>,
    },
    SetParameter {
        id: TransformerId,
        name: String,
        value: ParamValue,
        reply: Reply<()>,
    },
    SetEnabled {
        id: TransformerId,
        enabled: bool,
        reply: Reply<()>,
    },
    Describe(Reply<PipelineSnapshot>),
    Start(Reply<()>),
    Pause(Reply<()>),
    Stop(Reply<()>),
    Shutdown,
}

/// Control handle for one pipeline. Cheap calls that block until the worker
/// has applied them (at most one pass later while running).
pub struct StreamDriver {
    commands: Sender<Command>,
    events: Receiver<StreamEvent>,
    state: Arc<RwLock<DriverState>>,
    cancel: CancelToken,
    root_id: TransformerId,
    worker: Option<JoinHandle<()>>,
}

impl StreamDriver {
    pub fn new(editor: PipelineEditor, config: StreamConfig) -> Result<Self> {
        config.validate().map_err(Error::config)?;

        let (command_tx, command_rx) = channel::unbounded();
        let (event_tx, event_rx) = channel::bounded(config.event_capacity);
        let state = Arc::new(RwLock::new(DriverState::Idle));
        let cancel = CancelToken::new();
        let root_id = editor.root_id();

        let worker = Worker {
            editor,
            config,
            state: state.clone(),
            events: event_tx,
            backlog: event_rx.clone(),
            cancel: cancel.clone(),
            passes: 0,
            resources_open: false,
        };
        let handle = thread::Builder::new()
            .name("posepipe-driver".to_string())
            .spawn(move || worker.run(command_rx))?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            state,
            cancel,
            root_id,
            worker: Some(handle),
        })
    }

    pub fn state(&self) -> DriverState {
        *self.state.read()
    }

    /// Status events, in the order they happened
    pub fn events(&self) -> &Receiver<StreamEvent> {
        &self.events
    }

    pub fn root_id(&self) -> &TransformerId {
        &self.root_id
    }

    fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| Error::state("Stream driver has shut down"))?;
        reply_rx
            .recv()
            .map_err(|_| Error::state("Stream driver has shut down"))?
    }

    pub fn build(&self, spec: PipelineSpec) -> Result<()> {
        self.request(|reply| Command::Build(spec, reply))
    }

    pub fn add_transformer(
        &self,
        pipeline: &TransformerId,
        kind: &str,
        position: Option<usize>,
    ) -> Result<TransformerId> {
        self.request(|reply| Command::Add {
            pipeline: pipeline.clone(),
            kind: kind.to_string(),
            position,
            reply,
        })
    }

    /// Insert a transformer built outside the registry
    pub fn insert(
        &self,
        pipeline: &TransformerId,
        member: Box<dyn Transformer>,
        position: Option<usize>,
    ) -> Result<TransformerId> {
        self.request(|reply| Command::Insert {
            pipeline: pipeline.clone(),
            member,
            position,
            reply,
        })
    }

    pub fn remove_transformer(&self, pipeline: &TransformerId, index: usize) -> Result<()> {
        self.request(|reply| Command::Remove {
            pipeline: pipeline.clone(),
            index,
            reply,
        })
    }

    pub fn move_transformer(&self, pipeline: &TransformerId, from: usize, to: usize) -> Result<()> {
        self.request(|reply| Command::Move {
            pipeline: pipeline.clone(),
            from,
            to,
            reply,
        })
    }

    pub fn nest(
        &self,
        member: &TransformerId,
        into: &TransformerId,
        position: Option<usize>,
    ) -> Result<()> {
        self.request(|reply| Command::Nest {
            member: member.clone(),
            into: into.clone(),
            position,
            reply,
        })
    }

    /// Allowed in every state; applied between passes while running
    pub fn set_parameter(&self, id: &TransformerId, name: &str, value: ParamValue) -> Result<()> {
        self.request(|reply| Command::SetParameter {
            id: id.clone(),
            name: name.to_string(),
            value,
            reply,
        })
    }

    pub fn set_enabled(&self, id: &TransformerId, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetEnabled {
            id: id.clone(),
            enabled,
            reply,
        })
    }

    pub fn describe(&self) -> Result<PipelineSnapshot> {
        self.request(Command::Describe)
    }

    /// Open resources and begin streaming, or resume when paused
    pub fn start(&self) -> Result<()> {
        self.request(Command::Start)
    }

    pub fn pause(&self) -> Result<()> {
        self.request(Command::Pause)
    }

    /// Stop streaming and release resources. A pass blocked on its source is
    /// interrupted within the configured poll interval.
    pub fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        self.request(Command::Stop)
    }

    /// Stop if needed and wait for the worker thread to exit
    pub fn shutdown(mut self) {
        self.terminate_worker();
    }

    fn terminate_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.cancel.cancel();
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                error!("Stream driver thread panicked");
            }
        }
    }
}

impl Drop for StreamDriver {
    fn drop(&mut self) {
        self.terminate_worker();
    }
}

struct Worker {
    editor: PipelineEditor,
    config: StreamConfig,
    state: Arc<RwLock<DriverState>>,
    events: Sender<StreamEvent>,
    backlog: Receiver<StreamEvent>,
    cancel: CancelToken,
    passes: u64,
    resources_open: bool,
}

impl Worker {
    fn run(mut self, commands: Receiver<Command>) {
        info!("Stream driver started for '{}'", self.editor.root().name());
        loop {
            if self.state() != DriverState::Running {
                match commands.recv() {
                    Ok(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
                continue;
            }

            let mut shutdown = false;
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if !self.handle(command) {
                            shutdown = true;
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        shutdown = true;
                        break;
                    }
                }
            }
            if shutdown {
                break;
            }
            if self.state() != DriverState::Running {
                continue;
            }

            let started = Instant::now();
            self.run_pass();

            let Some(interval) = self.config.frame_interval() else {
                continue;
            };
            let remaining = interval.saturating_sub(started.elapsed());
            if self.state() == DriverState::Running && !remaining.is_zero() {
                match commands.recv_timeout(remaining) {
                    Ok(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }

        if matches!(self.state(), DriverState::Running | DriverState::Paused) {
            self.finish(StreamEvent::Stopped {
                passes: self.passes,
            });
        }
        info!("Stream driver for '{}' exited", self.editor.root().name());
    }

    fn state(&self) -> DriverState {
        *self.state.read()
    }

    fn set_state(&self, state: DriverState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            info!("Stream driver: {} -> {}", previous, state);
        }
    }

    /// Progress events are dropped when the control side lags behind. The
    /// event that ends a run always gets through, displacing the oldest
    /// buffered events if it has to.
    fn emit(&self, mut event: StreamEvent) {
        loop {
            match self.events.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) if rejected.is_final() => {
                    if let Ok(stale) = self.backlog.try_recv() {
                        warn!("Status channel full, discarding {:?}", stale);
                    }
                    event = rejected;
                }
                Err(TrySendError::Full(rejected)) => {
                    warn!("Status channel full, dropping {:?}", rejected);
                    return;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Apply one command; `false` asks the worker to exit
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Build(spec, reply) => {
                let result = self.idle_only().and_then(|_| self.editor.build(&spec));
                let _ = reply.send(result);
            }
            Command::Add {
                pipeline,
                kind,
                position,
                reply,
            } => {
                let result = self.structural().and_then(|_| {
                    let id = self.editor.add_transformer(&pipeline, &kind, position)?;
                    self.open_added(&id)?;
                    Ok(id)
                });
                let _ = reply.send(result);
            }
            Command::Insert {
                pipeline,
                member,
                position,
                reply,
            } => {
                let result = self.structural().and_then(|_| {
                    let id = self.editor.insert(&pipeline, member, position)?;
                    self.open_added(&id)?;
                    Ok(id)
                });
                let _ = reply.send(result);
            }
            Command::Remove {
                pipeline,
                index,
                reply,
            } => {
                let result = self
                    .structural()
                    .and_then(|_| self.editor.remove_transformer(&pipeline, index))
                    .map(|_| ());
                let _ = reply.send(result);
            }
            Command::Move {
                pipeline,
                from,
                to,
                reply,
            } => {
                let result = self
                    .structural()
                    .and_then(|_| self.editor.move_transformer(&pipeline, from, to));
                let _ = reply.send(result);
            }
            Command::Nest {
                member,
                into,
                position,
                reply,
            } => {
                let result = self
                    .structural()
                    .and_then(|_| self.editor.nest(&member, &into, position));
                let _ = reply.send(result);
            }
            Command::SetParameter {
                id,
                name,
                value,
                reply,
            } => {
                let _ = reply.send(self.editor.set_parameter(&id, &name, value));
            }
            Command::SetEnabled { id, enabled, reply } => {
                let _ = reply.send(self.editor.set_enabled(&id, enabled));
            }
            Command::Describe(reply) => {
                let _ = reply.send(Ok(self.editor.describe()));
            }
            Command::Start(reply) => {
                let _ = reply.send(self.start());
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            Command::Stop(reply) => {
                self.stop();
                let _ = reply.send(Ok(()));
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn structural(&self) -> Result<()> {
        if self.state() == DriverState::Running {
            return Err(Error::state(
                "Pause or stop the stream before changing the pipeline structure",
            ));
        }
        Ok(())
    }

    fn idle_only(&self) -> Result<()> {
        match self.state() {
            DriverState::Idle | DriverState::Stopped => Ok(()),
            state => Err(Error::state(format!(
                "Cannot rebuild the pipeline while {}",
                state
            ))),
        }
    }

    /// Members added while paused join a run whose resources are open
    fn open_added(&mut self, id: &TransformerId) -> Result<()> {
        if !self.resources_open {
            return Ok(());
        }
        let root = self.editor.root_mut();
        if let Some(member) = root.find_mut(id) {
            if let Err(e) = member.open() {
                root.take(id);
                return Err(e);
            }
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.state() {
            DriverState::Running => Err(Error::state("Stream is already running")),
            DriverState::Paused => {
                if !self.editor.root().has_source() {
                    return Err(Error::config(
                        "Pipeline has no enabled frame source to resume from",
                    ));
                }
                self.set_state(DriverState::Running);
                self.emit(StreamEvent::Resumed);
                Ok(())
            }
            DriverState::Idle | DriverState::Stopped => {
                if !self.editor.root().has_source() {
                    return Err(Error::config(
                        "Pipeline has no enabled frame source to pull from",
                    ));
                }
                self.cancel.reset();
                self.editor.root_mut().open()?;
                self.resources_open = true;
                self.passes = 0;
                self.set_state(DriverState::Running);
                self.emit(StreamEvent::Started);
                Ok(())
            }
        }
    }

    fn pause(&mut self) -> Result<()> {
        match self.state() {
            DriverState::Running => {
                self.set_state(DriverState::Paused);
                self.emit(StreamEvent::Paused);
                Ok(())
            }
            DriverState::Paused => Ok(()),
            state => Err(Error::state(format!("Cannot pause while {}", state))),
        }
    }

    fn stop(&mut self) {
        if matches!(self.state(), DriverState::Running | DriverState::Paused) {
            self.finish(StreamEvent::Stopped {
                passes: self.passes,
            });
        }
    }

    fn run_pass(&mut self) {
        let ctx = PassContext::new(self.passes, self.cancel.clone(), self.config.poll_interval());
        match self.editor.root_mut().transform(FrameData::new(), &ctx) {
            Ok(Flow::Continue(_)) => {
                self.passes += 1;
                debug!("Pass {} complete", ctx.pass_index);
            }
            Ok(Flow::Terminate) if self.cancel.is_cancelled() => {
                self.finish(StreamEvent::Stopped {
                    passes: self.passes,
                });
            }
            Ok(Flow::Terminate) => {
                info!("Stream completed after {} passes", self.passes);
                self.finish(StreamEvent::Completed {
                    passes: self.passes,
                });
            }
            Err(e) => {
                error!("Pass {} failed: {}", ctx.pass_index, e);
                self.finish(StreamEvent::Failed {
                    error: e,
                    passes: self.passes,
                });
            }
        }
    }

    /// Release every resource exactly once and report how the run ended
    fn finish(&mut self, event: StreamEvent) {
        if self.resources_open {
            self.editor.root_mut().close();
            self.resources_open = false;
        }
        self.set_state(DriverState::Stopped);
        self.emit(event);
    }
}
