pub mod graph;
pub mod ports;
pub mod process;
pub mod state;
pub mod supervisor;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind};
use futures_util::future::join_all;
use futures_util::StreamExt;
use is_terminal::IsTerminal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::model::{GraphEngine, SessionTimings, DEFAULT_LOG_CAPACITY};
use crate::platform::SignalStrength;
use crate::ui::input::{Action, InteractionController};
use crate::ui::logs::{LogAggregator, LogEntry};
use crate::ui::summary::{self, ServiceRow};
use crate::ui::term::{self, RawModeGuard};

use graph::{CommandRunner, GraphContainer, SystemRunner};
use ports::{PortInstance, COMMON_PORTS};
use process::ProcessEvent;
use state::{ServiceKind, ServiceRecord, ServiceSpec, SessionSnapshot};
use supervisor::ServiceSupervisor;

/// How often the readiness watchdog runs.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub project: String,
    /// Read keys from the terminal. Ignored when stdin is not a TTY.
    pub interactive: bool,
    /// Suppress all terminal output (logs and dashboard).
    pub quiet: bool,
    pub timings: SessionTimings,
    pub log_capacity: usize,
    /// Where the session snapshot is written; `None` disables it.
    pub state_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            project: "cortex".to_string(),
            interactive: false,
            quiet: false,
            timings: SessionTimings::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            state_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Every service stopped gracefully.
    Clean,
    /// A second interrupt arrived during shutdown; services were killed.
    Forced,
}

/// Everything the session owns. Handlers get it by `&mut`.
pub struct SessionState {
    pub services: Vec<ServiceRecord>,
    pub logs: LogAggregator,
    pub shutting_down: bool,
    pub shutdown_in_progress: bool,
    pub dashboard_refreshes: usize,
}

/// Shared, immutable collaborators used to start and stop services.
struct ServiceContext {
    supervisor: ServiceSupervisor,
    runner: Arc<dyn CommandRunner>,
    timings: SessionTimings,
}

impl ServiceContext {
    fn graph_container(&self, engine: GraphEngine, dir: &Path) -> GraphContainer {
        GraphContainer::new(
            engine,
            dir,
            self.runner.clone(),
            self.timings.probe_timeout,
            self.timings.graph_settle,
        )
    }
}

type PortScanner = Box<dyn Fn() -> Vec<PortInstance> + Send>;

/// The interactive dev session: supervises every service, multiplexes their
/// output, reacts to keys and signals, and sequences shutdown.
pub struct OrchestratorSession {
    options: SessionOptions,
    state: SessionState,
    ctx: ServiceContext,
    controller: InteractionController,
    port_scanner: PortScanner,
    events_rx: mpsc::UnboundedReceiver<ProcessEvent>,
    started_at: DateTime<Utc>,
    use_color: bool,
}

impl OrchestratorSession {
    pub fn new(specs: Vec<ServiceSpec>, options: SessionOptions) -> Self {
        Self::with_runner(specs, options, Arc::new(SystemRunner))
    }

    pub fn with_runner(
        specs: Vec<ServiceSpec>,
        options: SessionOptions,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let mut logs = LogAggregator::new(options.log_capacity, names);
        if options.quiet {
            logs = logs.quiet();
        }

        let graph_targets = specs
            .iter()
            .filter_map(|s| match &s.kind {
                ServiceKind::Graph { deployment, .. } => Some(deployment.clone()),
                _ => None,
            })
            .collect();

        Self {
            ctx: ServiceContext {
                supervisor: ServiceSupervisor::new(events_tx, options.timings.grace_period),
                runner,
                timings: options.timings,
            },
            state: SessionState {
                services: specs.into_iter().map(ServiceRecord::new).collect(),
                logs,
                shutting_down: false,
                shutdown_in_progress: false,
                dashboard_refreshes: 0,
            },
            controller: InteractionController::new(graph_targets),
            port_scanner: Box::new(|| ports::scan_ports(&COMMON_PORTS)),
            events_rx,
            started_at: Utc::now(),
            use_color: std::io::stdout().is_terminal(),
            options,
        }
    }

    /// Replace the kill menu's port scan.
    pub fn with_port_scanner<F>(mut self, scanner: F) -> Self
    where
        F: Fn() -> Vec<PortInstance> + Send + 'static,
    {
        self.port_scanner = Box::new(scanner);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn rows(&self) -> Vec<ServiceRow> {
        self.state.services.iter().map(ServiceRow::from_record).collect()
    }

    pub fn record(&self, name: &str) -> Option<&ServiceRecord> {
        self.state.services.iter().find(|r| r.name() == name)
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Start everything, run until quit or signal, then shut down.
    pub async fn run(mut self) -> Result<SessionExit> {
        let raw_guard = if self.options.interactive && std::io::stdin().is_terminal() {
            Some(RawModeGuard::acquire()?)
        } else {
            None
        };
        let mut keys = raw_guard.as_ref().map(|_| EventStream::new());
        let mut interrupts = Interrupts::new()?;

        let interrupted = self
            .start_all_until(next_quit(&mut interrupts, &mut keys))
            .await;

        let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);
        while !interrupted {
            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }
                Some(key) = next_key(&mut keys) => {
                    match self.controller.handle_key(key) {
                        Action::Quit => break,
                        action => self.perform(action).await,
                    }
                }
                _ = interrupts.recv() => {
                    break;
                }
                _ = watchdog.tick() => {
                    self.check_readiness_deadlines();
                }
            }
        }

        let exit = self
            .shutdown_with(next_quit(&mut interrupts, &mut keys))
            .await;
        drop(raw_guard);
        Ok(exit)
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Start every service in order. Failures are logged and skipped.
    pub async fn start_all(&mut self) {
        self.state.logs.session(format!(
            "starting {} service(s) for {}",
            self.state.services.len(),
            self.options.project
        ));

        let specs: Vec<ServiceSpec> = self.state.services.iter().map(|r| r.spec.clone()).collect();
        for conflict in ports::check_app_ports(&specs) {
            warn!("{}", conflict);
            self.state.logs.session(format!("warning: {}", conflict));
        }

        for record in self.state.services.iter_mut() {
            if !start_service(&self.ctx, record).await {
                self.state
                    .logs
                    .session(format!("{} failed to start", record.name()));
            }
        }

        self.save_snapshot();
        self.refresh_dashboard();
    }

    /// Run [`start_all`](Self::start_all) unless `quit` resolves first.
    /// Returns `true` when startup was cut short; whatever already started is
    /// recorded so shutdown and `cortex stop` can reach it.
    pub async fn start_all_until<F>(&mut self, quit: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let interrupted = tokio::select! {
            _ = self.start_all() => false,
            _ = quit => true,
        };
        if interrupted {
            warn!("interrupted during startup");
            self.state.logs.session("interrupted during startup");
            self.save_snapshot();
        }
        interrupted
    }

    /// Stop everything gracefully, clear the log buffer, start again.
    pub async fn restart_all(&mut self) {
        info!("restarting all services");
        join_all(
            self.state
                .services
                .iter_mut()
                .map(|r| stop_service(&self.ctx, r, SignalStrength::Graceful, false)),
        )
        .await;
        self.state.logs.clear();
        self.start_all().await;
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Apply one process event. Returns `true` if a service changed state.
    pub fn handle_event(&mut self, event: ProcessEvent) -> bool {
        match event {
            ProcessEvent::Line {
                service,
                generation,
                stream,
                text,
            } => {
                let Some(idx) = self.index_of(&service) else {
                    return false;
                };
                let became_ready = {
                    let record = &mut self.state.services[idx];
                    self.ctx
                        .supervisor
                        .observe_line(record, generation, stream, &text)
                };
                self.state
                    .logs
                    .append(LogEntry::new(Some(service.clone()), stream.into(), text));
                if became_ready {
                    info!(service = %service, "ready");
                    self.state.logs.session(format!("{} is ready", service));
                    self.refresh_dashboard();
                }
                became_ready
            }
            ProcessEvent::Exited {
                service,
                generation,
                code,
            } => {
                let Some(idx) = self.index_of(&service) else {
                    return false;
                };
                let changed = {
                    let record = &mut self.state.services[idx];
                    self.ctx.supervisor.observe_exit(record, generation, code)
                };
                if changed && !self.state.shutting_down {
                    let msg = match code {
                        process::SPAWN_FAILED => format!("{} could not be started", service),
                        code => format!("{} exited with code {}", service, code),
                    };
                    self.state.logs.session(msg);
                    self.refresh_dashboard();
                }
                changed
            }
        }
    }

    /// Warn once about services that have been starting for too long.
    /// Never changes service state.
    pub fn check_readiness_deadlines(&mut self) {
        let limit = self.ctx.timings.ready_warn_after;
        let now = Instant::now();
        let mut overdue = Vec::new();
        for record in self.state.services.iter_mut() {
            let late = record.running
                && !record.ready
                && !record.ready_warned
                && record
                    .started_at
                    .is_some_and(|t| now.duration_since(t) >= limit);
            if late {
                record.ready_warned = true;
                overdue.push((record.name().to_string(), record.spec.readiness.description().to_string()));
            }
        }
        for (name, predicate) in overdue {
            warn!(service = %name, ?limit, "not ready yet");
            self.state.logs.session(format!(
                "{} not ready after {} (waiting for: {})",
                name,
                humantime::format_duration(limit),
                predicate
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    pub async fn perform(&mut self, action: Action) {
        match action {
            Action::None | Action::Quit => {}
            Action::ClearLogs => {
                self.state.logs.clear();
                self.refresh_strip();
            }
            Action::ShowStatus | Action::Dismiss => self.refresh_dashboard(),
            Action::RestartAll => self.restart_all().await,
            Action::ToggleGraph(idx) => {
                if let Some(deployment) = self.controller.graph_targets().get(idx).cloned() {
                    self.toggle_graph(&deployment).await;
                }
            }
            Action::ShowGraphMenu => {
                let menu = summary::render_graph_menu(self.controller.graph_targets());
                self.print(&menu);
            }
            Action::OpenKillMenu => {
                let instances = (self.port_scanner)();
                let menu = summary::render_kill_menu(&instances);
                self.controller.open_kill_menu(instances);
                self.print(&menu);
            }
            Action::KillPorts(instances) => {
                let outcomes = ports::kill_instances(&instances, SignalStrength::Graceful);
                for (inst, delivered) in &outcomes {
                    self.state.logs.session(if *delivered {
                        format!("sent SIGTERM to {}", inst)
                    } else {
                        format!("could not signal {}", inst)
                    });
                }
                self.refresh_dashboard();
            }
            Action::ShowHelp => self.print(&summary::render_help()),
        }
    }

    /// Start or stop one deployment's graph container.
    pub async fn toggle_graph(&mut self, deployment: &str) -> bool {
        let Some(idx) = self.state.services.iter().position(|r| {
            matches!(r.kind(), ServiceKind::Graph { deployment: d, .. } if d == deployment)
        }) else {
            warn!(deployment, "no graph database configured");
            return false;
        };

        let record = &mut self.state.services[idx];
        let name = record.name().to_string();
        let ok = if record.running || record.container_up {
            stop_service(&self.ctx, record, SignalStrength::Graceful, true).await;
            self.state.logs.session(format!("{} stopped", name));
            true
        } else {
            let started = start_service(&self.ctx, record).await;
            self.state.logs.session(if started {
                format!("{} started", name)
            } else {
                format!("{} failed to start", name)
            });
            started
        };
        self.save_snapshot();
        self.refresh_dashboard();
        ok
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop every service gracefully, unless `second_interrupt` resolves
    /// first: the graceful stop is then abandoned and everything still
    /// running is killed.
    pub async fn shutdown_with<F>(&mut self, second_interrupt: F) -> SessionExit
    where
        F: Future<Output = ()>,
    {
        if self.state.shutdown_in_progress {
            return SessionExit::Forced;
        }
        self.state.shutting_down = true;
        self.state.shutdown_in_progress = true;
        self.state
            .logs
            .session("shutting down (interrupt again to force)");

        let forced = {
            let ctx = &self.ctx;
            let graceful = join_all(
                self.state
                    .services
                    .iter_mut()
                    .map(|r| stop_service(ctx, r, SignalStrength::Graceful, true)),
            );
            tokio::select! {
                _ = graceful => false,
                _ = second_interrupt => true,
            }
        };

        let exit = if forced {
            self.state.logs.session("forcing shutdown");
            self.force_stop_all().await;
            SessionExit::Forced
        } else {
            let leftover: Vec<&str> = self
                .state
                .services
                .iter()
                .filter(|r| r.container_up)
                .map(|r| r.name())
                .collect();
            if leftover.is_empty() {
                if let Some(dir) = &self.options.state_dir {
                    if let Err(e) = SessionSnapshot::remove(dir) {
                        warn!(error = %e, "failed to remove session snapshot");
                    }
                }
            } else {
                // Keep the snapshot so `cortex stop` can still reach them.
                warn!(services = ?leftover, "graph containers still running");
                self.save_snapshot();
            }
            SessionExit::Clean
        };

        self.state.shutdown_in_progress = false;
        info!(?exit, "session ended");
        exit
    }

    /// Kill every service still running. Graph containers are left as they
    /// are; `cortex stop` can still reach them through the snapshot.
    pub async fn force_stop_all(&mut self) {
        for record in self.state.services.iter_mut() {
            if record.handle.is_some() {
                self.ctx
                    .supervisor
                    .stop(record, SignalStrength::Force)
                    .await;
            }
            record.mark_stopped();
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn index_of(&self, name: &str) -> Option<usize> {
        self.state.services.iter().position(|r| r.name() == name)
    }

    fn save_snapshot(&self) {
        let Some(dir) = &self.options.state_dir else {
            return;
        };
        let snapshot =
            SessionSnapshot::capture(&self.options.project, self.started_at, &self.state.services);
        if let Err(e) = snapshot.save(dir) {
            warn!(error = %e, "failed to write session snapshot");
        }
    }

    fn print(&self, text: &str) {
        if !self.options.quiet {
            term::emit(text);
        }
    }

    fn refresh_dashboard(&mut self) {
        self.state.dashboard_refreshes += 1;
        if self.options.quiet {
            return;
        }
        let rows = self.rows();
        term::emit(&summary::render_dashboard(&self.options.project, &rows, self.use_color));
        self.refresh_strip();
    }

    fn refresh_strip(&self) {
        if self.options.quiet {
            return;
        }
        let rows = self.rows();
        let interactive = self.options.interactive && term::raw_mode_active();
        term::emit(&summary::render_status_strip(&rows, interactive, self.use_color));
    }
}

// ---------------------------------------------------------------------------
// Per-service start/stop
// ---------------------------------------------------------------------------

/// Start one record. Graph records bring the container up first, then
/// follow its logs; they count as ready once the container is running.
async fn start_service(ctx: &ServiceContext, record: &mut ServiceRecord) -> bool {
    if let ServiceKind::Graph { engine, .. } = record.kind().clone() {
        let container = ctx.graph_container(engine, &record.spec.working_dir);
        // Set before the attempt so an interrupted start is still cleaned up.
        record.container_up = true;
        if !container.start().await {
            warn!(service = %record.name(), "graph container did not start");
            record.container_up = false;
            return false;
        }
        if !ctx.supervisor.start(record) {
            return false;
        }
        record.ready = true;
        return true;
    }
    ctx.supervisor.start(record)
}

async fn stop_service(
    ctx: &ServiceContext,
    record: &mut ServiceRecord,
    strength: SignalStrength,
    stop_container: bool,
) {
    ctx.supervisor.stop(record, strength).await;
    if !stop_container || !record.container_up {
        return;
    }
    if let ServiceKind::Graph { engine, .. } = *record.kind() {
        if ctx
            .graph_container(engine, &record.spec.working_dir)
            .stop()
            .await
        {
            record.container_up = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Input sources
// ---------------------------------------------------------------------------

/// Next key press, or pending forever when there is no keyboard.
async fn next_key(keys: &mut Option<EventStream>) -> Option<KeyEvent> {
    if let Some(stream) = keys.as_mut() {
        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => return Some(key),
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "terminal input error");
                    break;
                }
            }
        }
        *keys = None;
    }
    std::future::pending().await
}

/// Resolves on the next SIGINT/SIGTERM or quit key.
async fn next_quit(interrupts: &mut Interrupts, keys: &mut Option<EventStream>) {
    loop {
        tokio::select! {
            _ = interrupts.recv() => return,
            Some(key) = next_key(keys) => {
                if is_quit_key(&key) {
                    return;
                }
            }
        }
    }
}

fn is_quit_key(key: &KeyEvent) -> bool {
    use crossterm::event::{KeyCode, KeyModifiers};
    match key.code {
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        KeyCode::Char('q') => true,
        _ => false,
    }
}

/// SIGINT and SIGTERM as one stream.
struct Interrupts {
    #[cfg(unix)]
    int: tokio::signal::unix::Signal,
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
}

impl Interrupts {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.int.recv() => {}
            _ = self.term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::orchestrator::graph::testing::ScriptedDocker;
    use crate::orchestrator::process::OutputStream;
    use crate::orchestrator::supervisor::ReadinessPredicate;
    use crate::ui::summary::ServiceStatus;
    use std::collections::BTreeMap;

    fn spec(name: &str, kind: ServiceKind, script: &str, readiness: ReadinessPredicate) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            kind,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: std::env::temp_dir(),
            env: BTreeMap::new(),
            readiness,
        }
    }

    fn backend(name: &str, script: &str) -> ServiceSpec {
        spec(
            name,
            ServiceKind::Backend {
                local: true,
                url: None,
            },
            script,
            ReadinessPredicate::backend_default(),
        )
    }

    fn app(name: &str, port: u16, script: &str) -> ServiceSpec {
        spec(name, ServiceKind::App { port }, script, ReadinessPredicate::app_default())
    }

    fn options() -> SessionOptions {
        SessionOptions {
            project: "test".to_string(),
            quiet: true,
            ..SessionOptions::default()
        }
    }

    fn session(specs: Vec<ServiceSpec>, options: SessionOptions) -> OrchestratorSession {
        OrchestratorSession::with_runner(specs, options, ScriptedDocker::new(false, false))
    }

    fn line(service: &str, generation: u64, stream: OutputStream, text: &str) -> ProcessEvent {
        ProcessEvent::Line {
            service: service.to_string(),
            generation,
            stream,
            text: text.to_string(),
        }
    }

    async fn wait_dead(pid: u32) -> bool {
        for _ in 0..50 {
            if !crate::platform::is_process_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn readiness_scenario_marks_both_ready() {
        let mut s = session(
            vec![backend("svc-a", "sleep 30"), app("svc-b", 45123, "sleep 30")],
            options(),
        );
        s.start_all().await;
        assert!(s.record("svc-a").unwrap().running);
        assert!(s.record("svc-b").unwrap().running);

        assert!(!s.handle_event(line("svc-a", 1, OutputStream::Stdout, "App ready at http://localhost:3000")));
        assert!(!s.record("svc-a").unwrap().ready);

        assert!(s.handle_event(line("svc-a", 1, OutputStream::Stderr, "✔ Convex functions ready! (2.1s)")));
        assert!(s.handle_event(line("svc-b", 1, OutputStream::Stdout, " ✓ Ready in 900ms")));

        let rows = s.rows();
        assert!(rows.iter().all(|r| r.status == ServiceStatus::Ready), "{:?}", rows);
        assert!(s.state().logs.len() >= 3);

        let exit = s.shutdown_with(std::future::pending()).await;
        assert_eq!(exit, SessionExit::Clean);
        for record in &s.state().services {
            assert!(!record.running);
            assert!(!record.ready);
            assert!(record.handle.is_none());
        }
    }

    #[tokio::test]
    async fn real_output_drives_readiness() {
        let mut s = session(
            vec![backend(
                "svc-a",
                "echo 'App ready at http://localhost:3000'; echo 'Convex functions ready!' >&2; sleep 30",
            )],
            options(),
        );
        s.start_all().await;

        let deadline = Instant::now() + Duration::from_secs(10);
        while !s.record("svc-a").unwrap().ready && Instant::now() < deadline {
            if let Ok(Some(event)) =
                tokio::time::timeout(Duration::from_millis(200), s.events_rx.recv()).await
            {
                s.handle_event(event);
            }
        }
        assert!(s.record("svc-a").unwrap().ready);
        s.shutdown_with(std::future::pending()).await;
    }

    #[tokio::test]
    async fn repeated_ready_marker_refreshes_dashboard_once() {
        let mut s = session(vec![app("web", 45132, "sleep 30")], options());
        s.start_all().await;
        let before = s.state().dashboard_refreshes;

        assert!(s.handle_event(line("web", 1, OutputStream::Stdout, "Ready")));
        assert!(!s.handle_event(line("web", 1, OutputStream::Stdout, "Ready")));
        assert_eq!(s.state().dashboard_refreshes, before + 1);

        s.shutdown_with(std::future::pending()).await;
    }

    #[tokio::test]
    async fn stale_events_after_restart_are_ignored() {
        let mut s = session(vec![app("web", 45124, "sleep 30")], options());
        s.start_all().await;
        s.handle_event(line("web", 1, OutputStream::Stdout, "Ready"));
        assert!(s.record("web").unwrap().ready);

        s.restart_all().await;
        let web = s.record("web").unwrap();
        assert!(web.running);
        assert!(!web.ready);
        assert_eq!(web.generation, 2);

        assert!(!s.handle_event(line("web", 1, OutputStream::Stdout, "Ready")));
        assert!(!s.handle_event(ProcessEvent::Exited {
            service: "web".to_string(),
            generation: 1,
            code: 143,
        }));
        assert!(s.record("web").unwrap().running);

        s.shutdown_with(std::future::pending()).await;
    }

    #[tokio::test]
    async fn exit_event_marks_service_stopped() {
        let mut s = session(vec![app("web", 45125, "sleep 30")], options());
        s.start_all().await;
        assert!(s.handle_event(ProcessEvent::Exited {
            service: "web".to_string(),
            generation: 1,
            code: 1,
        }));
        let rows = s.rows();
        assert_eq!(rows[0].status, ServiceStatus::Failed(1));
        s.shutdown_with(std::future::pending()).await;
    }

    #[tokio::test]
    async fn spawn_failure_does_not_stop_the_rest() {
        let mut missing = app("ghost", 45126, "");
        missing.program = "/definitely/not/a/real/binary".to_string();
        missing.args.clear();
        let mut s = session(vec![missing, app("web", 45127, "sleep 30")], options());
        s.start_all().await;

        assert!(!s.record("ghost").unwrap().running);
        assert!(s.record("web").unwrap().running);
        s.shutdown_with(std::future::pending()).await;
    }

    #[tokio::test]
    async fn second_interrupt_forces_shutdown() {
        let opts = SessionOptions {
            timings: SessionTimings {
                grace_period: Duration::from_secs(20),
                ..SessionTimings::default()
            },
            ..options()
        };
        let script = "trap '' TERM; while true; do sleep 1; done";
        let mut s = session(vec![app("a", 45128, script), app("b", 45129, script)], opts);
        s.start_all().await;
        // Give the shells time to install the trap.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let pids: Vec<u32> = s.state().services.iter().filter_map(|r| r.pid()).collect();
        assert_eq!(pids.len(), 2);

        let started = Instant::now();
        let exit = s
            .shutdown_with(tokio::time::sleep(Duration::from_millis(200)))
            .await;
        assert_eq!(exit, SessionExit::Forced);
        assert!(started.elapsed() < Duration::from_secs(20));

        for record in &s.state().services {
            assert!(!record.running);
            assert!(record.handle.is_none());
        }
        for pid in pids {
            assert!(wait_dead(pid).await, "pid {} survived forced shutdown", pid);
        }
    }

    #[tokio::test]
    async fn clean_shutdown_removes_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = SessionOptions {
            state_dir: Some(tmp.path().to_path_buf()),
            ..options()
        };
        let mut s = session(vec![app("web", 45130, "sleep 30")], opts);
        s.start_all().await;

        let snapshot = SessionSnapshot::load(tmp.path()).expect("snapshot written at startup");
        assert_eq!(snapshot.project, "test");
        assert!(snapshot.services["web"].pid.is_some());

        assert_eq!(s.shutdown_with(std::future::pending()).await, SessionExit::Clean);
        assert!(SessionSnapshot::load(tmp.path()).is_none());
    }

    #[tokio::test]
    async fn kill_menu_with_no_listeners_is_empty() {
        let mut s = session(vec![], options()).with_port_scanner(Vec::new);
        s.perform(Action::OpenKillMenu).await;
        assert_eq!(
            s.controller().mode(),
            &crate::ui::input::Mode::KillMenu(vec![])
        );
    }

    #[tokio::test]
    async fn kill_ports_logs_each_delivery() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let live = PortInstance {
            port: 3000,
            pid: child.id(),
            name: "sleep".to_string(),
        };
        let bogus = PortInstance {
            port: 3001,
            pid: 0,
            name: "ghost".to_string(),
        };

        let mut s = session(vec![], options());
        s.perform(Action::KillPorts(vec![live, bogus])).await;
        let texts: Vec<&str> = s.state().logs.entries().map(|e| e.text.as_str()).collect();
        assert!(texts.iter().any(|t| t.starts_with("sent SIGTERM to :3000")), "{:?}", texts);
        assert!(texts.iter().any(|t| t.starts_with("could not signal :3001")), "{:?}", texts);
        assert!(!texts.iter().any(|t| t.starts_with("sent SIGTERM to :3001")));

        child.wait().unwrap();
    }

    #[tokio::test]
    async fn readiness_watchdog_warns_once() {
        let opts = SessionOptions {
            timings: SessionTimings {
                ready_warn_after: Duration::from_millis(0),
                ..SessionTimings::default()
            },
            ..options()
        };
        let mut s = session(vec![app("web", 45131, "sleep 30")], opts);
        s.start_all().await;
        let before = s.state().logs.len();

        s.check_readiness_deadlines();
        assert!(s.record("web").unwrap().ready_warned);
        assert_eq!(s.state().logs.len(), before + 1);

        s.check_readiness_deadlines();
        assert_eq!(s.state().logs.len(), before + 1);
        let web = s.record("web").unwrap();
        assert!(web.running);
        assert!(!web.ready);

        s.shutdown_with(std::future::pending()).await;
    }

    #[tokio::test]
    async fn graph_toggle_without_compose_file_fails_quietly() {
        let tmp = tempfile::tempdir().unwrap();
        let mut graph = spec(
            "local:graph",
            ServiceKind::Graph {
                engine: GraphEngine::Neo4j,
                deployment: "local".to_string(),
            },
            "sleep 30",
            ReadinessPredicate::never(),
        );
        graph.working_dir = tmp.path().to_path_buf();
        let docker = ScriptedDocker::new(false, false);
        let mut s = OrchestratorSession::with_runner(vec![graph], options(), docker.clone());

        assert!(!s.toggle_graph("local").await);
        assert!(!s.record("local:graph").unwrap().running);
        assert!(docker.calls().is_empty());
        assert!(!s.toggle_graph("nope").await);
    }

    fn graph_session(
        follower: &str,
        docker: Arc<ScriptedDocker>,
        state_dir: &Path,
    ) -> (OrchestratorSession, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(graph::COMPOSE_FILE), "services: {}\n").unwrap();
        let mut graph = spec(
            "local:graph",
            ServiceKind::Graph {
                engine: GraphEngine::Neo4j,
                deployment: "local".to_string(),
            },
            follower,
            ReadinessPredicate::never(),
        );
        graph.working_dir = tmp.path().to_path_buf();
        let opts = SessionOptions {
            state_dir: Some(state_dir.to_path_buf()),
            ..options()
        };
        (OrchestratorSession::with_runner(vec![graph], opts, docker), tmp)
    }

    #[tokio::test]
    async fn clean_shutdown_stops_container_after_follower_exits() {
        let state = tempfile::tempdir().unwrap();
        let docker = ScriptedDocker::new(true, true);
        let (mut s, _dir) = graph_session("exit 0", docker.clone(), state.path());
        s.start_all().await;
        assert!(s.record("local:graph").unwrap().container_up);

        assert!(s.handle_event(ProcessEvent::Exited {
            service: "local:graph".to_string(),
            generation: 1,
            code: 0,
        }));
        let record = s.record("local:graph").unwrap();
        assert!(!record.running);
        assert!(record.container_up);

        assert_eq!(s.shutdown_with(std::future::pending()).await, SessionExit::Clean);
        assert!(docker.calls().contains(&"stop cortex-neo4j".to_string()));
        assert!(!docker.inner.lock().unwrap().running);
        assert!(!s.record("local:graph").unwrap().container_up);
        assert!(SessionSnapshot::load(state.path()).is_none());
    }

    #[tokio::test]
    async fn interrupt_during_startup_still_cleans_up() {
        let state = tempfile::tempdir().unwrap();
        let docker = ScriptedDocker::new(false, false);
        docker.with(|m| m.hang = true);
        let (mut s, _dir) = graph_session("sleep 30", docker.clone(), state.path());

        let started = Instant::now();
        let interrupted = s
            .start_all_until(tokio::time::sleep(Duration::from_millis(100)))
            .await;
        assert!(interrupted);
        assert!(started.elapsed() < Duration::from_secs(5));

        let record = s.record("local:graph").unwrap();
        assert!(!record.running);
        assert!(record.container_up);
        assert!(SessionSnapshot::load(state.path()).is_some());

        // The abandoned start may have left the container up; shutdown stops it.
        docker.with(|m| {
            m.hang = false;
            m.exists = true;
            m.running = true;
        });
        assert_eq!(s.shutdown_with(std::future::pending()).await, SessionExit::Clean);
        assert!(docker.calls().contains(&"stop cortex-neo4j".to_string()));
        assert!(SessionSnapshot::load(state.path()).is_none());
    }

    #[tokio::test]
    async fn failed_container_stop_keeps_snapshot() {
        let state = tempfile::tempdir().unwrap();
        let docker = ScriptedDocker::new(true, true);
        let (mut s, _dir) = graph_session("sleep 30", docker.clone(), state.path());
        s.start_all().await;

        // The daemon no longer knows the container, so `docker stop` fails.
        docker.with(|m| m.exists = false);
        assert_eq!(s.shutdown_with(std::future::pending()).await, SessionExit::Clean);
        assert!(s.record("local:graph").unwrap().container_up);
        let snapshot = SessionSnapshot::load(state.path()).expect("snapshot kept");
        assert_eq!(
            snapshot.services["local:graph"].container.as_deref(),
            Some("cortex-neo4j")
        );
    }

    #[tokio::test]
    async fn graph_toggle_starts_and_stops_container() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(graph::COMPOSE_FILE), "services: {}\n").unwrap();
        let mut graph = spec(
            "local:graph",
            ServiceKind::Graph {
                engine: GraphEngine::Memgraph,
                deployment: "local".to_string(),
            },
            "sleep 30",
            ReadinessPredicate::never(),
        );
        graph.working_dir = tmp.path().to_path_buf();
        let opts = SessionOptions {
            timings: SessionTimings {
                graph_settle: Duration::from_millis(10),
                ..SessionTimings::default()
            },
            ..options()
        };
        let docker = ScriptedDocker::new(true, false);
        let mut s = OrchestratorSession::with_runner(vec![graph], opts, docker.clone());

        assert!(s.toggle_graph("local").await);
        let record = s.record("local:graph").unwrap();
        assert!(record.running);
        assert!(record.ready);

        assert!(s.toggle_graph("local").await);
        assert!(!s.record("local:graph").unwrap().running);
        assert!(docker.calls().contains(&"stop cortex-memgraph".to_string()));
    }
}
