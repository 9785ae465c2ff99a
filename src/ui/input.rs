use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::orchestrator::ports::PortInstance;

/// What the session should do in response to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    ClearLogs,
    ShowStatus,
    RestartAll,
    /// Toggle the graph container of the deployment at this index in the
    /// controller's graph targets.
    ToggleGraph(usize),
    /// Show the graph selection menu.
    ShowGraphMenu,
    /// Scan ports and show the kill menu.
    OpenKillMenu,
    KillPorts(Vec<PortInstance>),
    ShowHelp,
    /// A menu or overlay was closed; redraw the dashboard.
    Dismiss,
    /// Graceful quit; a second one while shutting down forces.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Help,
    KillMenu(Vec<PortInstance>),
    GraphMenu,
}

/// Maps key presses to [`Action`]s. Pure state machine; the session performs
/// the actions.
pub struct InteractionController {
    mode: Mode,
    graph_targets: Vec<String>,
}

impl InteractionController {
    /// `graph_targets`: deployments with a graph container, in config order.
    pub fn new(graph_targets: Vec<String>) -> Self {
        Self {
            mode: Mode::Normal,
            graph_targets,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn graph_targets(&self) -> &[String] {
        &self.graph_targets
    }

    /// Enter the kill menu with the scan results.
    pub fn open_kill_menu(&mut self, instances: Vec<PortInstance>) {
        self.mode = Mode::KillMenu(instances);
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.kind == KeyEventKind::Release {
            return Action::None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.mode = Mode::Normal;
            return Action::Quit;
        }

        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.normal_key(key.code),
            Mode::Help => Action::Dismiss,
            Mode::KillMenu(instances) => self.kill_menu_key(key.code, instances),
            Mode::GraphMenu => self.graph_menu_key(key.code),
        }
    }

    fn normal_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Char('c') => Action::ClearLogs,
            KeyCode::Char('s') => Action::ShowStatus,
            KeyCode::Char('r') => Action::RestartAll,
            KeyCode::Char('g') => match self.graph_targets.len() {
                0 => Action::None,
                1 => Action::ToggleGraph(0),
                _ => {
                    self.mode = Mode::GraphMenu;
                    Action::ShowGraphMenu
                }
            },
            KeyCode::Char('k') => Action::OpenKillMenu,
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char('?') | KeyCode::Char('h') => {
                self.mode = Mode::Help;
                Action::ShowHelp
            }
            _ => Action::None,
        }
    }

    /// Menus consume exactly one key, then return to normal mode. Anything
    /// that is not a valid selection dismisses the menu.
    fn kill_menu_key(&mut self, code: KeyCode, instances: Vec<PortInstance>) -> Action {
        match code {
            KeyCode::Char('a') if !instances.is_empty() => Action::KillPorts(instances),
            KeyCode::Char(c) => match menu_index(c, instances.len()) {
                Some(idx) => Action::KillPorts(vec![instances[idx].clone()]),
                None => Action::Dismiss,
            },
            _ => Action::Dismiss,
        }
    }

    fn graph_menu_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Char(c) => match menu_index(c, self.graph_targets.len()) {
                Some(idx) => Action::ToggleGraph(idx),
                None => Action::Dismiss,
            },
            _ => Action::Dismiss,
        }
    }
}

/// Zero-based index for a 1-based digit key, if within `len`.
fn menu_index(c: char, len: usize) -> Option<usize> {
    let n = c.to_digit(10)? as usize;
    (1..=len).contains(&n).then(|| n - 1)
}
