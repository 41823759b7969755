use crate::commands::CreateRequest;
use crate::input::Action;
use crate::model::{ConnectivityState, Snapshot, VCluster};
use crate::orchestrator::UiState;
use anyhow::Result;
use chrono::Local;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    Refresh,
    Create {
        request: CreateRequest,
        values_file: Option<String>,
    },
    Delete {
        name: String,
        namespace: String,
    },
    Pause {
        name: String,
        namespace: String,
    },
    Resume {
        name: String,
        namespace: String,
    },
    Connect {
        name: String,
        namespace: String,
    },
    Disconnect {
        namespace: String,
    },
    LoadContexts,
    SwitchContext {
        context: String,
    },
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    prompt: String,
    command: AppCommand,
}

#[derive(Debug, Clone)]
struct ContextPicker {
    contexts: Vec<String>,
    selected: usize,
}

pub struct App {
    running: bool,
    mode: InputMode,
    state: UiState,
    selected: usize,
    input: String,
    status: String,
    status_level: StatusLevel,
    show_help: bool,
    pending_confirmation: Option<PendingConfirmation>,
    context_picker: Option<ContextPicker>,
    last_refresh: Option<String>,
}

impl App {
    pub fn new(extension_context: String) -> Self {
        Self {
            running: true,
            mode: InputMode::Normal,
            state: UiState::new(extension_context),
            selected: 0,
            input: String::new(),
            status: "Press ? for help".to_string(),
            status_level: StatusLevel::Info,
            show_help: false,
            pending_confirmation: None,
            context_picker: None,
            last_refresh: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn status_level(&self) -> StatusLevel {
        self.status_level
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn last_refresh(&self) -> Option<&str> {
        self.last_refresh.as_deref()
    }

    pub fn pending_confirmation_prompt(&self) -> Option<&str> {
        self.pending_confirmation
            .as_ref()
            .map(|pending| pending.prompt.as_str())
    }

    pub fn vclusters(&self) -> &[VCluster] {
        self.state.vclusters.as_deref().unwrap_or_default()
    }

    pub fn selected_index(&self) -> Option<usize> {
        (!self.vclusters().is_empty()).then_some(self.selected)
    }

    pub fn selected_vcluster(&self) -> Option<&VCluster> {
        self.vclusters().get(self.selected)
    }

    pub fn context_picker_items(&self) -> Option<(&[String], usize)> {
        self.context_picker
            .as_ref()
            .map(|picker| (picker.contexts.as_slice(), picker.selected))
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.status_level = StatusLevel::Info;
    }

    pub fn notify(&mut self, success: bool, message: impl Into<String>) {
        self.status = message.into();
        self.status_level = if success {
            StatusLevel::Success
        } else {
            StatusLevel::Error
        };
    }

    pub fn apply_refresh(&mut self, result: Result<Option<Snapshot>>) {
        let committed = matches!(&result, Ok(Some(snapshot))
            if snapshot.extension_context == self.state.extension_context);
        self.state.apply_refresh(result);
        if committed {
            self.last_refresh = Some(Local::now().format("%H:%M:%S").to_string());
        }
        self.clamp_selection();
    }

    pub fn apply_connectivity(&mut self, context: &str, state: ConnectivityState) {
        self.state.apply_connectivity(context, state);
    }

    /// Resets the view for `context` and returns the context it replaces.
    pub fn begin_context_switch(&mut self, context: &str) -> String {
        let previous = self.state.extension_context.clone();
        self.state.switch_to(context);
        self.selected = 0;
        self.last_refresh = None;
        previous
    }

    pub fn open_context_picker(&mut self, contexts: Vec<String>) {
        if contexts.is_empty() {
            self.notify(false, "No contexts available");
            return;
        }
        let selected = contexts
            .iter()
            .position(|context| *context == self.state.extension_context)
            .unwrap_or(0);
        self.context_picker = Some(ContextPicker { contexts, selected });
        self.set_status("Select a context and press Enter");
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if let Some(pending) = self.pending_confirmation.take() {
            match action {
                Action::ConfirmYes | Action::Enter => {
                    self.set_status(format!("Confirmed: {}", pending.prompt));
                    return pending.command;
                }
                Action::ConfirmNo | Action::Cancel | Action::CancelInput => {
                    self.set_status("Action cancelled");
                    return AppCommand::None;
                }
                Action::Quit => {}
                _ => {
                    self.pending_confirmation = Some(pending);
                    self.set_status("Pending confirmation: press y to confirm or n to cancel");
                    return AppCommand::None;
                }
            }
        }

        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
        }

        if self.context_picker.is_some() && self.mode == InputMode::Normal {
            return self.apply_picker_action(action);
        }

        match action {
            Action::Quit => {
                self.running = false;
                self.set_status("Exit requested");
                AppCommand::None
            }
            Action::Down => {
                self.move_selection(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_selection(-1);
                AppCommand::None
            }
            Action::Top => {
                self.selected = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.selected = self.vclusters().len().saturating_sub(1);
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::Refresh => {
                self.set_status("Refreshing");
                AppCommand::Refresh
            }
            Action::StartCommand => {
                self.start_input("");
                AppCommand::None
            }
            Action::StartCreate => {
                self.start_input("create ");
                AppCommand::None
            }
            Action::StartUpgrade => {
                let prefill = match self.selected_vcluster() {
                    Some(vc) => format!("upgrade {} {} ", vc.name, vc.namespace),
                    None => "upgrade ".to_string(),
                };
                self.start_input(&prefill);
                AppCommand::None
            }
            Action::OpenContextPicker => {
                self.set_status("Loading contexts");
                AppCommand::LoadContexts
            }
            Action::Pause => self.selected_command("pause", |name, namespace| {
                AppCommand::Pause { name, namespace }
            }),
            Action::Resume => self.selected_command("resume", |name, namespace| {
                AppCommand::Resume { name, namespace }
            }),
            Action::Connect => self.selected_command("connect", |name, namespace| {
                AppCommand::Connect { name, namespace }
            }),
            Action::Disconnect => self.selected_command("disconnect", |_, namespace| {
                AppCommand::Disconnect { namespace }
            }),
            Action::Delete => {
                let Some(vc) = self.selected_vcluster() else {
                    self.notify(false, "No vcluster selected");
                    return AppCommand::None;
                };
                let prompt = format!("delete vcluster {}/{}", vc.namespace, vc.name);
                let command = AppCommand::Delete {
                    name: vc.name.clone(),
                    namespace: vc.namespace.clone(),
                };
                self.set_status(format!("Really {prompt}? (y/n)"));
                self.pending_confirmation = Some(PendingConfirmation { prompt, command });
                AppCommand::None
            }
            Action::SubmitInput => {
                let line = std::mem::take(&mut self.input);
                self.mode = InputMode::Normal;
                self.execute_command_line(&line)
            }
            Action::CancelInput => {
                self.input.clear();
                self.mode = InputMode::Normal;
                self.set_status("Command cancelled");
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                AppCommand::None
            }
            Action::ClearInput => {
                self.input.clear();
                AppCommand::None
            }
            Action::InputChar(c) => {
                self.input.push(c);
                AppCommand::None
            }
            Action::Enter | Action::Cancel | Action::ConfirmYes | Action::ConfirmNo => {
                AppCommand::None
            }
        }
    }

    fn apply_picker_action(&mut self, action: Action) -> AppCommand {
        let Some(picker) = self.context_picker.as_mut() else {
            return AppCommand::None;
        };
        match action {
            Action::Down => {
                picker.selected = (picker.selected + 1).min(picker.contexts.len() - 1);
                AppCommand::None
            }
            Action::Up => {
                picker.selected = picker.selected.saturating_sub(1);
                AppCommand::None
            }
            Action::Enter => {
                let context = picker.contexts[picker.selected].clone();
                self.context_picker = None;
                self.switch_command(context)
            }
            Action::Quit => {
                self.running = false;
                AppCommand::None
            }
            Action::Cancel | Action::OpenContextPicker => {
                self.context_picker = None;
                self.set_status("Context unchanged");
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    fn start_input(&mut self, prefill: &str) {
        self.mode = InputMode::Command;
        self.input = prefill.to_string();
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.vclusters().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    fn clamp_selection(&mut self) {
        let len = self.vclusters().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn selected_command(
        &mut self,
        verb: &str,
        build: impl FnOnce(String, String) -> AppCommand,
    ) -> AppCommand {
        match self.selected_vcluster() {
            Some(vc) => {
                let message = format!("Running {verb} on {}", vc.name);
                let command = build(vc.name.clone(), vc.namespace.clone());
                self.set_status(message);
                command
            }
            None => {
                self.notify(false, "No vcluster selected");
                AppCommand::None
            }
        }
    }

    fn switch_command(&mut self, context: String) -> AppCommand {
        if context == self.state.extension_context {
            self.set_status(format!("Already using {context}"));
            return AppCommand::None;
        }
        self.set_status(format!("Switching to {context}"));
        AppCommand::SwitchContext { context }
    }

    fn execute_command_line(&mut self, line: &str) -> AppCommand {
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        let Some((&verb, rest)) = tokens.split_first() else {
            return AppCommand::None;
        };

        match verb {
            "q" | "quit" => {
                self.running = false;
                AppCommand::None
            }
            "refresh" => AppCommand::Refresh,
            "create" | "upgrade" => match parse_create_args(rest, verb == "upgrade") {
                Ok((request, values_file)) => {
                    self.set_status(format!("Running {verb} for {}", request.name));
                    AppCommand::Create {
                        request,
                        values_file,
                    }
                }
                Err(error) => {
                    self.notify(false, error);
                    AppCommand::None
                }
            },
            "ctx" | "context" => match rest.first() {
                Some(context) => self.switch_command(context.to_string()),
                None => {
                    self.set_status("Loading contexts");
                    AppCommand::LoadContexts
                }
            },
            "disconnect" => match rest.first() {
                Some(namespace) => AppCommand::Disconnect {
                    namespace: namespace.to_string(),
                },
                None => self.selected_command("disconnect", |_, namespace| {
                    AppCommand::Disconnect { namespace }
                }),
            },
            other => {
                self.notify(false, format!("Unknown command: {other}"));
                AppCommand::None
            }
        }
    }
}

/// `<name> [namespace] [--distro D] [--chart-version V] [--values PATH]`.
fn parse_create_args(
    tokens: &[&str],
    upgrade: bool,
) -> std::result::Result<(CreateRequest, Option<String>), String> {
    let mut positional = Vec::new();
    let mut request = CreateRequest {
        upgrade,
        ..CreateRequest::default()
    };
    let mut values_file = None;

    let mut iter = tokens.iter();
    while let Some(&token) = iter.next() {
        let (flag, inline) = match token.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
            _ => (token, None),
        };
        if !flag.starts_with("--") {
            positional.push(token);
            continue;
        }
        let value = match inline {
            Some(value) => value.to_string(),
            None => iter
                .next()
                .map(|value| value.to_string())
                .ok_or_else(|| format!("{flag} needs a value"))?,
        };
        match flag {
            "--distro" => request.distro = Some(value),
            "--chart-version" => request.chart_version = Some(value),
            "--values" => values_file = Some(value),
            "--namespace" | "-n" => request.namespace = Some(value),
            other => return Err(format!("unknown flag {other}")),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional
        .next()
        .ok_or_else(|| "usage: create <name> [namespace] [--distro D]".to_string())?;
    request.name = name.to_string();
    if let Some(namespace) = positional.next() {
        request.namespace = Some(namespace.to_string());
    }
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument {extra}"));
    }

    Ok((request.with_default_namespace(), values_file))
}

#[cfg(test)]
mod tests {
    use super::{App, AppCommand, InputMode, StatusLevel, parse_create_args};
    use crate::input::Action;
    use crate::model::{ConnectivityState, Snapshot, VCluster};

    fn vc(name: &str) -> VCluster {
        VCluster {
            name: name.to_string(),
            namespace: format!("vcluster-{name}"),
            status: "Running".to_string(),
            ..VCluster::default()
        }
    }

    fn app_with(names: &[&str]) -> App {
        let mut app = App::new("docker-desktop".to_string());
        app.apply_refresh(Ok(Some(Snapshot {
            extension_context: "docker-desktop".to_string(),
            host_context: "docker-desktop".to_string(),
            vclusters: names.iter().map(|name| vc(name)).collect(),
            namespaces: Vec::new(),
        })));
        app
    }

    fn type_line(app: &mut App, line: &str) -> AppCommand {
        app.apply_action(Action::StartCommand);
        for c in line.chars() {
            app.apply_action(Action::InputChar(c));
        }
        app.apply_action(Action::SubmitInput)
    }

    #[test]
    fn delete_requires_confirmation() {
        let mut app = app_with(&["a", "b"]);
        app.apply_action(Action::Down);

        assert_eq!(app.apply_action(Action::Delete), AppCommand::None);
        assert!(app.pending_confirmation_prompt().is_some());
        assert_eq!(app.apply_action(Action::Down), AppCommand::None);

        let cmd = app.apply_action(Action::ConfirmYes);
        assert_eq!(
            cmd,
            AppCommand::Delete {
                name: "b".to_string(),
                namespace: "vcluster-b".to_string(),
            }
        );
        assert!(app.pending_confirmation_prompt().is_none());
    }

    #[test]
    fn declined_delete_is_cancelled() {
        let mut app = app_with(&["a"]);
        app.apply_action(Action::Delete);
        assert_eq!(app.apply_action(Action::ConfirmNo), AppCommand::None);
        assert_eq!(app.status(), "Action cancelled");
    }

    #[test]
    fn lifecycle_without_selection_reports_error() {
        let mut app = App::new("docker-desktop".to_string());
        assert_eq!(app.apply_action(Action::Pause), AppCommand::None);
        assert_eq!(app.status_level(), StatusLevel::Error);
    }

    #[test]
    fn connect_targets_selected_row() {
        let mut app = app_with(&["a", "b"]);
        app.apply_action(Action::Bottom);
        assert_eq!(
            app.apply_action(Action::Connect),
            AppCommand::Connect {
                name: "b".to_string(),
                namespace: "vcluster-b".to_string(),
            }
        );
    }

    #[test]
    fn create_command_line_fills_request() {
        let mut app = App::new("docker-desktop".to_string());
        let cmd = type_line(&mut app, "create Demo --distro k3s --values ./v.yaml");
        let AppCommand::Create {
            request,
            values_file,
        } = cmd
        else {
            panic!("expected create, got {cmd:?}");
        };
        assert_eq!(request.name, "Demo");
        assert_eq!(request.namespace.as_deref(), Some("vcluster-demo"));
        assert_eq!(request.distro.as_deref(), Some("k3s"));
        assert!(!request.upgrade);
        assert_eq!(values_file.as_deref(), Some("./v.yaml"));
        assert_eq!(app.mode(), InputMode::Normal);
    }

    #[test]
    fn upgrade_prefill_uses_selection() {
        let mut app = app_with(&["a"]);
        app.apply_action(Action::StartUpgrade);
        assert_eq!(app.input(), "upgrade a vcluster-a ");
        app.apply_action(Action::InputChar('-'));
        for c in "-chart-version=0.20.0".chars() {
            app.apply_action(Action::InputChar(c));
        }
        let AppCommand::Create { request, .. } = app.apply_action(Action::SubmitInput) else {
            panic!("expected upgrade");
        };
        assert!(request.upgrade);
        assert_eq!(request.namespace.as_deref(), Some("vcluster-a"));
        assert_eq!(request.chart_version.as_deref(), Some("0.20.0"));
    }

    #[test]
    fn create_args_reject_missing_name_and_values() {
        assert!(parse_create_args(&[], false).is_err());
        assert!(parse_create_args(&["demo", "--distro"], false).is_err());
        assert!(parse_create_args(&["demo", "ns", "extra"], false).is_err());
        assert!(parse_create_args(&["demo", "--bogus", "x"], false).is_err());
    }

    #[test]
    fn ctx_command_switches_or_opens_picker() {
        let mut app = App::new("docker-desktop".to_string());
        assert_eq!(
            type_line(&mut app, "ctx kind-dev"),
            AppCommand::SwitchContext {
                context: "kind-dev".to_string()
            }
        );
        assert_eq!(type_line(&mut app, "ctx docker-desktop"), AppCommand::None);
        assert_eq!(type_line(&mut app, "ctx"), AppCommand::LoadContexts);
    }

    #[test]
    fn context_picker_selects_and_switches() {
        let mut app = App::new("docker-desktop".to_string());
        app.open_context_picker(vec!["docker-desktop".to_string(), "kind-dev".to_string()]);
        assert_eq!(app.context_picker_items().map(|(_, i)| i), Some(0));

        app.apply_action(Action::Down);
        app.apply_action(Action::Down);
        let cmd = app.apply_action(Action::Enter);
        assert_eq!(
            cmd,
            AppCommand::SwitchContext {
                context: "kind-dev".to_string()
            }
        );
        assert!(app.context_picker_items().is_none());
    }

    #[test]
    fn context_switch_resets_view_and_ignores_stale_data() {
        let mut app = app_with(&["a", "b"]);
        app.apply_action(Action::Bottom);
        let previous = app.begin_context_switch("kind-dev");
        assert_eq!(previous, "docker-desktop");
        assert_eq!(app.state().connectivity, ConnectivityState::Probing);
        assert!(app.vclusters().is_empty());
        assert_eq!(app.selected_index(), None);

        app.apply_refresh(Ok(Some(Snapshot {
            extension_context: "docker-desktop".to_string(),
            vclusters: vec![vc("stale")],
            ..Snapshot::default()
        })));
        assert!(app.vclusters().is_empty());
        assert_eq!(app.last_refresh(), None);
    }

    #[test]
    fn shrinking_list_clamps_selection() {
        let mut app = app_with(&["a", "b", "c"]);
        app.apply_action(Action::Bottom);
        app.apply_refresh(Ok(Some(Snapshot {
            extension_context: "docker-desktop".to_string(),
            vclusters: vec![vc("a")],
            ..Snapshot::default()
        })));
        assert_eq!(app.selected_vcluster().map(|vc| vc.name.as_str()), Some("a"));
    }
}
