mod app;
mod backend;
mod bridge;
mod cli;
mod commands;
mod config;
mod context;
mod input;
mod model;
mod orchestrator;
mod parse;
mod probe;
mod store;
#[cfg(test)]
mod testing;
mod ui;
mod vcluster;

use anyhow::{Context, Result};
use app::{App, AppCommand};
use backend::{HttpBackend, LocalBackend, StagingBackend};
use bridge::ProcessBridge;
use chrono::Local;
use clap::Parser;
use cli::{CliArgs, Command, CreateArgs, TargetArgs};
use commands::{CreateRequest, KUBECTL, VCLUSTER};
use config::Settings;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use orchestrator::{Orchestrator, PollEvent, Poller};
use parse::CliOutcome;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use store::{FileStore, MemoryStore, StateStore};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let command = args.command();
    init_tracing(
        &args.log_filter,
        command == Command::Console,
        args.log_file.as_deref(),
    )?;

    let settings = Settings::load(&args)?;
    if let Some(source) = &settings.source {
        debug!("settings loaded from {}", source.display());
    }
    let orchestrator = build_orchestrator(&settings, args.no_persist)?;
    prepare(&orchestrator, args.context.as_deref()).await?;

    match command {
        Command::Console => run_console(&orchestrator, settings.refresh_interval).await,
        other => run_oneshot(&orchestrator, other).await,
    }
}

/// Stages the host kubeconfig that extension-side commands run against, then applies
/// the `--context` override.
async fn prepare(orchestrator: &Orchestrator, context: Option<&str>) -> Result<()> {
    orchestrator.stage_kubeconfig().await;

    if let Some(context) = context
        && context != orchestrator.tracker().extension_context()
    {
        let outcome = orchestrator.switch_context(context).await?;
        info!(
            "using extension context {} ({})",
            outcome.context, outcome.connectivity
        );
    }
    Ok(())
}

fn init_tracing(level_filter: &str, console: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    // The console owns the terminal, so its logs go to a file or nowhere.
    match (console, log_file) {
        (_, Some(path)) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        (true, None) => {
            let _ = builder.with_writer(io::sink).try_init();
        }
        (false, None) => {
            let _ = builder.with_writer(io::stderr).try_init();
        }
    }

    Ok(())
}

fn build_orchestrator(settings: &Settings, no_persist: bool) -> Result<Orchestrator> {
    let bridge = ProcessBridge::new(
        settings.extension_kubeconfig.clone(),
        settings.list_timeout,
        settings.lifecycle_timeout,
    )
    .with_binary(VCLUSTER, settings.vcluster_binary.clone())
    .with_binary(KUBECTL, settings.kubectl_binary.clone());

    let local = LocalBackend::new(
        settings.staging_dir.clone(),
        settings.extension_kubeconfig.clone(),
    );
    let backend: Arc<dyn StagingBackend> = match settings.backend_url.as_deref() {
        Some(url) => {
            debug!("staging through backend at {url}");
            Arc::new(HttpBackend::new(url, settings.list_timeout, local)?)
        }
        None => Arc::new(local),
    };
    let store: Arc<dyn StateStore> = if no_persist {
        Arc::new(MemoryStore::new())
    } else {
        let store = FileStore::open(&settings.state_file)?;
        debug!("state file {}", store.path().display());
        Arc::new(store)
    };

    Ok(Orchestrator::new(
        Arc::new(bridge),
        backend,
        store,
        settings.probe_timeout,
    ))
}

async fn run_oneshot(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    let ops = orchestrator.ops();
    let context = orchestrator.tracker().extension_context();

    match command {
        Command::Console => Ok(()),
        Command::List { json } => {
            let vclusters = ops
                .list_vclusters(&context)
                .await?
                .into_result("listVClusters")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&vclusters)?);
                return Ok(());
            }
            let now = Local::now();
            println!("{:<24} {:<28} {:<10} AGE", "NAME", "NAMESPACE", "STATUS");
            for vc in &vclusters {
                println!(
                    "{:<24} {:<28} {:<10} {}",
                    vc.name,
                    vc.namespace,
                    vc.status,
                    vc.age(now)
                );
            }
            Ok(())
        }
        Command::Namespaces => {
            let namespaces = ops
                .list_namespaces(&context)
                .await?
                .into_result("listNamespaces")?;
            for namespace in namespaces {
                println!("{namespace}");
            }
            Ok(())
        }
        Command::Contexts => {
            let contexts = ops
                .extension_contexts()
                .await?
                .into_result("listExtensionContexts")?;
            for name in context::user_facing_contexts(&contexts) {
                let marker = if name == context { "*" } else { " " };
                println!("{marker} {name}");
            }
            Ok(())
        }
        Command::UseContext { context } => {
            let outcome = orchestrator.switch_context(&context).await?;
            println!("extension context: {} ({})", outcome.context, outcome.connectivity);
            Ok(())
        }
        Command::Create(args) => create(orchestrator, args, false).await,
        Command::Upgrade(args) => create(orchestrator, args, true).await,
        Command::Delete(TargetArgs { name, namespace }) => report(
            ops.delete(&name, &namespace).await,
            format!("deleted vcluster {namespace}/{name}"),
        ),
        Command::Pause(TargetArgs { name, namespace }) => report(
            ops.pause(&name, &namespace).await,
            format!("paused vcluster {namespace}/{name}"),
        ),
        Command::Resume(TargetArgs { name, namespace }) => report(
            ops.resume(&name, &namespace).await,
            format!("resumed vcluster {namespace}/{name}"),
        ),
        Command::Connect(TargetArgs { name, namespace }) => report(
            ops.connect(&name, &namespace).await,
            format!("connected to vcluster {namespace}/{name}"),
        ),
        Command::Disconnect { namespace } => report(
            ops.disconnect(&namespace).await,
            format!("disconnected from vclusters in {namespace}"),
        ),
        Command::Status => {
            let status = orchestrator.status().await?;
            println!("extension context:  {}", status.extension_context);
            println!("kubeconfig context: {}", status.kubeconfig_context);
            println!("host context:       {}", status.host_context);
            println!("kubernetes:         {}", status.connectivity);
            if let Some(snapshot) = status.snapshot {
                println!("vclusters:          {}", snapshot.vclusters.len());
                println!("namespaces:         {}", snapshot.namespaces.len());
            }
            Ok(())
        }
        Command::Hello => {
            let reply = ops.backend().hello().await?;
            println!("{reply}");
            Ok(())
        }
    }
}

async fn create(orchestrator: &Orchestrator, args: CreateArgs, upgrade: bool) -> Result<()> {
    let values = match &args.values {
        Some(path) => Some(read_values_file(path).await?),
        None => None,
    };
    let request = CreateRequest {
        name: args.name,
        namespace: args.namespace,
        distro: args.distro,
        chart_version: args.chart_version,
        values,
        upgrade,
    }
    .with_default_namespace();

    let verb = if upgrade { "upgraded" } else { "created" };
    report(
        orchestrator.ops().create(&request).await,
        format!("{verb} vcluster {}", request.name),
    )
}

async fn read_values_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read values file {}", path.display()))
}

fn report(ok: bool, message: String) -> Result<()> {
    if ok {
        println!("{message}");
        Ok(())
    } else {
        anyhow::bail!("command failed, not {message}; rerun with --log-filter debug for details")
    }
}

async fn run_console(orchestrator: &Orchestrator, refresh: Duration) -> Result<()> {
    let mut app = App::new(orchestrator.tracker().extension_context());
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app, orchestrator, refresh).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    orchestrator: &Orchestrator,
    refresh: Duration,
) -> Result<()> {
    app.set_status("Checking Kubernetes connectivity…");
    terminal
        .draw(|frame| ui::render(frame, app))
        .context("failed to render terminal frame")?;
    refresh_now(app, orchestrator).await;

    let (poll_tx, mut poll_rx) = mpsc::unbounded_channel::<PollEvent>();
    let mut poller = Poller::start(orchestrator.clone(), refresh, poll_tx);
    let mut reader = EventStream::new();

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            terminal
                                .draw(|frame| ui::render(frame, app))
                                .context("failed to render terminal frame")?;
                            execute_app_command(terminal, app, orchestrator, command).await;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.notify(false, format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            maybe_poll = poll_rx.recv() => {
                match maybe_poll {
                    Some(PollEvent::Connectivity { context, state }) => {
                        app.apply_connectivity(&context, state);
                    }
                    Some(PollEvent::Data(result)) => app.apply_refresh(result),
                    None => {
                        warn!("background refresh stopped");
                        break;
                    }
                }
            }
        }
    }

    poller.shutdown();
    Ok(())
}

async fn refresh_now(app: &mut App, orchestrator: &Orchestrator) {
    let (context, state) = orchestrator.refresh_connectivity().await;
    app.apply_connectivity(&context, state);
    app.apply_refresh(orchestrator.refresh_data().await);
    app.set_status(format!("Kubernetes {state} via {context}"));
}

async fn execute_app_command(
    terminal: &mut TuiTerminal,
    app: &mut App,
    orchestrator: &Orchestrator,
    command: AppCommand,
) {
    let ops = orchestrator.ops();
    match command {
        AppCommand::None => {}
        AppCommand::Refresh => refresh_now(app, orchestrator).await,
        AppCommand::Create {
            mut request,
            values_file,
        } => {
            if let Some(path) = values_file {
                match read_values_file(&PathBuf::from(&path)).await {
                    Ok(values) => request.values = Some(values),
                    Err(error) => {
                        app.notify(false, format!("{error:#}"));
                        return;
                    }
                }
            }
            let verb = if request.upgrade { "Upgrade" } else { "Create" };
            let ok = ops.create(&request).await;
            finish_action(app, orchestrator, ok, format!("{verb} vcluster {}", request.name)).await;
        }
        AppCommand::Delete { name, namespace } => {
            let ok = ops.delete(&name, &namespace).await;
            finish_action(app, orchestrator, ok, format!("Delete vcluster {name}")).await;
        }
        AppCommand::Pause { name, namespace } => {
            let ok = ops.pause(&name, &namespace).await;
            finish_action(app, orchestrator, ok, format!("Pause vcluster {name}")).await;
        }
        AppCommand::Resume { name, namespace } => {
            let ok = ops.resume(&name, &namespace).await;
            finish_action(app, orchestrator, ok, format!("Resume vcluster {name}")).await;
        }
        AppCommand::Connect { name, namespace } => {
            let ok = ops.connect(&name, &namespace).await;
            finish_action(app, orchestrator, ok, format!("Connect to {name}")).await;
        }
        AppCommand::Disconnect { namespace } => {
            let ok = ops.disconnect(&namespace).await;
            finish_action(app, orchestrator, ok, format!("Disconnect from {namespace}")).await;
        }
        AppCommand::LoadContexts => match ops.extension_contexts().await {
            Ok(CliOutcome::Ok(contexts)) => {
                app.open_context_picker(context::user_facing_contexts(&contexts));
            }
            Ok(outcome) => app.notify(
                false,
                format!(
                    "Failed to list contexts: {}",
                    outcome.error().unwrap_or("unknown error")
                ),
            ),
            Err(error) => app.notify(false, format!("Failed to list contexts: {error:#}")),
        },
        AppCommand::SwitchContext { context } => {
            let previous = app.begin_context_switch(&context);
            let _ = terminal.draw(|frame| ui::render(frame, app));
            match orchestrator.switch_context(&context).await {
                Ok(outcome) => {
                    app.apply_connectivity(&outcome.context, outcome.connectivity);
                    app.apply_refresh(outcome.refresh);
                    app.notify(
                        outcome.connectivity.is_connected(),
                        format!("Switched to {} ({})", outcome.context, outcome.connectivity),
                    );
                }
                Err(error) => {
                    app.begin_context_switch(&previous);
                    refresh_now(app, orchestrator).await;
                    app.notify(false, format!("Context switch failed: {error:#}"));
                }
            }
        }
    }
}

async fn finish_action(app: &mut App, orchestrator: &Orchestrator, ok: bool, label: String) {
    if ok {
        info!("{label} succeeded");
        app.apply_refresh(orchestrator.refresh_data().await);
        app.notify(true, format!("{label} succeeded"));
    } else {
        app.notify(false, format!("{label} failed, see log for details"));
    }
}
