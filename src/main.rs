mod api;
mod cli;
mod config;
mod display;
mod form;
mod model;
mod picker;
mod summary;
mod sync;
#[cfg(test)]
mod testing;
mod view;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

use api::{Api, ApiClient};
use cli::{Action, Cli, Command, ListArgs};
use config::Config;
use display::{SortColumn, Tabular};
use form::{CreateForm, Field};
use model::{Pipe, Tunnel};
use sync::{Mutation, Resync, SyncError};
use view::{CollectionView, SummaryView};

fn main() -> Result<()> {
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = Config::load();
    if let Some(server) = cli.server {
        cfg.server = server;
    }
    if cli.dev {
        cfg.dev = Some(true);
    }

    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Command::Home { watch } => block_on(cmd_home(watch, &cfg)),
        Command::Tunnels { action } => block_on(cmd_collection::<Tunnel>(action, cfg.tunnels_interval(), &cfg)),
        Command::Pipes { action } => block_on(cmd_collection::<Pipe>(action, cfg.pipes_interval(), &cfg)),
        Command::Ping => block_on(cmd_ping(&cfg)),
        Command::Config => cmd_config(&cfg),
        Command::Completions { shell } => cmd_completions(shell, &cfg),
    }
}

/// Drive one command to completion on a single-threaded runtime.
fn block_on<F: Future<Output = Result<()>>>(command: F) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?
        .block_on(command)
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("BURROW_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "burrow=debug" } else { "burrow=warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn connect(cfg: &Config) -> Result<ApiClient> {
    let base = api::resolve_base_url(cfg.dev_mode(), &cfg.server)
        .with_context(|| format!("bad server address '{}'", cfg.server))?;
    tracing::debug!(%base, dev = cfg.dev_mode(), "using API base");
    ApiClient::new(base).context("failed to build HTTP client")
}

fn print_unreachable(base: &str) {
    println!(
        "{} {}",
        "⚠".yellow(),
        format!("could not reach {}", base).dimmed()
    );
}

/// Clear the terminal and draw a watched view.
fn redraw(title: &str, every: Duration, body: &str) -> Result<()> {
    console::Term::stdout().clear_screen()?;
    println!(
        "{}  {}",
        title.bold(),
        format!("every {}s · Ctrl-C to quit", every.as_secs()).dimmed()
    );
    println!();
    print!("{}", body);
    Ok(())
}

async fn cmd_home(watch: bool, cfg: &Config) -> Result<()> {
    let client = connect(cfg)?;
    let base = client.base_url().to_string();
    let api: Arc<dyn Api> = Arc::new(client);

    if !watch {
        let view = SummaryView::detached(api);
        if view.refresh().await == (Resync::KeptPrevious, Resync::KeptPrevious) {
            print_unreachable(&base);
        }
        print!("{}", display::render_summary(view.info().as_ref(), view.stats().as_ref()));
        return Ok(());
    }

    let every = cfg.summary_interval();
    let mut view = SummaryView::mount(api, every);
    redraw("Home", every, &display::render_loading())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            alive = view.changed() => {
                if !alive {
                    break;
                }
                let body = display::render_summary(view.info().as_ref(), view.stats().as_ref());
                redraw("Home", every, &body)?;
            }
        }
    }
    Ok(())
}

async fn cmd_collection<R: Tabular + DeserializeOwned>(
    action: Option<Action>,
    every: Duration,
    cfg: &Config,
) -> Result<()> {
    let client = connect(cfg)?;
    let base = client.base_url().to_string();
    let api: Arc<dyn Api> = Arc::new(client);

    match action.unwrap_or(Action::List(ListArgs::default())) {
        Action::List(args) if args.watch => watch_collection::<R>(api, every, args.sort).await,
        Action::List(args) => {
            let view = CollectionView::<R>::detached(api);
            if view.refresh().await == Resync::KeptPrevious {
                print_unreachable(&base);
            }
            print!("{}", display::render_table(&view.rows(), args.sort));
            Ok(())
        }
        Action::Add {
            local,
            remote,
            forward,
        } => add_record::<R>(api, local, remote, forward).await,
        Action::Stop { id } => stop_record::<R>(api, &base, id).await,
    }
}

async fn watch_collection<R: Tabular + DeserializeOwned>(
    api: Arc<dyn Api>,
    every: Duration,
    sort: SortColumn,
) -> Result<()> {
    let mut view = CollectionView::<R>::mount(api, every);
    redraw(R::TITLE, every, &display::render_loading())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            alive = view.changed() => {
                if !alive {
                    break;
                }
                redraw(R::TITLE, every, &display::render_table(&view.rows(), sort))?;
            }
        }
    }
    Ok(())
}

/// Use the given value or prompt for it, validating inline.
fn form_field(field: Field, given: Option<String>) -> Result<(String, bool)> {
    if let Some(v) = given {
        return Ok((v, false));
    }
    let label = match field {
        Field::Local => "Local",
        Field::Remote => "Remote",
        Field::Forward => "Forward",
    };
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(label)
        .validate_with(|s: &String| form::require(field, s).map_err(|e| e.message))
        .interact_text()
        .context("input cancelled")?;
    Ok((value, true))
}

async fn add_record<R: Tabular + DeserializeOwned>(
    api: Arc<dyn Api>,
    local: Option<String>,
    remote: Option<String>,
    forward: bool,
) -> Result<()> {
    let mut view = CollectionView::<R>::detached(api);
    view.toggle_form();

    let (local, asked_local) = form_field(Field::Local, local)?;
    let (remote, asked_remote) = form_field(Field::Remote, remote)?;
    let forward = if R::HAS_DIRECTION && !forward && (asked_local || asked_remote) {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Is local listener?")
            .default(false)
            .interact()
            .context("failed to read confirmation")?
    } else {
        forward
    };

    let form = CreateForm {
        local,
        remote,
        forward,
    };
    if view.submit(&form).await? == Mutation::Accepted {
        println!("{} {} {}", "✓".green(), R::NOUN.green().bold(), "created".green());
    }
    print!("{}", display::render_table(&view.rows(), SortColumn::Id));
    Ok(())
}

async fn stop_record<R: Tabular + DeserializeOwned>(
    api: Arc<dyn Api>,
    base: &str,
    id: Option<u64>,
) -> Result<()> {
    let view = CollectionView::<R>::detached(api);
    if view.refresh().await == Resync::KeptPrevious {
        print_unreachable(base);
        return Err(SyncError::Unreachable { noun: R::NOUN }.into());
    }

    let id = match id {
        Some(id) => id,
        None => picker::pick_record(&format!("Stop {}", R::NOUN), &view.stoppable())?,
    };

    if view.stop(id).await? == Mutation::Accepted {
        println!(
            "{} {} {}",
            "○".dimmed(),
            format!("{} {}", R::NOUN, id).bold(),
            "stopped".dimmed()
        );
    }
    print!("{}", display::render_table(&view.rows(), SortColumn::Id));
    Ok(())
}

async fn cmd_ping(cfg: &Config) -> Result<()> {
    let client = connect(cfg)?;
    let reply = client
        .ping()
        .await
        .with_context(|| format!("{} did not answer", client.base_url()))?;
    let message = reply
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("ok");
    println!("{} {} {}", "✓".green(), client.base_url(), message.dimmed());
    Ok(())
}

fn cmd_config(cfg: &Config) -> Result<()> {
    let path = Config::init()?;
    let editor = cfg.resolve_editor();

    let status = std::process::Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("failed to launch editor '{}'", editor))?;
    anyhow::ensure!(status.success(), "editor exited with {}", status);

    let saved = Config::load();
    let base = api::resolve_base_url(saved.dev_mode(), &saved.server)
        .with_context(|| format!("{}: bad server address '{}'", path.display(), saved.server))?;
    println!("{} {} {}", "✓".green(), "API base".bold(), base);
    Ok(())
}

fn cmd_completions(shell: Option<clap_complete::Shell>, cfg: &Config) -> Result<()> {
    let shell = match shell {
        Some(s) => s,
        None => cfg.completion_shell()?,
    };
    // No runtime exists on this path, so the process is still single-threaded.
    unsafe { std::env::set_var("COMPLETE", shell.to_string()) };
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    Ok(())
}
