mod app;
mod cli;
mod config;
mod effects;
mod persistence;
mod render;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use lab_logging::lab_info;
use log::LevelFilter;
use threshlab_core::{
    AppState, Bootstrap, FileCategory, Msg, NoticeLevel, ParamValue, PipelinePhase, ProcessName,
    SessionId, Tab, ThresholdKey,
};
use threshlab_engine::Url;

use crate::app::App;
use crate::cli::{Cli, Command};
use crate::config::AppConfig;
use crate::effects::EffectRunner;

const SESSION_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Uploads and pipeline runs are bounded by the backend, not by us.
const LONG_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    lab_logging::initialize(&cli.log.destination(cli.log_file.clone()), level);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_override(cli.api_base_url.clone());
    config.validate()?;
    let base_url = Url::parse(&config.api_base_url).ok();

    // Periodic refresh only pays off while something is watching the session.
    let watching = matches!(cli.command, Command::Show { watch: Some(_), .. });
    let runner = EffectRunner::new(config.client_settings())
        .with_context(|| format!("cannot use backend {}", config.api_base_url))?;
    let mut app = App::new(
        AppState::with_keep_fresh(config.keep_fresh && watching),
        runner,
    );

    let known = match cli.command {
        Command::Session => None,
        _ => cli
            .session
            .clone()
            .map(SessionId::new)
            .or_else(|| persistence::load_session(&config.state_dir)),
    };
    let outcome = match ensure_session(&mut app, known, &config.state_dir) {
        Ok(session_id) => execute(&mut app, cli.command, &session_id, base_url.as_ref()),
        Err(err) => Err(err),
    };
    print_notices(&mut app);
    app.shutdown();
    outcome
}

fn ensure_session(
    app: &mut App,
    known: Option<SessionId>,
    state_dir: &Path,
) -> anyhow::Result<SessionId> {
    match known {
        Some(session_id) => {
            lab_info!("Using session {}", session_id);
            app.dispatch(Msg::SessionAttached(session_id));
        }
        None => app.dispatch(Msg::AppStarted),
    }

    let settled = app.pump_until(
        SESSION_TIMEOUT,
        |state| {
            state.session_data().is_some()
                || state.refresh_error().is_some()
                || matches!(state.bootstrap(), Bootstrap::Failed(_))
        },
        |_| {},
    );
    if !settled {
        bail!("backend did not answer within {:?}", SESSION_TIMEOUT);
    }

    let state = app.state();
    if let Bootstrap::Failed(reason) = state.bootstrap() {
        bail!("could not start a session: {reason}");
    }
    let session_id = state
        .session_id()
        .cloned()
        .ok_or_else(|| anyhow!("no session is active"))?;
    if let Some(reason) = state.refresh_error() {
        bail!("session {session_id} is not available: {reason}");
    }
    persistence::save_session(state_dir, &session_id);
    Ok(session_id)
}

fn execute(
    app: &mut App,
    command: Command,
    session_id: &SessionId,
    base_url: Option<&Url>,
) -> anyhow::Result<()> {
    match command {
        Command::Session => {
            println!("{session_id}");
            Ok(())
        }
        Command::Show { tab, watch } => show(app, tab.into(), watch, base_url),
        Command::Upload { category, files } => upload(app, category, files, base_url),
        Command::Delete { category } => request_with_notice(app, Msg::DeleteClicked(category)),
        Command::Threshold {
            name,
            value,
            by_type,
        } => request_with_notice(
            app,
            Msg::ThresholdEdited {
                key: ThresholdKey::for_param(&name, by_type),
                value: ParamValue::parse(&value),
            },
        ),
        Command::RestoreDefaults => request_with_notice(app, Msg::RestoreDefaultsClicked),
        Command::Process { name, state } => request_with_notice(
            app,
            Msg::ProcessToggled {
                process: ProcessName::from(name.as_str()),
                enabled: state.enabled(),
            },
        ),
        Command::Run { download_dir } => run_pipeline(app, download_dir, base_url),
        Command::Metrics => show(app, Tab::Metrics, None, base_url),
        Command::Download { reference, dir } => download(app, &reference, dir),
    }
}

fn show(
    app: &mut App,
    tab: Tab,
    watch: Option<u64>,
    base_url: Option<&Url>,
) -> anyhow::Result<()> {
    app.dispatch(Msg::TabSelected(tab));
    app.pump_until(REQUEST_TIMEOUT, |state| !state.is_metrics_loading(), |_| {});
    print!("{}", render::render(&app.state().view(), base_url));

    if let Some(seconds) = watch {
        app.pump_until(
            Duration::from_secs(seconds),
            |_| false,
            |app| {
                print_notices(app);
                println!();
                print!("{}", render::render(&app.state().view(), base_url));
            },
        );
    }
    Ok(())
}

fn upload(
    app: &mut App,
    category: FileCategory,
    files: Vec<PathBuf>,
    base_url: Option<&Url>,
) -> anyhow::Result<()> {
    app.dispatch(Msg::FilesSelected { category, files });
    if !app.state().is_uploading(category) {
        print_notices(app);
        bail!("{} upload was not started", category.title());
    }

    let mut failed = false;
    let mut last_line = String::new();
    let finished = app.pump_until(
        LONG_TIMEOUT,
        |state| !state.is_uploading(category),
        |app| {
            failed |= print_notices(app);
            if let Some(control) = app.state().view().upload(category) {
                let line = render::render_upload(control, base_url);
                if control.busy && line != last_line {
                    print!("{line}");
                    last_line = line;
                }
            }
        },
    );
    if !finished {
        bail!("{} upload did not finish", category.title());
    }
    if let Some(control) = app.state().view().upload(category) {
        print!("{}", render::render_upload(control, base_url));
    }
    if failed {
        bail!("some files could not be uploaded");
    }
    Ok(())
}

/// Sends a settings or delete request and waits for its outcome notice.
fn request_with_notice(app: &mut App, msg: Msg) -> anyhow::Result<()> {
    let baseline = latest_notice_id(app);
    app.dispatch(msg);
    let answered = app.pump_until(
        REQUEST_TIMEOUT,
        |state| state.notices().last().map(|n| n.id) > baseline,
        |_| {},
    );
    let failed = print_notices(app);
    if !answered {
        bail!("backend did not answer within {:?}", REQUEST_TIMEOUT);
    }
    if failed {
        bail!("request was rejected");
    }
    Ok(())
}

fn run_pipeline(
    app: &mut App,
    download_dir: Option<PathBuf>,
    base_url: Option<&Url>,
) -> anyhow::Result<()> {
    app.dispatch(Msg::RunPipelineClicked);
    if !app.state().is_pipeline_starting() {
        print_notices(app);
        bail!("pipeline was not started");
    }

    let mut last_line = String::new();
    let settled = app.pump_until(
        LONG_TIMEOUT,
        |state| !state.is_pipeline_starting() && !state.is_polling(),
        |app| {
            print_notices(app);
            let line = render::render_pipeline(&app.state().view().pipeline, base_url);
            if line != last_line {
                print!("{line}");
                last_line = line;
            }
        },
    );
    if !settled {
        bail!("pipeline did not settle within {:?}", LONG_TIMEOUT);
    }

    let pipeline = app.state().view().pipeline;
    if let Some(reason) = pipeline.start_error {
        bail!("pipeline could not start: {reason}");
    }
    match pipeline.phase {
        PipelinePhase::Failed => bail!("pipeline failed: {}", pipeline.message),
        PipelinePhase::Completed => match (pipeline.download_url, download_dir) {
            (Some(reference), Some(dir)) => download(app, &reference, dir),
            _ => Ok(()),
        },
        _ if pipeline.status_unknown => bail!("pipeline status is unknown"),
        _ => Ok(()),
    }
}

fn download(app: &mut App, reference: &str, dir: PathBuf) -> anyhow::Result<()> {
    app.download(reference, dir);
    match app.wait_for_download(reference, LONG_TIMEOUT) {
        Some(Ok(path)) => {
            println!("Saved {}", path.display());
            Ok(())
        }
        Some(Err(reason)) => bail!("download of {reference} failed: {reason}"),
        None => bail!("download of {reference} did not finish"),
    }
}

/// Prints notices raised since the last call; true if any reported an error.
fn print_notices(app: &mut App) -> bool {
    let mut failed = false;
    for notice in app.take_new_notices() {
        failed |= notice.level == NoticeLevel::Danger;
        println!("{}", render::render_notice(&notice));
    }
    failed
}

fn latest_notice_id(app: &App) -> Option<u64> {
    app.state().notices().last().map(|n| n.id)
}
