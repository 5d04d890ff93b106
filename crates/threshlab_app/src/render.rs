//! Plain-text rendering of the view model, one section per tab.
use std::fmt::Write;

use chrono::{DateTime, Utc};
use threshlab_core::{
    AppViewModel, Bootstrap, Notice, NoticeLevel, PipelinePhase, PipelineView, Tab,
    UploadControlView,
};
use threshlab_engine::{resolve_reference, Url};

pub fn render(view: &AppViewModel, base_url: Option<&Url>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", header(view));
    match view.active_tab {
        Tab::Training => {
            for control in &view.uploads {
                out.push_str(&render_upload(control, base_url));
            }
            out.push_str(&render_pipeline(&view.pipeline, base_url));
        }
        Tab::AdvancedSettings => out.push_str(&render_settings(view)),
        Tab::Metrics => out.push_str(&render_metrics(view)),
    }
    out
}

fn header(view: &AppViewModel) -> String {
    let session = match (&view.session_id, &view.bootstrap) {
        (Some(id), _) => id.clone(),
        (None, Bootstrap::Failed(reason)) => format!("unavailable ({reason})"),
        (None, _) => "starting...".to_string(),
    };
    let mut line = format!("Session {session}");
    if view.keep_fresh {
        line.push_str(" [keep fresh]");
    }
    if let Some(err) = &view.refresh_error {
        let _ = write!(line, " (last refresh failed: {err})");
    }
    line
}

pub fn render_upload(control: &UploadControlView, base_url: Option<&Url>) -> String {
    let mut out = String::new();
    let state = if control.busy { " (uploading)" } else { "" };
    let _ = writeln!(out, "{}{}", control.title, state);
    if control.thumbnails.is_empty() {
        let _ = writeln!(out, "  no files");
    }
    for reference in &control.thumbnails {
        let _ = writeln!(out, "  preview {}", display_reference(reference, base_url));
    }
    for file in &control.files {
        let status = if file.failed {
            "failed".to_string()
        } else {
            format!("{:>3}%", file.percent)
        };
        let _ = writeln!(out, "  {} {}", file.name, status);
    }
    out
}

pub fn render_pipeline(pipeline: &PipelineView, base_url: Option<&Url>) -> String {
    let mut out = String::new();
    let job = pipeline.job_label.as_deref().unwrap_or("-");
    let phase = if pipeline.status_unknown {
        format!("{} (status unknown)", pipeline.phase)
    } else {
        pipeline.phase.to_string()
    };
    let _ = writeln!(out, "Pipeline job {job}: {phase}");
    if !pipeline.message.is_empty() {
        let _ = writeln!(out, "  {}", pipeline.message);
    }
    if let Some(started) = pipeline.start_time.and_then(format_epoch) {
        let _ = writeln!(out, "  started {started}");
    }
    if let Some(duration) = pipeline.duration_seconds {
        let _ = writeln!(out, "  took {duration:.1}s");
    }
    if let Some(err) = &pipeline.poll_error {
        let _ = writeln!(out, "  status check failed: {err}");
    }
    if let Some(err) = &pipeline.start_error {
        let _ = writeln!(out, "  could not start: {err}");
    }
    if let Some(reference) = &pipeline.download_url {
        let _ = writeln!(out, "  download {}", display_reference(reference, base_url));
    }
    if pipeline.phase == PipelinePhase::CompletedNoOutput {
        let _ = writeln!(out, "  no output was produced");
    }
    out
}

fn render_settings(view: &AppViewModel) -> String {
    let mut out = String::from("Pipeline processes\n");
    for (process, enabled) in &view.processes {
        let mark = if *enabled { "x" } else { " " };
        let _ = writeln!(out, "  [{mark}] {process}");
    }
    out.push_str("Thresholds\n");
    for row in &view.thresholds {
        let _ = writeln!(out, "  {}: {}", row.name, row.value);
    }
    out
}

fn render_metrics(view: &AppViewModel) -> String {
    if view.metrics_loading {
        return "Metrics loading...\n".to_string();
    }
    let m = view.metrics;
    format!(
        "Processed frames    {}\nDetected objects    {}\nPattern matches     {}\nSolid color frames  {}\n",
        m.processed_frames, m.detected_objects, m.pattern_matches, m.solid_color_frames
    )
}

pub fn render_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Danger => "error",
    };
    format!("[{tag}] {}", notice.text)
}

fn display_reference(reference: &str, base_url: Option<&Url>) -> String {
    base_url
        .and_then(|base| resolve_reference(base, reference).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| reference.to_string())
}

fn format_epoch(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    let secs = seconds.floor() as i64;
    let nanos = ((seconds - seconds.floor()) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}
