use std::path::PathBuf;
use std::time::{Duration, Instant};

use lab_logging::lab_debug;
use threshlab_core::{update, AppState, Msg, Notice};

use crate::effects::{EffectRunner, Incoming};

const PUMP_SLICE: Duration = Duration::from_millis(100);

/// Outcome of a finished download.
pub type DownloadResult = Result<PathBuf, String>;

/// Drives the core state machine from engine events.
pub struct App {
    state: AppState,
    effects: EffectRunner,
    last_notice_id: u64,
    downloads: Vec<(String, DownloadResult)>,
}

impl App {
    pub fn new(state: AppState, effects: EffectRunner) -> Self {
        Self {
            state,
            effects,
            last_notice_id: 0,
            downloads: Vec::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.effects.run(effects);
    }

    /// Processes engine events until `done` holds or `timeout` passes.
    /// `on_change` runs after every event that dirtied the state.
    pub fn pump_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&AppState) -> bool,
        mut on_change: impl FnMut(&mut App),
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.state) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                lab_debug!("Gave up waiting after {:?}", timeout);
                return false;
            }
            match self.effects.next(PUMP_SLICE.min(deadline - now)) {
                Some(Incoming::Msg(msg)) => {
                    self.dispatch(msg);
                    if self.state.consume_dirty() {
                        on_change(self);
                    }
                }
                Some(Incoming::Download { reference, result }) => {
                    self.downloads.push((reference, result));
                }
                None => {}
            }
        }
    }

    pub fn download(&mut self, reference: &str, dir: PathBuf) {
        self.effects.download(reference, dir);
    }

    /// Waits for the download of `reference` to finish.
    pub fn wait_for_download(&mut self, reference: &str, timeout: Duration) -> Option<DownloadResult> {
        let finished = |downloads: &[(String, DownloadResult)]| {
            downloads.iter().position(|(r, _)| r == reference)
        };
        let deadline = Instant::now() + timeout;
        while finished(&self.downloads).is_none() && Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.pump_until(remaining.min(PUMP_SLICE), |_| false, |_| {});
        }
        finished(&self.downloads).map(|index| self.downloads.remove(index).1)
    }

    /// Notices raised since the previous call.
    pub fn take_new_notices(&mut self) -> Vec<Notice> {
        let fresh: Vec<Notice> = self
            .state
            .notices()
            .iter()
            .filter(|notice| notice.id > self.last_notice_id)
            .cloned()
            .collect();
        if let Some(last) = fresh.last() {
            self.last_notice_id = last.id;
        }
        fresh
    }

    /// Releases background tasks before the engine goes away.
    pub fn shutdown(&mut self) {
        self.dispatch(Msg::Shutdown);
    }
}
