// src/monitor.rs

//! Observers that render a state tree's events.
//!
//! Attach one of these to a root [`State`] and drive the tree as usual;
//! every percentage/activity/cancellability transition is rendered as it
//! fires. `LogMonitor` writes structured log lines for non-interactive
//! environments, `BarMonitor` draws an indicatif progress bar for the CLI.
//! Both return a guard that disconnects their listeners when dropped.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::state::{HandlerId, State};

/// Disconnects the listeners it registered when dropped.
pub struct MonitorGuard {
    disconnects: Vec<Box<dyn FnOnce()>>,
}

impl MonitorGuard {
    fn new() -> Self {
        Self {
            disconnects: Vec::new(),
        }
    }

    fn defer(&mut self, disconnect: impl FnOnce() + 'static) {
        self.disconnects.push(Box::new(disconnect));
    }
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        for disconnect in self.disconnects.drain(..) {
            disconnect();
        }
    }
}

fn defer_disconnect(
    guard: &mut MonitorGuard,
    state: &State,
    id: HandlerId,
    disconnect: impl Fn(&State, HandlerId) + 'static,
) {
    let state = state.clone();
    guard.defer(move || disconnect(&state, id));
}

/// Renders events through `tracing`, for logs and scripted runs.
pub struct LogMonitor;

impl LogMonitor {
    /// Attach to `state`; rendering stops when the guard is dropped.
    pub fn attach(state: &State) -> MonitorGuard {
        let mut guard = MonitorGuard::new();

        let id = state.connect_percentage_changed(|pct| info!("progress: {pct}%"));
        defer_disconnect(&mut guard, state, id, State::disconnect_percentage_changed);

        let id = state.connect_subpercentage_changed(|pct| debug!("subprogress: {pct}%"));
        defer_disconnect(&mut guard, state, id, State::disconnect_subpercentage_changed);

        let id = state.connect_allow_cancel_changed(|allow| {
            debug!("cancellable: {}", if allow { "yes" } else { "no" });
        });
        defer_disconnect(&mut guard, state, id, State::disconnect_allow_cancel_changed);

        let id = state.connect_action_changed(|change| match (&change.action, &change.hint) {
            (Some(action), Some(hint)) => info!("{action}: {hint}"),
            (Some(action), None) => info!("{action}"),
            (None, _) => debug!("activity finished"),
        });
        defer_disconnect(&mut guard, state, id, State::disconnect_action_changed);

        let id = state.connect_speed_changed(|speed| debug!("throughput: {speed} B/s"));
        defer_disconnect(&mut guard, state, id, State::disconnect_speed_changed);

        let id = state.connect_package_progress_changed(|progress| {
            info!(
                "{}: {} {}%",
                progress.package_id, progress.action, progress.percentage
            );
        });
        defer_disconnect(&mut guard, state, id, State::disconnect_package_progress_changed);

        guard
    }
}

/// Renders an interactive console progress bar.
pub struct BarMonitor {
    bar: ProgressBar,
    _guard: MonitorGuard,
}

impl BarMonitor {
    /// Attach a 0-100 bar to `state`.
    pub fn attach(state: &State) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:>14.green} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );

        let mut guard = MonitorGuard::new();

        let id = state.connect_percentage_changed({
            let bar = bar.clone();
            move |pct| bar.set_position(pct as u64)
        });
        defer_disconnect(&mut guard, state, id, State::disconnect_percentage_changed);

        let id = state.connect_action_changed({
            let bar = bar.clone();
            move |change| match (&change.action, &change.hint) {
                (Some(action), Some(hint)) => {
                    bar.set_prefix(action.to_string());
                    bar.set_message(hint.clone());
                }
                (Some(action), None) => {
                    bar.set_prefix(action.to_string());
                    bar.set_message("");
                }
                (None, _) => {
                    bar.set_prefix("");
                    bar.set_message("");
                }
            }
        });
        defer_disconnect(&mut guard, state, id, State::disconnect_action_changed);

        let id = state.connect_allow_cancel_changed({
            let bar = bar.clone();
            move |allow| {
                if allow {
                    bar.set_message("");
                } else {
                    bar.set_message("(cannot be interrupted)");
                }
            }
        });
        defer_disconnect(&mut guard, state, id, State::disconnect_allow_cancel_changed);

        Self {
            bar,
            _guard: guard,
        }
    }

    /// Finish and clear the bar, e.g. before printing results.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Action;

    #[test]
    fn test_log_monitor_attach_detach() {
        let state = State::new();
        let guard = LogMonitor::attach(&state);

        state.set_number_of_steps(2).unwrap();
        state.action_start(Action::Downloading, Some("primary.xml.gz"));
        state.done().unwrap();

        drop(guard);
        state.done().unwrap();
        assert_eq!(state.percentage(), 100);
    }

    #[test]
    fn test_bar_monitor_tracks_percentage() {
        let state = State::new();
        let monitor = BarMonitor::attach(&state);

        state.set_number_of_steps(4).unwrap();
        state.done().unwrap();
        state.done().unwrap();
        assert_eq!(monitor.bar.position(), 50);

        state.finished().unwrap();
        assert_eq!(monitor.bar.position(), 100);
        monitor.finish();
    }
}
