use crate::progress::Progress;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;

type StatusCallback = Box<dyn Fn() -> (u64, u64, String) + Send + Sync>;

/// Redraw period of the background task.
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

const BAR_TEMPLATE: &str = "{prefix:>12.bold.cyan} [{bar:25}] {msg}";
const BAR_TEMPLATE_NO_COLOR: &str = "{prefix:>12} [{bar:25}] {msg}";

#[derive(Debug)]
struct Visibility {
    shown_after: Instant,
    shown: AtomicBool,
}

/// A progress bar on stderr that stays hidden for short runs.
///
/// Nothing is drawn until `delay` has elapsed. A background task then polls the
/// status callback installed by [`Progress::set_determinate`] and redraws the bar.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    visibility: Arc<Visibility>,
    status: Arc<Mutex<StatusCallback>>,
    refresh: Arc<JoinHandle<()>>,
    use_colors: bool,
}

impl ProgressReporter {
    /// Create a reporter that becomes visible once `delay` has passed. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());

        let visibility = Arc::new(Visibility {
            shown_after: Instant::now() + delay,
            shown: AtomicBool::new(false),
        });

        let status: Arc<Mutex<StatusCallback>> = Arc::new(Mutex::new(Box::new(|| (0, 0, String::new()))));
        let refresh = tokio::spawn(refresh(bar.clone(), Arc::clone(&visibility), Arc::clone(&status)));

        Self {
            bar,
            visibility,
            status,
            refresh: Arc::new(refresh),
            use_colors,
        }
    }

    fn bar_style(&self) -> ProgressStyle {
        let template = if self.use_colors { BAR_TEMPLATE } else { BAR_TEMPLATE_NO_COLOR };
        let base = ProgressStyle::default_bar().progress_chars("=> ");
        base.clone().template(template).unwrap_or(base)
    }
}

impl Progress for ProgressReporter {
    fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
    }

    fn set_determinate(&self, callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = callback;
        self.bar.set_length(0);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style());
    }

    fn println(&self, msg: &str) {
        self.bar.suspend(|| eprintln!("{msg}"));
    }

    fn done(&self) {
        self.refresh.abort();
        if self.visibility.shown.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }

    fn use_colors(&self) -> bool {
        self.use_colors
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("visibility", &self.visibility)
            .field("status", &"<callback>")
            .field("use_colors", &self.use_colors)
            .finish_non_exhaustive()
    }
}

async fn refresh(bar: ProgressBar, visibility: Arc<Visibility>, status: Arc<Mutex<StatusCallback>>) {
    let mut interval = tokio::time::interval(REFRESH_INTERVAL);

    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !visibility.shown.load(Ordering::Relaxed) {
            if Instant::now() < visibility.shown_after {
                continue;
            }
            visibility.shown.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        let (length, position, message) = (status.lock().unwrap_or_else(PoisonError::into_inner))();

        if length > 0 {
            bar.set_length(length);
            bar.set_position(position);
        }
        bar.set_message(message);
    }
}
