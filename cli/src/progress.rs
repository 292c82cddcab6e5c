use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::utils::LOG_PREFIX_INFO;

/// What the progress bar shows on each refresh.
pub struct ProgressMessage {
    pub position: u64,
    /// Total to reach, when known. May change between refreshes.
    pub length: Option<u64>,
    pub prefix: String,
}

/// A progress bar redrawn from a background thread until `done` is called or it is dropped.
pub struct Progress {
    report_progress_flag: Arc<AtomicBool>,
    progress_thread: Option<thread::JoinHandle<()>>,
}

impl Progress {
    pub fn new<ProgressFnT, StatisticsT>(progress_fn: ProgressFnT, statistics: &Arc<StatisticsT>) -> Self
    where
        ProgressFnT: Fn(&StatisticsT) -> ProgressMessage + Sync + Send + 'static,
        StatisticsT: Sync + Send + 'static,
    {
        let report_progress_flag = Arc::new(AtomicBool::new(true));
        let progress_thread = spawn_progress_thread(
            Arc::clone(statistics),
            progress_fn,
            Arc::clone(&report_progress_flag),
        );

        Progress {
            report_progress_flag,
            progress_thread: Some(progress_thread),
        }
    }

    pub fn done(&mut self) {
        if let Some(handle) = self.progress_thread.take() {
            self.report_progress_flag.store(false, Ordering::SeqCst);
            if handle.join().is_err() {
                log::debug!("Progress thread panicked.");
            }
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.done();
    }
}

fn spawn_progress_thread<StatisticsT, ProgressFnT>(
    statistics: Arc<StatisticsT>,
    progress_fn: ProgressFnT,
    report_progress: Arc<AtomicBool>,
) -> thread::JoinHandle<()>
where
    ProgressFnT: Fn(&StatisticsT) -> ProgressMessage + Sync + Send + 'static,
    StatisticsT: Sync + Send + 'static,
{
    let template = format!(
        "{} {{spinner:.green}} [{{elapsed_precise}}] {{prefix}} {{bar:32.cyan/blue}} {{bytes}} / {{total_bytes}} ({{eta}})",
        LOG_PREFIX_INFO.deref()
    );
    let style = ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(style);

    thread::spawn(move || {
        let sleep_duration = Duration::from_millis(100);

        while report_progress.load(Ordering::SeqCst) {
            thread::sleep(sleep_duration);
            let ProgressMessage {
                position,
                length,
                prefix,
            } = progress_fn(&statistics);
            if let Some(length) = length {
                progress_bar.set_length(length);
            }
            progress_bar.set_position(position);
            progress_bar.set_prefix(prefix);
        }

        progress_bar.finish_and_clear();
        eprint!("\r");
    })
}
