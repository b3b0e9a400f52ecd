//! Progress UI (one bar per transfer) fed by the engine's event channel.

use std::collections::HashMap;
use std::time::Duration;

use albumdl_core::download::{ItemId, ProgressEvent, Severity, TransferProgress};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

const BAR_TEMPLATE: &str =
    "{msg:40!} {bar:30.cyan/blue} {bytes}/{total_bytes} {binary_bytes_per_sec} {eta}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:40!} {bytes} {binary_bytes_per_sec}";

/// Spawns the task that renders progress events until every sender is gone.
pub(crate) fn spawn_progress_ui(
    bars: MultiProgress,
    events: UnboundedReceiver<ProgressEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(render_events(bars, events))
}

async fn render_events(bars: MultiProgress, mut events: UnboundedReceiver<ProgressEvent>) {
    let mut active: HashMap<ItemId, ProgressBar> = HashMap::new();

    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::Started { filename, progress } => {
                let bar = bars.add(new_bar(&progress));
                bar.set_message(filename);
                if let Some(old) = active.insert(progress.item_id, bar) {
                    old.finish_and_clear();
                }
            }
            ProgressEvent::Advanced(progress) => {
                if let Some(bar) = active.get(&progress.item_id) {
                    bar.set_position(progress.bytes_done);
                }
            }
            ProgressEvent::Finished { item_id, .. } => {
                if let Some(bar) = active.remove(&item_id) {
                    bar.finish_and_clear();
                    bars.remove(&bar);
                }
            }
            // Warnings and errors already reach the terminal through the log.
            ProgressEvent::Status(status) if status.severity == Severity::Info => {
                let _ = bars.println(status.text);
            }
            ProgressEvent::Status(_) => {}
        }
    }

    for bar in active.into_values() {
        bar.finish_and_clear();
    }
}

fn new_bar(progress: &TransferProgress) -> ProgressBar {
    let bar = match progress.total() {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        }
    };
    bar.set_position(progress.bytes_done);
    bar
}
