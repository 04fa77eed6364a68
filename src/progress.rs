//! Progress renderer.
//!
//! Consumes the scheduler's (C12) throttled [`ProgressUpdate`] stream and
//! renders one indicatif bar per dispatch bucket to stderr. Grounded on
//! the teacher's `installer/streaming.rs` `MultiProgress` + templated-bar
//! idiom, simplified to one bar per op-type bucket instead of one bar per
//! archive.

use crate::scheduler::ProgressUpdate;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::mpsc::Receiver;

fn bucket_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("=>-")
}

/// Drains `rx` until every scheduler bucket sender is dropped, rendering
/// (and finishing) one bar per bucket name seen. Meant to run on its own
/// consumer thread while the scheduler runs the work (§5, §11).
pub fn render_to_stderr(rx: Receiver<ProgressUpdate>) {
    let mp = MultiProgress::new();
    let style = bucket_style();
    let mut bars: HashMap<&'static str, ProgressBar> = HashMap::new();

    for update in rx.iter() {
        let bar = bars.entry(update.bucket).or_insert_with(|| {
            let bar = mp.add(ProgressBar::new(update.total as u64));
            bar.set_style(style.clone());
            bar.set_message(update.bucket);
            bar
        });
        bar.set_length(update.total as u64);
        bar.set_position(update.completed as u64);
        if update.completed >= update.total {
            bar.finish();
        }
    }
}
