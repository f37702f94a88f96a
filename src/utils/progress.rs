//! Progress reporting for the matching loop, using the indicatif crate.

use indicatif::{ProgressBar, ProgressStyle};

/// Bar template shared by long-running stages
pub const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}) {msg}";

/// Create a progress bar with the standard style and an initial message.
///
/// # Arguments
/// * `length` - Total number of steps
/// * `message` - Initial message shown next to the bar
#[must_use]
pub fn stage_progress_bar(length: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(length);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Finish a progress bar with a completion message.
pub fn finish_progress_bar(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(message.to_string());
}
