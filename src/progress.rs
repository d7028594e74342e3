use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::model::Stats;

pub struct ProgressHelper;

impl ProgressHelper {
  /// Spinner until the first page tells us how many records there are.
  pub fn create(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.blue} {msg}") {
      bar.set_style(style);
    }
    bar.set_message(message);
    bar
  }

  /// Switches to a bar once totals are known and positions it at what the
  /// service already handed out before this run.
  pub fn apply_stats(bar: &ProgressBar, stats: &Stats) {
    let Some(total) = stats.total else { return };
    if bar.length() == Some(total) {
      return;
    }
    if let Ok(style) = ProgressStyle::default_bar()
      .template("{msg} [{bar:40.cyan/blue}] {percent:>3}% ({pos}/{len}) eta {eta}")
    {
      bar.set_style(style.progress_chars("=> "));
    }
    bar.set_length(total);
    bar.set_position(total.saturating_sub(stats.remaining.unwrap_or(total)));
  }
}
