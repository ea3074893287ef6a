//! Run summary for the terminal

use crate::state::Progress;

/// Formats the outcome of a run
///
/// # Arguments
///
/// * `progress` - Final progress of the run
///
/// # Returns
///
/// A multi-line summary, listing at most `max_failures` failed records
pub fn format_summary(progress: &Progress, max_failures: usize) -> String {
    let mut out = String::new();

    out.push_str("=== Crawl Summary ===\n\n");
    out.push_str(&format!("State: {}\n", progress.state));
    out.push_str(&format!("Total records: {}\n", progress.total));
    out.push_str(&format!("Completed: {}\n", progress.completed));
    out.push_str(&format!("Failed: {}\n", progress.failed));
    out.push_str(&format!(
        "Not processed: {}\n",
        progress.total.saturating_sub(progress.processed())
    ));
    out.push_str(&format!(
        "Success rate: {:.1}% ({} / {})\n",
        progress.success_rate(),
        progress.completed,
        progress.total
    ));
    if let Some(elapsed) = progress.elapsed() {
        out.push_str(&format!("Elapsed: {:.1}s\n", elapsed.as_secs_f64()));
    }

    if !progress.failures.is_empty() {
        out.push_str(&format!("\nFailed records ({}):\n", progress.failures.len()));
        for failure in progress.failures.iter().take(max_failures) {
            out.push_str(&format!(
                "  - {} [{}]: {}\n",
                failure.title, failure.id, failure.reason
            ));
        }
        if progress.failures.len() > max_failures {
            out.push_str(&format!(
                "  ... and {} more\n",
                progress.failures.len() - max_failures
            ));
        }
    }

    out
}

/// Prints the outcome of a run to stdout
pub fn print_summary(progress: &Progress) {
    print!("{}", format_summary(progress, 20));
}
