use crate::model::{DiskOutcome, Summary, SweepReport};

pub fn render_markdown_summary(report: &SweepReport) -> String {
    let mut out = String::new();
    out.push_str("# Disk Sweep Summary\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Run id: `{}`\n- Mode: `{}`\n- Started at: `{}`\n- Finished at: `{}`\n- Interrupted: `{}`\n\n",
        report.report_version,
        report.run_id,
        report.mode,
        report.started_at,
        report.finished_at,
        report.interrupted
    ));

    out.push_str("## Disks\n\n");
    if report.disks.is_empty() {
        out.push_str("No external disks were checked.\n\n");
    } else {
        for disk in &report.disks {
            out.push_str(&format!(
                "- `{}` (`{}`): {}",
                disk.disk,
                disk.filesystem.as_deref().unwrap_or("unknown"),
                outcome_label(disk.outcome)
            ));
            if disk.remount_failed {
                out.push_str(" - remount failed");
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !report.left_unmounted.is_empty() {
        out.push_str("## Left Unmounted\n\n");
        for disk in &report.left_unmounted {
            out.push_str(&format!("- `{disk}`: remount manually\n"));
        }
        out.push('\n');
    }

    out.push_str("## Recommendation\n\n");
    out.push_str(&format!(
        "{} ({} error(s) logged).\n",
        capitalize(report.summary.recommendation()),
        report.error_count
    ));
    if report.summary == Summary::ManualReviewRequired {
        out.push_str("\nReview the error log and take appropriate actions.\n");
    }

    out
}

fn outcome_label(outcome: DiskOutcome) -> &'static str {
    match outcome {
        DiskOutcome::Verified => "verified",
        DiskOutcome::Repaired => "repaired",
        DiskOutcome::ManualIntervention => "repair failed, manual intervention required",
        DiskOutcome::SkippedUnknownFilesystem => "skipped, filesystem type unknown",
        DiskOutcome::SkippedUnsupportedFilesystem => "skipped, filesystem type unsupported",
        DiskOutcome::SkippedUnmountFailed => "skipped, unmount failed",
        DiskOutcome::Simulated => "dry run",
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
