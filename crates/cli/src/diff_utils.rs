//! Terminal rendering of patches and diff stats

use cw_snapshot::{DiffSummary, FileStatus};
use owo_colors::OwoColorize;

/// Color a unified patch line by line
///
/// File headers are bold, hunk headers cyan, additions green and deletions
/// red; context lines are left alone.
pub fn colorize_patch(patch: &str) -> String {
    let mut output = String::with_capacity(patch.len());
    for line in patch.lines() {
        let styled = if line.starts_with("diff ")
            || line.starts_with("+++ ")
            || line.starts_with("--- ")
        {
            line.bold().to_string()
        } else if line.starts_with("@@") {
            line.cyan().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with("Binary files") {
            line.dimmed().to_string()
        } else {
            line.to_string()
        };
        output.push_str(&styled);
        output.push('\n');
    }
    output
}

/// One line per file: status marker, path and +/- counts
pub fn render_stat(summary: &DiffSummary) -> String {
    let mut output = String::new();
    for file in &summary.files {
        let marker = match file.status {
            FileStatus::Added => "A".green().to_string(),
            FileStatus::Removed => "D".red().to_string(),
            FileStatus::Modified => "M".yellow().to_string(),
        };
        let counts = if file.binary {
            "binary".dimmed().to_string()
        } else {
            format!(
                "{} {}",
                format!("+{}", file.insertions).green(),
                format!("-{}", file.deletions).red()
            )
        };
        output.push_str(&format!("  {} {}  {}\n", marker, file.path, counts));
    }
    output.push_str(&format!("  {}\n", summary.to_string().dimmed()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_snapshot::FileStat;

    fn strip_ansi(text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\u{1b}' {
                for next in chars.by_ref() {
                    if next == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_colorize_keeps_text() {
        let patch = "diff a/1.osu b/1.osu\n--- a/1.osu\n+++ b/1.osu\n@@ -1 +1 @@\n-old\n+new\n";
        let colored = colorize_patch(patch);
        assert_eq!(strip_ansi(&colored), patch);
        assert!(colored.contains("\u{1b}["));
    }

    #[test]
    fn test_render_stat() {
        let summary = DiffSummary {
            files: vec![
                FileStat {
                    path: "1.osu".to_string(),
                    status: FileStatus::Modified,
                    insertions: 3,
                    deletions: 1,
                    binary: false,
                },
                FileStat {
                    path: "bg.jpg".to_string(),
                    status: FileStatus::Added,
                    insertions: 0,
                    deletions: 0,
                    binary: true,
                },
            ],
        };

        let plain = strip_ansi(&render_stat(&summary));
        assert!(plain.contains("M 1.osu  +3 -1"));
        assert!(plain.contains("A bg.jpg  binary"));
        assert!(plain.contains("2 files changed"));
    }
}
