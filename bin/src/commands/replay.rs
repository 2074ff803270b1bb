use crate::cli::EditSpec;
use anyhow::{Context, Result};
use std::{io::Write, path::Path};
use tether_text::{
    syntax::{CLikeTokenizer, RelexOutcome},
    Document, Settings,
};

/// Apply `edits` to `file` one atomic section at a time, reporting each relex.
pub fn run(
    file: &Path,
    edits: &[EditSpec],
    print: bool,
    settings: &Settings,
    out: &mut impl Write,
) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document = Document::new(&source, CLikeTokenizer::default(), settings);

    for (ix, edit) in edits.iter().enumerate() {
        let mut section = document.atomic();
        section
            .edit(edit.offset, edit.removed, &edit.text)
            .with_context(|| format!("Edit {} ({}:{}) failed", ix + 1, edit.offset, edit.removed))?;
        let report = section.commit();

        let outcome = match report.outcome {
            RelexOutcome::Idle => "idle".to_string(),
            RelexOutcome::Matched { at } => format!("matched at {at}"),
            RelexOutcome::Exhausted => "exhausted".to_string(),
        };
        writeln!(
            out,
            "edit {}: {outcome}, rescanned {}..{}, {} tokens, checkpoints +{} ~{} -{}",
            ix + 1,
            report.rescanned.start,
            report.rescanned.end,
            report.tokens_scanned,
            report.checkpoints_added,
            report.checkpoints_updated,
            report.checkpoints_removed,
        )?;
    }

    if print {
        write!(out, "{}", document.read().text())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse_edit;
    use tempfile::tempdir;
    use tether_text::RelexSettings;

    fn dense() -> Settings {
        Settings {
            relex: RelexSettings {
                checkpoint_interval: 1,
                min_checkpoint_distance: 1,
                ..RelexSettings::default()
            },
            ..Settings::default()
        }
    }

    #[test]
    fn reports_reconvergence_after_a_comment() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("main.c");
        std::fs::write(&path, "ab/*c*/d").unwrap();

        let edits = vec![parse_edit("4:0:x").unwrap()];
        let mut out = Vec::new();
        run(&path, &edits, true, &dense(), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("edit 1: matched at 8, rescanned 2..8, 1 tokens"));
        assert!(out.ends_with("ab/*xc*/d"));
    }

    #[test]
    fn failing_edit_names_its_position() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("main.c");
        std::fs::write(&path, "abc").unwrap();

        let edits = vec![parse_edit("2:9:").unwrap()];
        let err = run(&path, &edits, false, &dense(), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("Edit 1 (2:9) failed"));
    }
}
