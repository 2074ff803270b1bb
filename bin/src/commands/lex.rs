use anyhow::{Context, Result};
use std::{io::Write, path::Path};
use tether_text::{syntax::CLikeTokenizer, Document, Settings};

/// Print every token of `file`, optionally followed by the checkpoints.
pub fn run(
    file: &Path,
    checkpoints: bool,
    settings: &Settings,
    out: &mut impl Write,
) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document = Document::new(&source, CLikeTokenizer::default(), settings);
    let read = document.read();

    let tokens = read.tokens(0..read.len())?;
    for token in &tokens {
        let text = read.text().slice(token.range.clone()).to_string();
        writeln!(
            out,
            "{:>6}..{:<6} {:<13} {text:?}",
            token.range.start,
            token.range.end,
            format!("{:?}", token.kind),
        )?;
    }

    if checkpoints {
        writeln!(out, "checkpoints:")?;
        for (offset, checkpoint) in read.checkpoints().iter() {
            let end = if checkpoint.terminal { " (end)" } else { "" };
            writeln!(out, "{offset:>6} {:?}{end}", checkpoint.state)?;
        }
    }

    tracing::info!(file = %file.display(), tokens = tokens.len(), "lexed file");
    Ok(())
}
