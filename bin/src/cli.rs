use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface configuration
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file; the embedded defaults are used when omitted
    #[arg(long, global = true, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log file path, or a directory to place `tether-<pid>.log` in
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the tokens of a file
    Lex {
        file: PathBuf,

        /// Also print the relex checkpoints
        #[arg(long)]
        checkpoints: bool,
    },
    /// Apply edits to a file and print the relex report for each
    Replay {
        file: PathBuf,

        /// `OFFSET:REMOVE:TEXT`; `\n` and `\t` in TEXT are unescaped
        #[arg(long = "edit", value_parser = parse_edit, required = true)]
        edits: Vec<EditSpec>,

        /// Print the final text
        #[arg(long)]
        print: bool,
    },
}

/// One edit given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSpec {
    pub offset: usize,
    pub removed: usize,
    pub text: String,
}

pub fn parse_edit(value: &str) -> Result<EditSpec, String> {
    let mut parts = value.splitn(3, ':');
    let offset = parts.next().unwrap_or_default();
    let removed = parts
        .next()
        .ok_or_else(|| format!("expected OFFSET:REMOVE:TEXT, got {value:?}"))?;
    let text = parts.next().unwrap_or_default();

    Ok(EditSpec {
        offset: offset
            .parse()
            .map_err(|err| format!("invalid offset {offset:?}: {err}"))?,
        removed: removed
            .parse()
            .map_err(|err| format!("invalid removal length {removed:?}: {err}"))?,
        text: unescape(text),
    })
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            },
            None => out.push('\\'),
        }
    }
    out
}
