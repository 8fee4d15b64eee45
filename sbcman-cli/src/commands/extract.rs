//! Extract command - validated archive extraction.

use std::path::PathBuf;

use clap::Args;
use console::style;
use sbcman::config::ConfigFile;
use sbcman::manager::extractor::Verdict;
use sbcman::manager::ArchiveExtractor;

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Archive to extract (.zip, .whl, .tar, .tar.gz, .tgz, .tar.bz2, .tar.xz)
    pub archive: PathBuf,

    /// Destination directory
    #[arg(required_unless_present = "list")]
    pub dest: Option<PathBuf>,

    /// Only list members and their verdicts, writing nothing
    #[arg(long)]
    pub list: bool,
}

pub fn run(args: ExtractArgs, config: &ConfigFile) -> Result<(), CliError> {
    let extractor = ArchiveExtractor::new(config.limits);

    if args.list {
        for (member, verdict) in extractor.inspect(&args.archive)? {
            match verdict {
                Verdict::Accept => println!(
                    "  {} {:>10}  {}",
                    style("ok").green(),
                    member.size,
                    member.path
                ),
                Verdict::Reject(reason) => println!(
                    "  {} {:>10}  {} ({})",
                    style("skip").yellow(),
                    member.size,
                    member.path,
                    reason
                ),
            }
        }
        return Ok(());
    }

    let dest = args
        .dest
        .ok_or_else(|| CliError::Usage("Destination directory required".to_string()))?;
    let report = extractor.extract(&args.archive, &dest)?;

    println!(
        "{} Extracted {} files ({} bytes) to {}",
        style("✓").green().bold(),
        report.files_written,
        report.bytes_written,
        dest.display()
    );
    if !report.rejected.is_empty() {
        println!(
            "{} Skipped {} unsafe members:",
            style("!").yellow().bold(),
            report.rejected.len()
        );
        for (member, reason) in &report.rejected {
            println!("    {} ({})", member.path, reason);
        }
    }
    Ok(())
}
