use anyhow::Result;
use crossterm::{
    cursor,
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::warn;
use std::io::{stdout, Write};

fn print(prefix: style::StyledContent<&str>, message: &str) {
    let write = || -> Result<()> {
        stdout()
            .queue(style::PrintStyledContent(prefix))?
            .queue(style::Print(format!("{}\n", message)))?
            .flush()?;
        Ok(())
    };

    if let Err(err) = write() {
        warn!("could not write to stdout: {}", err);
    }
}

pub fn info(message: &str) {
    print("INFO: ".cyan().bold(), message);
}

pub fn warning(message: &str) {
    print("WARNING: ".yellow().bold(), message);
}

/// A mutation suppressed by dry-run.
pub fn would(message: &str) {
    print("DRY RUN: ".magenta().bold(), &format!("would {}", message));
}

pub fn failure(message: &str) {
    print("ERROR: ".red().bold(), message);
}

/// A block of `<verb> <container> ...` lines, each marked `done` in place
/// as its action completes. Disabled progress prints nothing.
pub struct Progress {
    lines: usize,
    longest_line: usize,
    enabled: bool,
}

impl Progress {
    pub fn start(lines: &[String], enabled: bool) -> Result<Progress> {
        let longest_line = lines.iter().map(|line| line.len()).max().unwrap_or(0);
        let progress = Progress {
            lines: lines.len(),
            longest_line,
            enabled,
        };
        if !enabled || lines.is_empty() {
            return Ok(progress);
        }

        let mut stdout = stdout();
        for line in lines.iter() {
            stdout.queue(style::Print(line))?;

            let padding = longest_line - line.len() + 1;
            stdout
                .queue(cursor::MoveRight(padding as u16))?
                .queue(style::Print("...\n"))?;
        }
        stdout.flush()?;

        Ok(progress)
    }

    pub fn done(&self, line: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        stdout()
            .queue(cursor::SavePosition)?
            .queue(cursor::MoveToPreviousLine((self.lines - line) as u16))?
            .queue(cursor::MoveRight(self.longest_line as u16 + 5))?
            .queue(style::PrintStyledContent("done".green().bold()))?
            .queue(cursor::RestorePosition)?
            .flush()?;

        Ok(())
    }
}
