use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use mapfile::{AccessFlags, MappedBuf, MappedFile, Native, Provider};
use tracing::{debug, error, info};

/// Inspect and edit files through memory mappings.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct ToolCommand {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a mapping of the file at an offset is laid out in pages.
    Info {
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Write a range of the file to stdout.
    Cat {
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Bytes to print, up to the end of the file by default.
        #[arg(long)]
        length: Option<usize>,
    },
    /// Print the numbered lines of the file.
    Lines {
        file: PathBuf,
        /// The byte that ends a line.
        #[arg(long, default_value_t = b'\n')]
        separator: u8,
    },
    /// Write text into the file at an offset, growing or creating it as needed.
    Write {
        file: PathBuf,
        text: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Cut the file off right after the written text.
        #[arg(long)]
        truncate: bool,
    },
    /// Fill anonymous memory with text, shrink it and print what is left.
    Anon {
        text: String,
        #[arg(long)]
        keep: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let ToolCommand { command } = ToolCommand::parse();
    debug!(?command, "running");

    let result = match command {
        Command::Info { file, offset } => info(&file, offset),
        Command::Cat {
            file,
            offset,
            length,
        } => cat(&file, offset, length),
        Command::Lines { file, separator } => lines(&file, separator),
        Command::Write {
            file,
            text,
            offset,
            truncate,
        } => write(&file, &text, offset, truncate),
        Command::Anon { text, keep } => anon(&text, keep),
    };

    if let Err(err) = result {
        error!(%err, "mmap-tool failed");
        process::exit(1);
    }
}

fn info(path: &Path, offset: u64) -> io::Result<()> {
    let size = std::fs::metadata(path)?.len();
    let page = Native::page_size();
    let aligned = Native::align_to_page_size(offset);

    let mut out = io::stdout().lock();
    writeln!(out, "size: {size}")?;
    writeln!(out, "page size: {page}")?;
    writeln!(out, "aligned offset: {aligned}")?;
    writeln!(out, "padding: {}", offset - aligned)?;

    if offset < size {
        let mut file = MappedFile::new();
        file.map(path, AccessFlags::READ_ONLY, None, offset)?;
        writeln!(out, "mapped: {}", file.size())?;
    } else {
        writeln!(out, "mapped: none, offset is past the end")?;
    }

    Ok(())
}

fn cat(path: &Path, offset: u64, length: Option<usize>) -> io::Result<()> {
    let mut file = MappedFile::new();
    file.map(path, AccessFlags::READ_ONLY, length, offset)?;
    file.advise(mapfile::Advice::Sequential).ok();

    io::stdout().lock().write_all(file.as_slice())
}

fn lines(path: &Path, separator: u8) -> io::Result<()> {
    let mut buf: MappedBuf = MappedBuf::default();
    buf.map(path, AccessFlags::READ_ONLY, None, 0)?;

    let mut out = io::stdout().lock();
    let mut number = 0;
    while !buf.is_eof() {
        let line = buf.read_line(separator);
        let line = line.strip_suffix(&[separator]).unwrap_or(line);
        number += 1;

        write!(out, "{number:>6}\t")?;
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }

    Ok(())
}

fn write(path: &Path, text: &str, offset: u64, truncate: bool) -> io::Result<()> {
    let access = if truncate {
        AccessFlags::DEFAULT | AccessFlags::RESIZE
    } else {
        AccessFlags::DEFAULT
    };

    let mut buf: MappedBuf = MappedBuf::default();
    buf.map(path, access, Some(text.len()), offset)?;

    let written = buf.write_view(text);
    buf.flush()?;

    info!(path = %path.display(), offset, written, "wrote text");
    Ok(())
}

fn anon(text: &str, keep: usize) -> io::Result<()> {
    let mut file = MappedFile::new();
    file.anon_map(text.len())?;

    if let Some(bytes) = file.as_mut_slice() {
        bytes.copy_from_slice(text.as_bytes());
    }

    file.resize(keep)?;
    let mut out = io::stdout().lock();
    out.write_all(file.as_slice())?;
    out.write_all(b"\n")
}
