use crate::monitor::Sample;
use anyhow::Result;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Line-oriented destination for monitor samples and summary lines.
pub enum OutputWriter {
    /// Each row is encoded in memory, then written and flushed to `file`.
    Csv {
        file: BufWriter<File>,
        header_written: bool,
    },
    Stdout,
    /// Keeps every line in memory.
    Buffer(Vec<String>),
}

impl OutputWriter {
    pub async fn new_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = File::create(path).await?;
        println!("Writing CSV output to: {}", path.display());
        Ok(Self::Csv {
            file: BufWriter::new(file),
            header_written: false,
        })
    }

    pub fn new_stdout() -> Self {
        Self::Stdout
    }

    pub fn new_buffer() -> Self {
        Self::Buffer(Vec::new())
    }

    pub async fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        match self {
            Self::Csv {
                file,
                header_written,
            } => {
                let mut row = csv::WriterBuilder::new()
                    .has_headers(!*header_written)
                    .from_writer(Vec::new());
                row.serialize(sample)?;
                let encoded = row.into_inner().map_err(|e| e.into_error())?;
                file.write_all(&encoded).await?;
                // Flush so external tail/readers see progress promptly
                file.flush().await?;
                *header_written = true;
            }
            Self::Stdout => println!("{}", sample.status_line()),
            Self::Buffer(lines) => lines.push(sample.status_line()),
        }
        Ok(())
    }

    /// Free-form text such as the run summary. CSV output keeps samples only,
    /// so these go to stdout instead.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        match self {
            Self::Csv { .. } | Self::Stdout => println!("{line}"),
            Self::Buffer(lines) => lines.push(line.to_string()),
        }
        Ok(())
    }

    pub fn lines(&self) -> &[String] {
        match self {
            Self::Buffer(lines) => lines.as_slice(),
            _ => &[],
        }
    }
}
