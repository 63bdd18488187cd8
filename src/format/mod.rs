use crate::format::ogm::Page;
use crate::{OgmError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub mod ogm;

/// Destination for the pages a multiplexer decides to write
pub trait PageSink {
    /// Write one complete page
    fn write_page(&mut self, page: &Page) -> Result<()>;

    /// Flush any buffered bytes
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: PageSink + ?Sized> PageSink for Box<T> {
    fn write_page(&mut self, page: &Page) -> Result<()> {
        (**self).write_page(page)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Writes pages to any [`Write`] implementation.
#[derive(Debug)]
pub struct WriteSink<W: Write> {
    inner: W,
    path: Option<PathBuf>,
}

impl<W: Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, path: None }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn wrap(&self, e: std::io::Error) -> OgmError {
        match &self.path {
            Some(path) => OgmError::file(path, e),
            None => OgmError::Io(e),
        }
    }
}

impl WriteSink<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| OgmError::file(path, e))?;
        Ok(Self {
            inner: BufWriter::new(file),
            path: Some(path.to_path_buf()),
        })
    }
}

impl<W: Write> PageSink for WriteSink<W> {
    fn write_page(&mut self, page: &Page) -> Result<()> {
        self.inner.write_all(&page.data).map_err(|e| self.wrap(e))
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(|e| self.wrap(e))
    }
}

pub mod tests {
    use super::*;

    /// A sink keeping every page in memory
    #[derive(Debug, Default)]
    pub struct MemorySink {
        pub pages: Vec<Page>,
        pub flushes: usize,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// All written pages as one byte stream.
        pub fn bytes(&self) -> Vec<u8> {
            self.pages
                .iter()
                .flat_map(|page| page.data.iter().copied())
                .collect()
        }
    }

    impl PageSink for MemorySink {
        fn write_page(&mut self, page: &Page) -> Result<()> {
            self.pages.push(page.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }
}
