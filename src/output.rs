use crate::error::QdbError;
use std::io::Write;
use std::path::Path;

/// Print a rendered result to stdout.
///
/// A closed pipe comes back as an `Io` error with `BrokenPipe`, which `main`
/// treats as a quiet stop.
pub fn print_result(text: &str) -> Result<(), QdbError> {
    write_result(&mut std::io::stdout().lock(), text)
}

/// Write and flush `text`.
pub fn write_result<W: Write>(out: &mut W, text: &str) -> Result<(), QdbError> {
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &QdbError) {
    eprintln!("error: {}", err);
}

/// Per-statement error block for multi-statement `exec`.
pub fn statement_error_block(index: usize, err: &QdbError, statement: &str) -> String {
    format!(
        "-- Statement {} Error --\nError: {}\nQuery: {}\n",
        index, err, statement
    )
}

pub fn print_statement_error(index: usize, err: &QdbError, statement: &str) -> Result<(), QdbError> {
    print_result(&statement_error_block(index, err, statement))
}

/// Create or truncate `path` for writing. The parent directory must exist.
pub fn create_file(path: &Path) -> Result<std::io::BufWriter<std::fs::File>, QdbError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(QdbError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("parent directory does not exist: {}", parent.display()),
        )));
    }
    Ok(std::io::BufWriter::new(std::fs::File::create(path)?))
}

/// Write text to a file.
pub fn write_file(text: &str, path: &Path) -> Result<(), QdbError> {
    let mut file = create_file(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Passes bytes through and remembers whether the last one was a newline.
pub struct TrailingNewline<W: Write> {
    inner: W,
    last: Option<u8>,
}

impl<W: Write> TrailingNewline<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, last: None }
    }

    /// Terminate non-empty output with `\n` and flush.
    pub fn finish(mut self) -> std::io::Result<W> {
        if matches!(self.last, Some(b) if b != b'\n') {
            self.inner.write_all(b"\n")?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for TrailingNewline<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n > 0 {
            self.last = Some(buf[n - 1]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
