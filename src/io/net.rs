use crate::{error::Result, io::progress::emit_download_progress};
use anyhow::Context;
use reqwest::blocking::Client;
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
    time::Duration,
};
use tracing::debug;

pub fn http_client() -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60 * 60))
        .build()
        .context("reqwest client build failed")?;
    Ok(client)
}

/// Counts bytes on their way to disk and reports them.
struct ProgressWriter<W> {
    inner: W,
    written: u64,
    total: u64,
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        emit_download_progress(self.written, self.total);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Stream `url` into `dest` through a `.part` file, reporting byte progress.
pub fn download_with_progress(client: &Client, url: &str, dest: &Path) -> Result<()> {
    let tmp = dest.with_extension("part");

    let mut resp = client.get(url).send()?.error_for_status()?;
    let total = resp.content_length().unwrap_or(0);
    debug!(url, total, "download started");
    emit_download_progress(0, total);

    let mut out = ProgressWriter {
        inner: BufWriter::with_capacity(64 * 1024, File::create(&tmp)?),
        written: 0,
        total,
    };
    io::copy(&mut resp, &mut out)?;
    out.flush()?;
    let written = out.written;
    drop(out);

    if dest.exists() {
        fs::remove_file(dest).ok();
    }
    fs::rename(&tmp, dest)?;

    debug!(url, written, dest = %dest.display(), "download finished");
    emit_download_progress(total.max(written), total.max(written));
    Ok(())
}
