use super::{RasterDiag, Rasterizer};
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PAGE_PREFIX: &str = "page";

/// Shells out to poppler's `pdftoppm`.
pub struct PopplerRasterizer {
    exe: PathBuf,
    timeout: Option<Duration>,
    keep_stderr: bool,
}

impl PopplerRasterizer {
    pub fn new(cfg: &Config) -> Self {
        let timeout = (cfg.raster.timeout_seconds > 0)
            .then(|| Duration::from_secs(cfg.raster.timeout_seconds));
        Self {
            exe: resolve_exe(&cfg.raster.pdftoppm_exe),
            timeout,
            keep_stderr: cfg.debug.keep_rasterizer_stderr,
        }
    }

    fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        debug!("pdftoppm run {:?} timeout={:?}", args, self.timeout);
        let mut cmd = Command::new(&self.exe);
        cmd.args(&args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", self.exe.display()))?;

        let output = match self.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout)?,
            None => child
                .wait_with_output()
                .with_context(|| "waiting for pdftoppm")?,
        };

        if self.keep_stderr && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("pdftoppm stderr: {}", stderr.trim());
        }
        Ok(output)
    }
}

fn resolve_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(bin) = std::env::var("POPPLER_BIN") {
            return PathBuf::from(bin);
        }
        return PathBuf::from("pdftoppm");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

impl Rasterizer for PopplerRasterizer {
    fn diagnose(&self) -> Result<RasterDiag> {
        let exe = self.exe.display().to_string();
        let output = match self.run(["-v"]) {
            Ok(o) => o,
            Err(err) => {
                return Ok(RasterDiag {
                    exe,
                    version: None,
                    ok: false,
                    error: Some(format!("{err:#}")),
                });
            }
        };
        // pdftoppm prints its version banner on stderr.
        let banner = String::from_utf8_lossy(&output.stderr);
        let version = banner
            .lines()
            .find(|l| l.to_ascii_lowercase().contains("version"))
            .map(|l| l.trim().to_string());
        Ok(RasterDiag {
            exe,
            ok: version.is_some(),
            version,
            error: None,
        })
    }

    fn rasterize(&self, pdf: &Path, dpi: u32, work_dir: &Path) -> Result<Vec<RgbImage>> {
        let dpi_arg = dpi.to_string();
        let prefix = work_dir.join(PAGE_PREFIX);
        let output = self.run([
            OsStr::new("-r"),
            OsStr::new(&dpi_arg),
            OsStr::new("-png"),
            pdf.as_os_str(),
            prefix.as_os_str(),
        ])?;

        if !output.status.success() {
            return Err(anyhow!(
                "pdftoppm failed on {}: {}",
                pdf.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let pages = collect_pages(work_dir)?;
        if pages.is_empty() {
            return Err(anyhow!("pdftoppm produced no pages for {}", pdf.display()));
        }

        pages
            .iter()
            .map(|(_, path)| {
                image::open(path)
                    .map(|img| img.to_rgb8())
                    .with_context(|| format!("decoding {}", path.display()))
            })
            .collect()
    }
}

/// `page-1.png`, `page-01.png`, ... sorted by page number.
fn collect_pages(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let page = stem
            .strip_prefix(PAGE_PREFIX)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(page) = page {
            pages.push((page, path));
        }
    }
    pages.sort_by_key(|(page, _)| *page);
    Ok(pages)
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain pipes while waiting so a chatty child can't block on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf).with_context(|| "read stdout")?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf).with_context(|| "read stderr")?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| anyhow!("stdout reader thread panicked"))??;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("pdftoppm timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            let _ = stdout_thread.join();
            return Err(anyhow!(
                "pdftoppm exceeded timeout ({:?}); stderr: {}",
                timeout,
                String::from_utf8_lossy(&stderr)
            ));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "notes.txt", "other-3.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pages: Vec<u32> = collect_pages(dir.path())
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(pages, vec![1, 2, 10]);
    }
}
