//! Conversion through an external `pandoc` process.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use docx_from_html::ImageData;
use tokio::process::Command;

use crate::error::ServiceError;

const INPUT_NAME: &str = "input.html";
const OUTPUT_NAME: &str = "output.docx";
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Pandoc {
    pub binary: PathBuf,
    pub timeout: Duration,
    pub reference_doc: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PandocOptions<'a> {
    pub title: Option<&'a str>,
    pub toc: bool,
    pub cover: Option<&'a ImageData>,
}

fn spawn_error(binary: &Path, e: io::Error) -> ServiceError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            ServiceError::PandocUnavailable(format!("{}: {e}", binary.display()))
        }
        _ => ServiceError::Io(e),
    }
}

impl Pandoc {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            reference_doc: None,
        }
    }

    /// Command line for a job whose files live in `dir`.
    pub fn args(&self, opts: &PandocOptions<'_>, dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [INPUT_NAME, "-f", "html", "-t", "docx", "-o", OUTPUT_NAME]
            .into_iter()
            .map(OsString::from)
            .collect();
        if opts.toc {
            args.push("--toc".into());
        }
        if let Some(title) = opts.title.map(str::trim).filter(|t| !t.is_empty()) {
            args.push("--metadata".into());
            args.push(format!("title={title}").into());
        }
        if let Some(reference) = &self.reference_doc {
            args.push("--reference-doc".into());
            args.push(reference.as_os_str().to_owned());
        }
        args.push("--resource-path".into());
        args.push(dir.as_os_str().to_owned());
        args
    }

    pub async fn html_to_docx(
        &self,
        html: &str,
        opts: &PandocOptions<'_>,
    ) -> Result<Vec<u8>, ServiceError> {
        let dir = tempfile::tempdir()?;

        let mut document = String::new();
        if let Some(cover) = opts.cover {
            let name = format!("cover.{}", cover.extension());
            tokio::fs::write(dir.path().join(&name), &cover.bytes).await?;
            document.push_str(&format!("<p><img src=\"{name}\" alt=\"cover\"/></p>\n"));
            document.push_str("<p style=\"page-break-after: always\"></p>\n");
        }
        document.push_str(html);
        tokio::fs::write(dir.path().join(INPUT_NAME), document).await?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args(opts, dir.path()))
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(binary = %self.binary.display(), dir = %dir.path().display(), "running pandoc");
        let child = cmd.spawn().map_err(|e| spawn_error(&self.binary, e))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(ServiceError::Timeout(self.timeout)),
        };
        if !output.status.success() {
            return Err(ServiceError::Pandoc {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let bytes = tokio::fs::read(dir.path().join(OUTPUT_NAME)).await?;
        tracing::debug!(bytes = bytes.len(), "pandoc finished");
        Ok(bytes)
    }

    /// First line of `pandoc --version`, or `None` when pandoc cannot be run.
    pub async fn version(&self) -> Option<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let output = match tokio::time::timeout(VERSION_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(_)) => return None,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "pandoc --version failed");
                return None;
            }
            Err(_) => return None,
        };
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn minimal_arguments() {
        let pandoc = Pandoc::new("pandoc", Duration::from_secs(1));
        let args = strings(pandoc.args(&PandocOptions::default(), Path::new("/tmp/job")));
        assert_eq!(
            args,
            [
                "input.html",
                "-f",
                "html",
                "-t",
                "docx",
                "-o",
                "output.docx",
                "--resource-path",
                "/tmp/job"
            ]
        );
    }

    #[test]
    fn optional_arguments() {
        let mut pandoc = Pandoc::new("pandoc", Duration::from_secs(1));
        pandoc.reference_doc = Some(PathBuf::from("/srv/ref.docx"));
        let opts = PandocOptions {
            title: Some("Quarterly"),
            toc: true,
            cover: None,
        };
        let args = strings(pandoc.args(&opts, Path::new("/tmp/job")));
        assert!(args.contains(&"--toc".to_string()));
        let title = args.iter().position(|a| a == "--metadata").unwrap();
        assert_eq!(args[title + 1], "title=Quarterly");
        let reference = args.iter().position(|a| a == "--reference-doc").unwrap();
        assert_eq!(args[reference + 1], "/srv/ref.docx");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let pandoc = Pandoc::new("/nonexistent/pandoc-binary", Duration::from_secs(5));
        let err = pandoc
            .html_to_docx("<p>x</p>", &PandocOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PandocUnavailable(_)), "{err}");
        assert_eq!(pandoc.version().await, None);
    }
}
