use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use docx_from_html::BorderSpec;
use serde::Serialize;

/// Which backend writes the `.docx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// In-process WordprocessingML writer.
    Builtin,
    /// External `pandoc` subprocess.
    Pandoc,
}

impl Engine {
    pub fn parse(s: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(s.trim(), true).ok()
    }
}

fn parse_border_color(s: &str) -> Result<BorderSpec, String> {
    BorderSpec::with_color(s).ok_or_else(|| format!("expected a hex colour like D9D9D9, got {s:?}"))
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Markdown/HTML to DOCX conversion service")]
pub struct Config {
    /// Listen address.
    #[arg(long, env = "DOCX_SERVICE_ADDR", default_value = "0.0.0.0:8000")]
    pub addr: SocketAddr,

    /// Default engine when a request does not choose one.
    #[arg(long, env = "DOCX_SERVICE_ENGINE", value_enum, default_value_t = Engine::Builtin)]
    pub engine: Engine,

    /// Pandoc executable.
    #[arg(long, env = "DOCX_SERVICE_PANDOC", default_value = "pandoc")]
    pub pandoc: PathBuf,

    #[arg(long, env = "DOCX_SERVICE_PANDOC_TIMEOUT_SECS", default_value_t = 60)]
    pub pandoc_timeout_secs: u64,

    /// Passed to pandoc as `--reference-doc`.
    #[arg(long, env = "DOCX_SERVICE_REFERENCE_DOC")]
    pub reference_doc: Option<PathBuf>,

    #[arg(long, env = "DOCX_SERVICE_MAX_BODY_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// When set, every route except `/health` requires a matching `X-API-Key` header.
    #[arg(long, env = "DOCX_SERVICE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Table border colour (hex RGB).
    #[arg(long, env = "DOCX_SERVICE_BORDER_COLOR", default_value = "D9D9D9", value_parser = parse_border_color)]
    pub border_color: BorderSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::try_parse_from(["docx_service"]).unwrap();
        assert_eq!(cfg.pandoc_timeout_secs, 60);
        assert_eq!(cfg.max_body_bytes, 20 * 1024 * 1024);
        assert_eq!(cfg.border_color.color, "D9D9D9");
    }

    #[test]
    fn parses_flags() {
        let cfg = Config::try_parse_from([
            "docx_service",
            "--addr",
            "127.0.0.1:9000",
            "--engine",
            "pandoc",
            "--border-color",
            "#112233",
        ])
        .unwrap();
        assert_eq!(cfg.addr.port(), 9000);
        assert_eq!(cfg.engine, Engine::Pandoc);
        assert_eq!(cfg.border_color.color, "112233");
        assert!(Config::try_parse_from(["docx_service", "--border-color", "blue"]).is_err());
    }

    #[test]
    fn engine_names_are_case_insensitive() {
        assert_eq!(Engine::parse("Pandoc"), Some(Engine::Pandoc));
        assert_eq!(Engine::parse(" builtin "), Some(Engine::Builtin));
        assert_eq!(Engine::parse("libreoffice"), None);
    }
}
