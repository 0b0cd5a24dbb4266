use crate::cli::GenerateArgs;
use crate::client::{ClientSettings, GenerationSession, RelayClient, DEFAULT_RELAY_URL};
use crate::config::Config;
use crate::error::GenerateError;
use crate::request::{Credentials, GenerationRequest, Material, TextLimits};
use crate::routes::{self, AppState, ServerSettings, DEFAULT_TRUSTED_PREFIX};
use crate::upstream::{HttpUpstream, StubUpstream, Upstream};
use anyhow::Context;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_LISTEN_ADDR: SocketAddr = SocketAddr::V4(std::net::SocketAddrV4::new(
    std::net::Ipv4Addr::LOCALHOST,
    3000,
));

/// Server defaults: environment first, then config.
pub fn server_settings(cfg: Option<&Config>) -> ServerSettings {
    let server = cfg.map(|c| &c.server);
    ServerSettings {
        endpoint: std::env::var("REPURPOSE_ENDPOINT")
            .ok()
            .or_else(|| server.and_then(|s| s.endpoint.clone())),
        api_key: std::env::var("REPURPOSE_API_KEY")
            .ok()
            .or_else(|| server.and_then(|s| s.api_key.clone())),
        trusted_prefix: server
            .and_then(|s| s.trusted_prefix.clone())
            .unwrap_or_else(|| DEFAULT_TRUSTED_PREFIX.to_string()),
    }
}

pub fn client_settings(cfg: Option<&Config>, relay_override: Option<String>) -> anyhow::Result<ClientSettings> {
    let client = cfg.map(|c| &c.client);
    let defaults = TextLimits::default();
    let limits = TextLimits {
        min: client.and_then(|c| c.min_text_len).unwrap_or(defaults.min),
        max: client.and_then(|c| c.max_text_len).unwrap_or(defaults.max),
    };
    if limits.min > limits.max {
        anyhow::bail!(
            "client.min_text_len ({}) exceeds client.max_text_len ({})",
            limits.min,
            limits.max
        );
    }

    Ok(ClientSettings {
        relay_url: relay_override
            .or_else(|| client.and_then(|c| c.relay_url.clone()))
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string()),
        credentials: Credentials::pair(
            client.and_then(|c| c.api_key.clone()),
            client.and_then(|c| c.endpoint.clone()),
        )
        .context("invalid [client] credentials in config")?,
        limits,
    })
}

pub async fn cmd_serve(
    http: &reqwest::Client,
    cfg: Option<&Config>,
    addr: Option<SocketAddr>,
    stub: bool,
) -> anyhow::Result<()> {
    let addr = addr
        .or_else(|| cfg.and_then(|c| c.server.listen_addr))
        .unwrap_or(DEFAULT_LISTEN_ADDR);
    let settings = server_settings(cfg);

    let upstream: Arc<dyn Upstream> = if stub {
        Arc::new(StubUpstream::echo())
    } else {
        Arc::new(HttpUpstream::new(http.clone()))
    };

    info!(
        %addr,
        upstream = upstream.name(),
        trusted_prefix = %settings.trusted_prefix,
        default_endpoint = settings.endpoint.is_some(),
        "starting relay server"
    );

    let app = routes::build_router(AppState::new(upstream, settings));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

/// Build the request from the command line; credentials come from the injected settings.
pub fn build_request(args: &GenerateArgs, settings: &ClientSettings) -> anyhow::Result<GenerationRequest> {
    let source = if !args.urls.is_empty() {
        Material::Urls(args.urls.clone())
    } else if let Some(path) = &args.text_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read source text: {}", path.display()))?;
        Material::Text(text)
    } else {
        Material::Text(args.text.clone().unwrap_or_default())
    };

    let style = if !args.style_urls.is_empty() {
        Some(Material::Urls(args.style_urls.clone()))
    } else {
        args.style_text.clone().map(Material::Text)
    };

    Ok(GenerationRequest {
        source,
        style,
        platform: args.platform,
        streaming: !args.no_stream,
        credentials: settings.credentials.clone(),
    })
}

/// Mirrors the session output onto a terminal.
///
/// Growth is printed as a suffix; a replacement that does not extend what is
/// already on screen is printed again in full on a fresh line.
struct OutputMirror<W> {
    out: W,
    shown: String,
}

impl<W: Write> OutputMirror<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
        }
    }

    fn show(&mut self, output: &str) -> std::io::Result<()> {
        match output.strip_prefix(self.shown.as_str()) {
            Some("") => return Ok(()),
            Some(rest) => write!(self.out, "{rest}")?,
            None => write!(self.out, "\n{output}")?,
        }
        self.out.flush()?;
        self.shown.clear();
        self.shown.push_str(output);
        Ok(())
    }

    /// Print whatever the final result adds and end the line.
    fn finish(&mut self, result: Result<String, GenerateError>) -> anyhow::Result<()> {
        match result {
            Ok(output) => {
                self.show(&output)?;
                writeln!(self.out)?;
                Ok(())
            }
            Err(e) if e.is_stopped() => {
                writeln!(self.out)?;
                eprintln!("{e}");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e)),
        }
    }
}

pub async fn cmd_generate(http: &reqwest::Client, cfg: Option<&Config>, args: GenerateArgs) -> anyhow::Result<()> {
    let settings = client_settings(cfg, args.relay.clone())?;
    let request = build_request(&args, &settings)?;

    let session = Arc::new(GenerationSession::new(
        RelayClient::new(http.clone(), settings.relay_url.clone()),
        settings.limits,
    ));
    let mut rx = session.subscribe();

    let mut task = tokio::spawn({
        let session = session.clone();
        async move { session.submit(request).await }
    });

    let mut mirror = OutputMirror::new(std::io::stdout());

    let result = loop {
        tokio::select! {
            res = &mut task => break res.context("generation task failed")?,
            _ = tokio::signal::ctrl_c() => session.cancel(),
            Ok(()) = rx.changed() => {
                let output = rx.borrow_and_update().output.clone();
                mirror.show(&output)?;
            }
        }
    };

    mirror.finish(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientSection;
    use crate::request::Platform;

    fn args() -> GenerateArgs {
        GenerateArgs {
            urls: Vec::new(),
            text: Some("body".to_string()),
            text_file: None,
            style_urls: Vec::new(),
            style_text: None,
            platform: Platform::Blog,
            no_stream: false,
            relay: None,
        }
    }

    #[test]
    fn client_settings_defaults_and_overrides() {
        let s = client_settings(None, None).unwrap();
        assert_eq!(s.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(s.limits, TextLimits::default());
        assert!(s.credentials.is_none());

        let cfg = Config {
            client: ClientSection {
                relay_url: Some("http://cfg/api/generate".to_string()),
                api_key: Some("k".to_string()),
                endpoint: Some("https://llm.datasaur.ai/api/deployment/x".to_string()),
                min_text_len: Some(10),
                max_text_len: None,
            },
            ..Config::default()
        };
        let s = client_settings(Some(&cfg), Some("http://flag/api/generate".to_string())).unwrap();
        assert_eq!(s.relay_url, "http://flag/api/generate");
        assert_eq!(s.limits.min, 10);
        assert_eq!(s.credentials.unwrap().api_key, "k");
    }

    #[test]
    fn client_settings_rejects_half_credentials() {
        let cfg = Config {
            client: ClientSection {
                api_key: Some("k".to_string()),
                ..ClientSection::default()
            },
            ..Config::default()
        };
        assert!(client_settings(Some(&cfg), None).is_err());
    }

    fn printed(mirror: OutputMirror<Vec<u8>>) -> String {
        String::from_utf8(mirror.out).unwrap()
    }

    #[test]
    fn mirror_prints_growth_as_suffixes() {
        let mut m = OutputMirror::new(Vec::new());
        m.show("Hé").unwrap();
        m.show("Héllo").unwrap();
        m.show("Héllo").unwrap();
        m.show("Héllo wörld").unwrap();
        assert_eq!(printed(m), "Héllo wörld");
    }

    #[test]
    fn mirror_reprints_a_replacement_that_is_not_an_extension() {
        let mut m = OutputMirror::new(Vec::new());
        m.show("draft tex").unwrap();
        m.show("Final text").unwrap();
        assert_eq!(printed(m), "draft tex\nFinal text");
    }

    #[test]
    fn mirror_finish_outcomes() {
        let mut m = OutputMirror::new(Vec::new());
        m.show("Hello ").unwrap();
        m.finish(Ok("Hello world".to_string())).unwrap();
        assert_eq!(printed(m), "Hello world\n");

        let mut m = OutputMirror::new(Vec::new());
        m.show("Hello ").unwrap();
        assert!(m.finish(Err(GenerateError::Stopped)).is_ok());
        assert_eq!(printed(m), "Hello \n");

        let mut m = OutputMirror::new(Vec::new());
        let err = m.finish(Err(GenerateError::Failed("reset".to_string()))).unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate content - reset");
    }

    #[test]
    fn request_from_args() {
        let settings = ClientSettings::default();
        let req = build_request(&args(), &settings).unwrap();
        assert_eq!(req.source, Material::Text("body".to_string()));
        assert!(req.style.is_none());
        assert!(req.streaming);

        let mut a = args();
        a.urls = vec!["https://a.example".to_string()];
        a.style_text = Some("casual".to_string());
        a.no_stream = true;
        let req = build_request(&a, &settings).unwrap();
        assert!(matches!(req.source, Material::Urls(_)));
        assert_eq!(req.style, Some(Material::Text("casual".to_string())));
        assert!(!req.streaming);
    }
}
