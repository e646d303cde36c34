//! Development server with live reload.
//!
//! - Static files served from the destination with `tiny_http`
//! - `index.html` resolution for directories
//! - Live reload over a WebSocket side channel (`tungstenite`)
//! - Rebuild on change via [`crate::watch`]
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   ┌──────────────────┐   ┌───────────────────┐
//! │   Main Thread   │   │  Watcher Thread  │   │ Live Reload Thread│
//! │  (HTTP Server)  │   │  (FileWatcher)   │   │ (WebSocket accept)│
//! └────────┬────────┘   └────────┬─────────┘   └─────────┬─────────┘
//!          │                     │ rebuild ok             │
//!          ▼                     └──────── broadcast ────▶│
//!    serve destination                          {"type":"reload"}
//! ```

use crate::{
    build::Builder,
    cli::Cli,
    config::SiteConfig,
    debug, log,
    utils::path::is_within,
    watch::FileWatcher,
};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr, TcpListener, TcpStream},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tungstenite::{Message, WebSocket};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// The only message the live-reload channel sends.
pub const RELOAD_MESSAGE: &str = r#"{"type":"reload"}"#;

/// Client script injected into served HTML. `{port}` is substituted.
const LIVERELOAD_SCRIPT: &str = r#"<script>
(function () {
  var ws = new WebSocket("ws://" + location.hostname + ":{port}/");
  ws.onmessage = function (e) {
    try { if (JSON.parse(e.data).type === "reload") location.reload(); } catch (_) {}
  };
})();
</script>"#;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve `config.destination()` until Ctrl+C, rebuilding on change.
///
/// The initial build must already have run. Each rebuild reloads the
/// configuration through `cli`, so edits to `_config.toml` apply.
pub fn serve_site(cli: &Cli, config: &SiteConfig) -> Result<()> {
    let interface: IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("invalid interface `{}`", config.serve.interface))?;
    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let livereload = if config.serve.livereload {
        let reload = LiveReload::bind(interface, config.serve.livereload_port)?;
        log!("serve"; "live reload on port {}", reload.port());
        Some(reload)
    } else {
        None
    };

    let watcher = if config.serve.watch {
        let cli = cli.clone();
        let clients = livereload.as_ref().map(LiveReload::clients);
        let rebuild = move || -> Result<()> {
            let config = SiteConfig::from_cli(&cli)?;
            let report = Builder::new(config).build()?;
            if report.up_to_date {
                log!("watch"; "nothing to rebuild");
            } else {
                log!("watch"; "rebuilt {} documents in {:.2?}", report.rendered, report.elapsed);
            }
            Ok(())
        };
        let notify = move || {
            if let Some(clients) = &clients
                && !clients.is_empty()
            {
                let connected = clients.len();
                let reached = clients.broadcast(RELOAD_MESSAGE);
                debug!("serve"; "reload sent to {}/{} clients", reached, connected);
            }
        };
        Some(FileWatcher::start(config, rebuild, notify)?)
    } else {
        None
    };

    log!("serve"; "http://{}", addr);

    let root = config.destination().to_path_buf();
    let reload_port = livereload.as_ref().map(LiveReload::port);
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &root, reload_port) {
            log!("serve"; "request error: {e}");
        }
    }

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map_or_else(String::new, |e| e.to_string())
    ))
}

// ============================================================================
// Live Reload
// ============================================================================

/// Connected live-reload clients. Clients that miss a message are not
/// caught up later.
#[derive(Default)]
pub struct ReloadClients {
    sockets: Mutex<Vec<WebSocket<TcpStream>>>,
}

impl ReloadClients {
    fn add(&self, socket: WebSocket<TcpStream>) {
        self.sockets.lock().push(socket);
    }

    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.lock().is_empty()
    }

    /// Send `text` to every client, dropping those that fail. Returns the
    /// number reached.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut sockets = self.sockets.lock();
        sockets.retain_mut(|socket| socket.send(Message::text(text.to_owned())).is_ok());
        sockets.len()
    }
}

/// WebSocket listener accepting live-reload clients on a background thread.
pub struct LiveReload {
    port: u16,
    clients: Arc<ReloadClients>,
}

impl LiveReload {
    pub fn bind(interface: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(interface, port))
            .with_context(|| format!("Failed to bind live reload port {port}"))?;
        let port = listener.local_addr()?.port();
        let clients = Arc::new(ReloadClients::default());

        let accepted = Arc::clone(&clients);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                match tungstenite::accept(stream) {
                    Ok(socket) => accepted.add(socket),
                    Err(e) => debug!("serve"; "live reload handshake failed: {e}"),
                }
            }
        });

        Ok(Self { port, clients })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn clients(&self) -> Arc<ReloadClients> {
        Arc::clone(&self.clients)
    }
}

// ============================================================================
// Request Handling
// ============================================================================

/// Map a request URL onto a file under `root`.
///
/// The candidate path is resolved on disk and must still be inside `root`;
/// anything else, including traversal attempts, is `None`. Directories
/// resolve to their `index.html`.
pub fn resolve_request(root: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(path).ok()?;
    let relative = decoded.trim_start_matches('/');

    let root = fs::canonicalize(root).ok()?;
    let mut candidate = fs::canonicalize(root.join(relative)).ok()?;
    if !is_within(&root, &candidate) {
        return None;
    }
    if candidate.is_dir() {
        candidate = candidate.join("index.html");
    }
    candidate.is_file().then_some(candidate)
}

fn handle_request(request: Request, root: &Path, reload_port: Option<u16>) -> Result<()> {
    let Some(path) = resolve_request(root, request.url()) else {
        debug!("serve"; "404 {}", request.url());
        return serve_not_found(request);
    };

    let content_type = guess_content_type(&path);
    let mut content = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    if let Some(port) = reload_port
        && content_type.starts_with("text/html")
    {
        content = inject_livereload(&String::from_utf8_lossy(&content), port).into_bytes();
    }

    let response = Response::from_data(content).with_header(header("Content-Type", content_type)?);
    request.respond(response)?;
    Ok(())
}

/// Insert the live-reload client before `</body>`, or append it.
pub fn inject_livereload(html: &str, port: u16) -> String {
    let script = LIVERELOAD_SCRIPT.replace("{port}", &port.to_string());
    match html.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], script, &html[at..]),
        None => format!("{html}{script}"),
    }
}

fn serve_not_found(request: Request) -> Result<()> {
    let body = "404 Not Found";
    let response = Response::new(
        StatusCode(404),
        vec![header("Content-Type", "text/plain; charset=utf-8")?],
        Cursor::new(body),
        Some(body.len()),
        None,
    );
    request.respond(response)?;
    Ok(())
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name, value).map_err(|()| anyhow!("invalid header {name}: {value}"))
}

/// MIME type from a file extension; `application/octet-stream` otherwise.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("_site");
        fs::create_dir_all(out.join("blog/post")).unwrap();
        fs::write(out.join("index.html"), "<html><body>home</body></html>").unwrap();
        fs::write(out.join("blog/post/index.html"), "post").unwrap();
        fs::write(out.join("my file.txt"), "spaced").unwrap();
        fs::write(dir.path().join("secret.txt"), "outside").unwrap();
        dir
    }

    #[test]
    fn test_resolve_files_and_indexes() {
        let dir = site();
        let root = dir.path().join("_site");
        let ends = |url: &str, suffix: &str| resolve_request(&root, url).unwrap().ends_with(suffix);

        assert!(ends("/", "index.html"));
        assert!(ends("/blog/post/", "blog/post/index.html"));
        assert!(ends("/blog/post", "blog/post/index.html"));
        assert!(ends("/index.html?t=123", "index.html"));
        assert!(ends("/my%20file.txt", "my file.txt"));
        assert!(resolve_request(&root, "/blog/").is_none());
        assert!(resolve_request(&root, "/missing.html").is_none());
    }

    #[test]
    fn test_traversal_is_not_found() {
        let dir = site();
        let root = dir.path().join("_site");
        assert!(resolve_request(&root, "/../secret.txt").is_none());
        assert!(resolve_request(&root, "/blog/../../secret.txt").is_none());
        assert!(resolve_request(&root, "/%2e%2e/secret.txt").is_none());
        assert!(resolve_request(&root, "/..%2fsecret.txt").is_none());
    }

    #[test]
    fn test_inject_livereload() {
        let html = inject_livereload("<html><body>x</body></html>", 35729);
        assert!(html.contains(":35729/"));
        assert!(html.ends_with("</script></body></html>"));
        assert!(inject_livereload("fragment", 1).starts_with("fragment<script>"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(guess_content_type(Path::new("a.HTML")), "text/html; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("feed.xml")), "application/xml; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.woff2")), "font/woff2");
        assert_eq!(guess_content_type(Path::new("LICENSE")), "application/octet-stream");
    }

    #[test]
    fn test_reload_broadcast_reaches_clients() {
        let reload = LiveReload::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let url = format!("ws://127.0.0.1:{}/", reload.port());
        let (mut client, _) = tungstenite::connect(url).unwrap();

        let clients = reload.clients();
        for _ in 0..200 {
            if clients.len() == 1 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(clients.broadcast(RELOAD_MESSAGE), 1);

        let message = client.read().unwrap();
        assert_eq!(message.into_text().unwrap().as_str(), RELOAD_MESSAGE);
    }
}
