//! Development server.
//!
//! Serves `dist` over HTTP on `127.0.0.1` and keeps a WebSocket listener next
//! to it. Every HTML response gets a small script that connects to the
//! WebSocket and reloads the page when told to. After a watched task succeeds
//! the watcher calls [`LiveReload::reload`], which sends `"reload"` to every
//! connected tab.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use camino::Utf8Path;
use console::style;
use tokio::sync::oneshot;
use tower_http::services::ServeDir;
use tungstenite::WebSocket;

use crate::error::ServeError;
use crate::watch::Reload;

/// Connections kept open; older tabs are closed first.
const MAX_CLIENTS: usize = 10;

/// How long a new connection may take to finish the WebSocket handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// A running HTTP server. Stops when dropped.
pub struct DevServer {
    port: u16,
    reload: LiveReload,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DevServer {
    /// Binds `127.0.0.1:port` and starts serving `dist` in the background.
    ///
    /// Fails with [`ServeError::Bind`] when the port is taken. Port `0` picks
    /// any free port.
    pub fn start(dist: &Utf8Path, port: u16) -> Result<Self, ServeError> {
        let bind = |port: u16| -> Result<TcpListener, ServeError> {
            let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port)))
                .map_err(|source| ServeError::Bind { port, source })?;
            listener
                .set_nonblocking(true)
                .map_err(|source| ServeError::Bind { port, source })?;
            Ok(listener)
        };

        let listener = bind(port)?;
        let port = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { port, source })?
            .port();

        let ws = match port.checked_add(1).map(bind) {
            Some(Ok(listener)) => listener,
            _ => bind(0)?,
        };
        let reload = LiveReload::start(ws)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ServeError::Runtime)?;

        let script: Arc<str> = reload_script(reload.port()).into();
        let router = Router::new()
            .fallback_service(ServeDir::new(dist))
            .layer(middleware::from_fn_with_state(script, inject_reload));

        let (shutdown, signal) = oneshot::channel::<()>();
        let thread = thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(e) => {
                        tracing::error!("couldn't register the listener: {e}");
                        return;
                    }
                };

                let serve = axum::serve(listener, router).with_graceful_shutdown(async {
                    signal.await.ok();
                });

                if let Err(e) = serve.await {
                    tracing::error!("HTTP server stopped: {e}");
                }
            })
        });

        tracing::info!(
            url = %style(format!("http://localhost:{port}/")).yellow(),
            "starting a HTTP server"
        );

        Ok(Self {
            port,
            reload,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The sink that refreshes every connected browser tab.
    pub fn reloader(&self) -> &LiveReload {
        &self.reload
    }

    /// Stops the server and waits for in-flight requests.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.reload.stop();

        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }

        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("HTTP server thread panicked");
        }
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// WebSocket broadcaster for browser reloads.
pub struct LiveReload {
    port: u16,
    clients: Clients,
    stopped: Arc<AtomicBool>,
}

impl LiveReload {
    fn start(listener: TcpListener) -> Result<Self, ServeError> {
        let port = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { port: 0, source })?
            .port();

        let clients = Clients::default();
        let stopped = Arc::new(AtomicBool::new(false));

        new_thread_ws_incoming(listener, clients.clone(), stopped.clone());

        Ok(Self {
            port,
            clients,
            stopped,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of browser tabs currently connected.
    pub fn clients(&self) -> usize {
        lock(&self.clients).len()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);

        for mut socket in lock(&self.clients).drain(..) {
            socket.close(None).ok();
        }
    }
}

impl Reload for LiveReload {
    fn reload(&self) {
        let mut clients = lock(&self.clients);
        let mut broken = vec![];

        for (i, socket) in clients.iter_mut().enumerate() {
            match socket.send("reload".into()) {
                Ok(()) => {}
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset) =>
                {
                    broken.push(i)
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    broken.push(i)
                }
                Err(e) => tracing::error!("couldn't notify a browser tab: {e}"),
            }
        }

        for i in broken.into_iter().rev() {
            clients.remove(i);
        }

        tracing::debug!("reload sent to {} tab(s)", clients.len());
    }
}

fn lock(clients: &Clients) -> std::sync::MutexGuard<'_, Vec<WebSocket<TcpStream>>> {
    clients.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_thread_ws_incoming(
    server: TcpListener,
    clients: Clients,
    stopped: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stopped.load(Ordering::Relaxed) {
            let stream = match server.accept() {
                Ok((stream, _)) => stream,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                    continue;
                }
                Err(e) => {
                    tracing::error!("WebSocket accept failed: {e}");
                    continue;
                }
            };

            let setup = stream
                .set_nonblocking(false)
                .and_then(|()| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)));
            if let Err(e) = setup {
                tracing::error!("WebSocket stream setup failed: {e}");
                continue;
            }

            let socket = match tungstenite::accept(stream) {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::debug!("WebSocket handshake failed: {e}");
                    continue;
                }
            };

            if let Err(e) = socket.get_ref().set_read_timeout(None) {
                tracing::error!("WebSocket stream setup failed: {e}");
                continue;
            }

            let mut clients = lock(&clients);
            clients.push(socket);

            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    })
}

fn reload_script(ws_port: u16) -> String {
    format!(
        "<script>(function(){{var ws=new WebSocket(\"ws://\"+location.hostname+\":{ws_port}\");\
         ws.onmessage=function(){{location.reload()}}}})();</script>"
    )
}

/// Inserts `script` right before the last `</body>`, or at the end of the
/// document when there is none.
pub fn inject_script(html: &[u8], script: &str) -> Vec<u8> {
    const CLOSE: &[u8] = b"</body>";

    let at = html
        .windows(CLOSE.len())
        .rposition(|window| window.eq_ignore_ascii_case(CLOSE))
        .unwrap_or(html.len());

    let mut out = Vec::with_capacity(html.len() + script.len());
    out.extend_from_slice(&html[..at]);
    out.extend_from_slice(script.as_bytes());
    out.extend_from_slice(&html[at..]);
    out
}

/// Rewrites full HTML documents only. Other methods and partial or
/// conditional responses (206, 304) pass through untouched.
async fn inject_reload(State(script): State<Arc<str>>, request: Request, next: Next) -> Response {
    let get = request.method() == Method::GET;
    let response = next.run(request).await;

    if !get || response.status() != StatusCode::OK {
        return response;
    }

    let html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));

    if !html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("couldn't read HTML response: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = inject_script(&bytes, &script);
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    Response::from_parts(parts, Body::from(body))
}
