use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use facegrid::{DebugState, EngineCommand, RenderedFrame, RuntimeHandle};
use image::RgbaImage;
use tokio::sync::{broadcast, mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Webp,
}

impl FrameFormat {
    pub fn mime(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "image/jpeg",
            FrameFormat::Webp => "image/webp",
        }
    }
}

impl std::str::FromStr for FrameFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(FrameFormat::Jpeg),
            "webp" => Ok(FrameFormat::Webp),
            other => anyhow::bail!("unknown frame format {other:?} (expected jpeg or webp)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FramePacket {
    pub ts_millis: u64,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Arc<[u8]>,
}

impl FramePacket {
    pub fn encode(image: &RgbaImage, ts_millis: u64, format: FrameFormat, quality: u8) -> anyhow::Result<Self> {
        let mut data = Vec::new();
        match format {
            FrameFormat::Jpeg => {
                let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100))
                    .encode_image(&rgb)
                    .context("jpeg encoding failed")?;
            }
            FrameFormat::Webp => {
                image::codecs::webp::WebPEncoder::new_lossless(&mut data)
                    .encode(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgba8)
                    .context("webp encoding failed")?;
            }
        }
        Ok(Self { ts_millis, width: image.width(), height: image.height(), format, data: data.into() })
    }
}

/// Encoded frames and state snapshots fanned out to every connected viewer.
#[derive(Clone)]
pub struct FrameBus {
    pub frames_tx: broadcast::Sender<FramePacket>,
    pub meta_tx: broadcast::Sender<DebugState>,
}

impl FrameBus {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, _) = broadcast::channel::<FramePacket>(capacity.max(1));
        let (meta_tx, _) = broadcast::channel::<DebugState>(capacity.max(1));
        Self { frames_tx, meta_tx }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Canvas size of the served page.
    pub canvas_width: u32,
    pub canvas_height: u32,
}

/// The visualizer's line into the engine runtime. Stands in for the site's
/// navbar: it can switch modes, report pointer movement and open the grid
/// overlay.
#[derive(Clone)]
pub struct ControlHandle {
    pub commands: mpsc::UnboundedSender<EngineCommand>,
    navigation: Arc<broadcast::Receiver<String>>,
    pub state: watch::Receiver<DebugState>,
}

impl ControlHandle {
    pub fn new(runtime: &RuntimeHandle) -> Self {
        Self {
            commands: runtime.commands(),
            navigation: Arc::new(runtime.subscribe_navigation()),
            state: runtime.state(),
        }
    }

    pub fn send(&self, command: EngineCommand) -> anyhow::Result<()> {
        self.commands.send(command).map_err(|_| anyhow::anyhow!("engine runtime has shut down"))
    }

    /// Sends a click and waits briefly for the article it resolves to.
    pub async fn click(&self, x: f32, y: f32) -> anyhow::Result<Option<String>> {
        let mut navigation = self.navigation.resubscribe();
        self.send(EngineCommand::Click { x, y })?;
        match tokio::time::timeout(std::time::Duration::from_millis(250), navigation.recv()).await {
            Ok(Ok(url)) => Ok(Some(url)),
            _ => Ok(None),
        }
    }
}

/// Encodes runtime frames onto `bus` and mirrors state snapshots to it.
pub fn spawn_frame_pump(runtime: &RuntimeHandle, bus: FrameBus, format: FrameFormat, quality: u8) -> tokio::task::JoinHandle<()> {
    let mut frames = runtime.subscribe_frames();
    let mut state = runtime.state();
    let started = Instant::now();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(frame) => publish_frame(&bus, frame, started, format, quality).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "frame pump lagged behind the renderer");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = state.borrow_and_update().clone();
                    let _ = bus.meta_tx.send(snapshot);
                }
            }
        }
        tracing::info!("frame pump stopped");
    })
}

async fn publish_frame(bus: &FrameBus, frame: RenderedFrame, started: Instant, format: FrameFormat, quality: u8) {
    if bus.frames_tx.receiver_count() == 0 {
        return;
    }
    let ts_millis = frame.timestamp.saturating_duration_since(started).as_millis() as u64;
    let encoded = tokio::task::spawn_blocking(move || FramePacket::encode(&frame.image, ts_millis, format, quality)).await;
    match encoded {
        Ok(Ok(packet)) => {
            let _ = bus.frames_tx.send(packet);
        }
        Ok(Err(e)) => tracing::warn!(error = %e, "frame encoding failed"),
        Err(e) => tracing::warn!(error = %e, "frame encoder task failed"),
    }
}

#[cfg(feature = "web")]
pub async fn start_server(
    bus: FrameBus,
    cfg: ServerConfig,
    control: ControlHandle,
    navbar: Vec<facegrid::core_modules::articles::NavItem>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::extract::{Request, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use facegrid::Mode;
    use facegrid::core_modules::articles::NavItem;
    use leptos::*;
    use serde::{Deserialize, Serialize};

    #[component]
    fn App(navbar: Vec<NavItem>, width: u32, height: u32) -> impl IntoView {
        view! {
            <main>
                <nav id="navbar" style="display:flex; gap:16px; direction:rtl; font-family:sans-serif; margin:8px 0;">
                    {navbar
                        .into_iter()
                        .map(|item| {
                            view! {
                                <a href="#" class="nav-item" data-mode=item.mode.key() data-headline=item.headline.clone()>
                                    {item.headline}
                                </a>
                            }
                        })
                        .collect_view()}
                    <button id="btn-grid" style="padding:4px 10px;">"grid"</button>
                    <span id="status" style="font-family:monospace; font-size:12px; color:#777">"idle"</span>
                </nav>
                <canvas id="preview" width=width height=height style="border:1px solid #444"></canvas>
                <script src="/client.js"></script>
            </main>
        }
    }

    const CLIENT_JS: &str = r#"(function(){
        const status = (t)=>{ const el=document.getElementById('status'); if(el) el.textContent=t; };
        const post = (path, body)=> fetch(path, { method:'POST', headers:{'content-type':'application/json'}, body: JSON.stringify(body||{}) });
        const canvas = document.getElementById('preview');
        const ctx = canvas.getContext('2d');
        let gridOpen = false;
        document.querySelectorAll('.nav-item').forEach((el)=>{
            el.onclick = (ev)=>{ ev.preventDefault(); post('/control/mode', { mode: el.dataset.mode, headline: el.dataset.headline }); };
        });
        const btnGrid = document.getElementById('btn-grid');
        if(btnGrid){ btnGrid.onclick = ()=>{ gridOpen = !gridOpen; post('/control/grid', { open: gridOpen }); }; }
        const scaled = (ev)=>{ const r = canvas.getBoundingClientRect(); return { x: (ev.clientX - r.left) * canvas.width / r.width, y: (ev.clientY - r.top) * canvas.height / r.height }; };
        let pending = null;
        canvas.onmousemove = (ev)=>{ pending = scaled(ev); };
        setInterval(()=>{ if(pending){ post('/control/pointer', pending); pending = null; } }, 50);
        canvas.onmouseleave = ()=> post('/control/pointer', { left: true });
        canvas.onclick = async (ev)=>{
            const res = await post('/control/click', scaled(ev));
            if(res.ok){ const body = await res.json(); if(body.url){ window.open(body.url, '_blank'); } }
        };
        document.onkeydown = (ev)=>{ if(ev.key.length === 1){ post('/control/key', { key: ev.key }); } };
        const ws = new WebSocket((location.protocol==='https:'?'wss://':'ws://')+location.host+'/ws/frames');
        ws.binaryType = 'arraybuffer';
        ws.onopen = ()=>{ status('connected'); post('/control/resize', { width: canvas.width, height: canvas.height }); };
        ws.onclose = ()=> status('disconnected');
        ws.onmessage = async (ev)=>{
            if(typeof ev.data === 'string'){
                const meta = JSON.parse(ev.data);
                status(meta.mode + ' ' + meta.cols + 'x' + meta.rows + ' ' + meta.camera + ' ' + Math.round(meta.fps) + 'fps');
                return;
            }
            const bmp = await createImageBitmap(new Blob([ev.data]));
            ctx.drawImage(bmp, 0, 0, canvas.width, canvas.height);
        };
    })();"#;

    #[derive(Debug, Deserialize)]
    struct ModeRequest {
        mode: Mode,
        #[serde(default)]
        headline: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct GridRequest {
        open: bool,
    }

    #[derive(Debug, Deserialize)]
    struct PointerRequest {
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
        #[serde(default)]
        left: bool,
    }

    #[derive(Debug, Deserialize)]
    struct KeyRequest {
        key: String,
    }

    #[derive(Debug, Deserialize)]
    struct ResizeRequest {
        width: u32,
        height: u32,
    }

    #[derive(Debug, Serialize)]
    struct ClickResponse {
        url: Option<String>,
    }

    fn accepted(result: anyhow::Result<()>) -> StatusCode {
        match result {
            Ok(()) => StatusCode::NO_CONTENT,
            Err(e) => {
                tracing::warn!(error = %e, "control request dropped");
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    async fn ws_frames(socket: WebSocket, bus: FrameBus) {
        use futures_util::{SinkExt, StreamExt};
        let (mut tx, mut rx) = socket.split();
        let mut frames = bus.frames_tx.subscribe();
        let mut meta = bus.meta_tx.subscribe();
        loop {
            let message = tokio::select! {
                packet = frames.recv() => match packet {
                    Ok(packet) => Message::Binary(packet.data.to_vec()),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                },
                state = meta.recv() => match state {
                    Ok(state) => match serde_json::to_string(&state) {
                        Ok(text) => Message::Text(text),
                        Err(_) => continue,
                    },
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                },
                incoming = rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                },
            };
            if tx.send(message).await.is_err() {
                break;
            }
        }
        tracing::debug!("viewer disconnected");
    }

    let leptos_options = LeptosOptions::builder().output_name("facegrid_visualizer").site_root(".").build();
    let (width, height) = (cfg.canvas_width, cfg.canvas_height);
    let app = move || {
        let navbar = navbar.clone();
        view! { <App navbar=navbar width=width height=height/> }
    };

    let bus_ws = bus.clone();
    let app: Router = Router::new()
        .route(
            "/",
            get(move |req: Request| {
                let handler = leptos_axum::render_app_to_stream(leptos_options.clone(), app.clone());
                async move { handler(req).await.into_response() }
            }),
        )
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/ws/frames",
            get(move |ws: WebSocketUpgrade| {
                let bus = bus_ws.clone();
                async move { ws.on_upgrade(move |socket| ws_frames(socket, bus)) }
            }),
        )
        .route(
            "/client.js",
            get(|| async {
                let mut resp = axum::response::Response::new(axum::body::Body::from(CLIENT_JS));
                resp.headers_mut().insert(
                    axum::http::header::CONTENT_TYPE,
                    axum::http::HeaderValue::from_static("application/javascript"),
                );
                resp
            }),
        )
        .route(
            "/state",
            get(|State(control): State<ControlHandle>| async move { Json(control.state.borrow().clone()) }),
        )
        .route(
            "/control/mode",
            post(|State(control): State<ControlHandle>, Json(req): Json<ModeRequest>| async move {
                let command = match req.headline {
                    Some(headline) => EngineCommand::SetModeWithHeadline { mode: req.mode, headline },
                    None => EngineCommand::SetMode(req.mode),
                };
                accepted(control.send(command))
            }),
        )
        .route(
            "/control/grid",
            post(|State(control): State<ControlHandle>, Json(req): Json<GridRequest>| async move {
                accepted(control.send(EngineCommand::SetGridOpen(req.open)))
            }),
        )
        .route(
            "/control/pointer",
            post(|State(control): State<ControlHandle>, Json(req): Json<PointerRequest>| async move {
                let command = if req.left { EngineCommand::PointerLeft } else { EngineCommand::PointerMoved { x: req.x, y: req.y } };
                accepted(control.send(command))
            }),
        )
        .route(
            "/control/resize",
            post(|State(control): State<ControlHandle>, Json(req): Json<ResizeRequest>| async move {
                accepted(control.send(EngineCommand::Resize(facegrid::Viewport::new(req.width, req.height))))
            }),
        )
        .route(
            "/control/key",
            post(|State(control): State<ControlHandle>, Json(req): Json<KeyRequest>| async move {
                let command = req.key.chars().next().and_then(facegrid::keyboard::command_for_key);
                match command {
                    Some(command) => accepted(control.send(command)),
                    None => StatusCode::BAD_REQUEST,
                }
            }),
        )
        .route(
            "/control/click",
            post(|State(control): State<ControlHandle>, Json(req): Json<PointerRequest>| async move {
                match control.click(req.x, req.y).await {
                    Ok(url) => Json(ClickResponse { url }).into_response(),
                    Err(e) => {
                        tracing::warn!(error = %e, "click dropped");
                        StatusCode::SERVICE_UNAVAILABLE.into_response()
                    }
                }
            }),
        )
        .with_state(control);

    let bind_addr = cfg.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "visualizer listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "visualizer server stopped");
        }
    });

    Ok(server)
}

#[cfg(not(feature = "web"))]
pub async fn start_server(
    _bus: FrameBus,
    _cfg: ServerConfig,
    _control: ControlHandle,
    _navbar: Vec<facegrid::core_modules::articles::NavItem>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for facegrid_visualizer"))
}
