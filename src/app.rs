use crate::config::{self, AppConfig};
use crate::filters::{
    apply_tag_suggestion, build_recent_list, build_top_tags, clear_tag_filters, has_any_filters,
    has_tag_filters, is_tag_active, tag_suggestions, toggle_tag_filter,
};
use crate::gate::{GateDecision, LauncherGate};
use crate::hotkey::{ActivationHandler, DEFAULT_HOTKEY, LauncherHotkey, RebindOutcome};
use crate::library::PromptLibrary;
use crate::prompts::PromptEntry;
use crate::shortcut::{GlobalRegistrar, normalize_descriptor};
use arboard::Clipboard;
use chrono::Utc;
use enigo::{Enigo, Key, KeyboardControllable};
use global_hotkey::{GlobalHotKeyEvent, HotKeyState};
use notify::RecommendedWatcher;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tray_icon::menu::{Menu, MenuEvent, MenuId, MenuItem};
use tray_icon::{TrayIcon, TrayIconBuilder};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowId, WindowLevel};
use wry::http::Request;
use wry::{WebView, WebViewBuilder};

const PANEL_WIDTH: f64 = 760.0;
const PANEL_HEIGHT: f64 = 560.0;
const SEARCH_LIMIT: usize = 200;
const TRAY_ICON_SIZE: u32 = 32;
const PASTE_FOCUS_DELAY: Duration = Duration::from_millis(120);

#[derive(Debug, Default, Serialize)]
struct Status {
    error: Option<String>,
    warning: Option<String>,
    notice: Option<String>,
}

struct AppState {
    cfg: AppConfig,
    clipboard: Clipboard,
    library: PromptLibrary,
    hotkey: LauncherHotkey<GlobalRegistrar>,
    on_activate: ActivationHandler,
    gate: LauncherGate,
    query: String,
    favorites_only: bool,
    results: Vec<PromptEntry>,
    status: Status,
    _watcher: Option<RecommendedWatcher>,
    proxy: EventLoopProxy<UserEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcMessage {
    Ready,
    Search {
        query: String,
        #[serde(default)]
        favorites_only: bool,
    },
    Insert {
        id: String,
    },
    Cancel,
    ToggleFavorite {
        id: String,
    },
    ClearRecent,
    ToggleTag {
        tag: String,
    },
    ApplyTagSuggestion {
        tag: String,
    },
    ClearTags,
    SetHotkey {
        hotkey: String,
    },
    SetAutoPaste {
        value: bool,
    },
    SetAppendClipboard {
        value: bool,
    },
    SetRecentEnabled {
        value: bool,
    },
    SetPreviewChars {
        value: u32,
    },
    SetTopTagsLimit {
        value: u32,
    },
    SetTopTagsScope {
        use_results: bool,
    },
    SetShowShortcutsHint {
        value: bool,
    },
    CreatePrompt {
        name: String,
    },
    DeletePrompts {
        paths: Vec<String>,
    },
    OpenPrompt {
        path: String,
    },
    SetPromptsDir {
        path: String,
    },
    UpdateTags {
        paths: Vec<String>,
        #[serde(default)]
        add: Vec<String>,
        #[serde(default)]
        remove: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct UiPrompt<'a> {
    #[serde(flatten)]
    prompt: &'a PromptEntry,
    favorite: bool,
}

#[derive(Debug, Serialize)]
struct UiTag {
    tag: String,
    count: usize,
    active: bool,
}

#[derive(Debug, Serialize)]
struct UiSettings<'a> {
    hotkey: &'a str,
    active_hotkey: Option<&'a str>,
    prompts_dir: &'a str,
    auto_paste: bool,
    append_clipboard: bool,
    recent_enabled: bool,
    preview_chars: u32,
    top_tags_limit: u32,
    top_tags_use_results: bool,
    show_shortcuts_hint: bool,
}

#[derive(Debug, Serialize)]
struct UiState<'a> {
    query: &'a str,
    favorites_only: bool,
    has_filters: bool,
    has_tag_filters: bool,
    results: Vec<UiPrompt<'a>>,
    recent: Vec<UiPrompt<'a>>,
    top_tags: Vec<UiTag>,
    tag_suggestions: Vec<&'a str>,
    all_tags: &'a [String],
    settings: UiSettings<'a>,
    status: Status,
}

struct TrayHandle {
    _tray: TrayIcon,
    show_id: MenuId,
    hide_id: MenuId,
    quit_id: MenuId,
}

#[derive(Debug)]
enum UserEvent {
    Ipc(IpcMessage),
    Menu(MenuEvent),
    Hotkey(u32),
    Activate,
    PromptsChanged,
}

pub type AppResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

struct PromptDeck {
    state: AppState,
    window: Option<Arc<Window>>,
    webview: Option<WebView>,
    tray: Option<TrayHandle>,
    proxy: EventLoopProxy<UserEvent>,
}

impl PromptDeck {
    fn new(proxy: EventLoopProxy<UserEvent>) -> AppResult<Self> {
        let cfg = config::load_or_init()?;
        let clipboard =
            Clipboard::new().map_err(|e| format!("Failed to access clipboard: {}", e))?;
        let registrar = GlobalRegistrar::new()?;

        let mut library = PromptLibrary::open(cfg.prompts_root(), cfg.preview_chars as usize)?;
        if let Err(err) = library.seed_if_empty() {
            tracing::warn!(event_type = "seed", error = %err, "failed to seed prompts");
        }

        let activate_proxy = Mutex::new(proxy.clone());
        let on_activate: ActivationHandler = Arc::new(move || {
            if let Ok(proxy) = activate_proxy.lock() {
                let _ = proxy.send_event(UserEvent::Activate);
            }
        });

        let mut state = AppState {
            cfg,
            clipboard,
            library,
            hotkey: LauncherHotkey::new(registrar),
            on_activate,
            gate: LauncherGate::new(),
            query: String::new(),
            favorites_only: false,
            results: Vec::new(),
            status: Status::default(),
            _watcher: None,
            proxy: proxy.clone(),
        };
        run_search(&mut state);

        Ok(Self {
            state,
            window: None,
            webview: None,
            tray: None,
            proxy,
        })
    }
}

impl ApplicationHandler<UserEvent> for PromptDeck {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("PromptDeck")
            .with_visible(false)
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_inner_size(LogicalSize::new(PANEL_WIDTH, PANEL_HEIGHT));

        let window = match event_loop.create_window(window_attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                tracing::error!(error = %e, "failed to create window");
                event_loop.exit();
                return;
            }
        };

        // Child webview; replacing winit's contentView panics on macOS.
        let html = include_str!("../assets/panel.html");
        let proxy = self.proxy.clone();
        let webview = match WebViewBuilder::new()
            .with_html(html)
            .with_ipc_handler(move |req: Request<String>| {
                match serde_json::from_str::<IpcMessage>(req.body()) {
                    Ok(msg) => {
                        let _ = proxy.send_event(UserEvent::Ipc(msg));
                    }
                    Err(err) => {
                        tracing::warn!(event_type = "ipc", error = %err, "dropping malformed message");
                    }
                }
            })
            .with_bounds(wry::Rect {
                position: wry::dpi::Position::Logical(wry::dpi::LogicalPosition::new(0.0, 0.0)),
                size: wry::dpi::Size::Logical(wry::dpi::LogicalSize::new(
                    PANEL_WIDTH,
                    PANEL_HEIGHT,
                )),
            })
            .build_as_child(&window)
        {
            Ok(wv) => wv,
            Err(e) => {
                tracing::error!(error = %e, "failed to create webview");
                event_loop.exit();
                return;
            }
        };

        let tray = match build_tray() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to create tray");
                event_loop.exit();
                return;
            }
        };

        bind_startup_hotkey(&mut self.state);

        let hotkey_proxy = self.proxy.clone();
        std::thread::spawn(move || {
            let rx = GlobalHotKeyEvent::receiver();
            while let Ok(event) = rx.recv() {
                if event.state() == HotKeyState::Pressed {
                    let _ = hotkey_proxy.send_event(UserEvent::Hotkey(event.id()));
                }
            }
        });

        let menu_proxy = self.proxy.clone();
        std::thread::spawn(move || {
            let rx = MenuEvent::receiver();
            while let Ok(event) = rx.recv() {
                let _ = menu_proxy.send_event(UserEvent::Menu(event));
            }
        });

        restart_watcher(&mut self.state);

        self.window = Some(window);
        self.webview = Some(webview);
        self.tray = Some(tray);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Focused(false) => {
                if let Some(window) = &self.window {
                    window.set_visible(false);
                }
            }
            WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(webview) = &self.webview {
                    let _ = webview.set_bounds(wry::Rect {
                        position: wry::dpi::Position::Logical(wry::dpi::LogicalPosition::new(
                            0.0, 0.0,
                        )),
                        size: wry::dpi::Size::Physical(wry::dpi::PhysicalSize::new(
                            size.width,
                            size.height,
                        )),
                    });
                }
            }
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        let Some(window) = &self.window else { return };
        let Some(webview) = &self.webview else { return };
        let Some(tray) = &self.tray else { return };

        match event {
            UserEvent::Ipc(msg) => {
                handle_ipc(&mut self.state, msg, window, webview);
            }
            UserEvent::Menu(event) => {
                if event.id == tray.show_id {
                    if self.state.gate.request_show() {
                        show_panel(&mut self.state, window, webview);
                    }
                } else if event.id == tray.hide_id {
                    window.set_visible(false);
                } else if event.id == tray.quit_id {
                    event_loop.exit();
                }
            }
            UserEvent::Hotkey(id) => {
                if !self.state.hotkey.registrar().dispatch(id) {
                    tracing::debug!(event_type = "hotkey", id, "no handler for hotkey");
                }
            }
            UserEvent::Activate => match self.state.gate.allow_toggle(Instant::now()) {
                GateDecision::Proceed => {
                    if window.is_visible().unwrap_or(false) {
                        window.set_visible(false);
                    } else {
                        show_panel(&mut self.state, window, webview);
                    }
                }
                GateDecision::Debounced => {}
                GateDecision::DeferShow => {
                    tracing::debug!(event_type = "panel", "panel not ready, show deferred");
                }
            },
            UserEvent::PromptsChanged => {
                self.state.library.refresh();
                run_search(&mut self.state);
                send_state(&mut self.state, webview);
            }
        }
    }
}

pub fn run() -> AppResult<()> {
    // Tray-only app: no dock icon.
    #[cfg(target_os = "macos")]
    {
        use objc2_app_kit::{NSApplication, NSApplicationActivationPolicy};
        use objc2_foundation::MainThreadMarker;

        if let Some(mtm) = MainThreadMarker::new() {
            let app = NSApplication::sharedApplication(mtm);
            app.setActivationPolicy(NSApplicationActivationPolicy::Accessory);
        }
    }

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .map_err(|e| format!("Failed to create event loop: {}", e))?;

    let proxy = event_loop.create_proxy();
    let mut app = PromptDeck::new(proxy)?;

    event_loop
        .run_app(&mut app)
        .map_err(|e| format!("Event loop error: {}", e))?;

    Ok(())
}

fn build_tray() -> AppResult<TrayHandle> {
    let menu = Menu::new();
    let show_item = MenuItem::new("Show PromptDeck", true, None);
    let hide_item = MenuItem::new("Hide", true, None);
    let quit_item = MenuItem::new("Quit", true, None);
    let show_id = show_item.id().clone();
    let hide_id = hide_item.id().clone();
    let quit_id = quit_item.id().clone();
    menu.append(&show_item).map_err(boxed)?;
    menu.append(&hide_item).map_err(boxed)?;
    menu.append(&quit_item).map_err(boxed)?;

    let icon = load_icon()?;
    let tray = TrayIconBuilder::new()
        .with_menu(Box::new(menu))
        .with_tooltip("PromptDeck")
        .with_icon(icon)
        .build()
        .map_err(boxed)?;

    Ok(TrayHandle {
        _tray: tray,
        show_id,
        hide_id,
        quit_id,
    })
}

fn boxed<E: Error + Send + Sync + 'static>(err: E) -> Box<dyn Error + Send + Sync> {
    Box::new(err)
}

fn load_icon() -> AppResult<tray_icon::Icon> {
    tray_icon::Icon::from_rgba(tray_icon_rgba(TRAY_ICON_SIZE), TRAY_ICON_SIZE, TRAY_ICON_SIZE)
        .map_err(|e| format!("Failed to create icon: {}", e).into())
}

/// A filled disc with a white core, as raw RGBA.
fn tray_icon_rgba(size: u32) -> Vec<u8> {
    let center = (size as f32 - 1.0) / 2.0;
    let outer = size as f32 / 2.0 - 1.0;
    let inner = outer * 0.45;
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let dist = (dx * dx + dy * dy).sqrt();
            let pixel = if dist <= inner {
                [255, 255, 255, 255]
            } else if dist <= outer {
                [52, 120, 246, 255]
            } else {
                [0, 0, 0, 0]
            };
            rgba.extend_from_slice(&pixel);
        }
    }
    rgba
}

fn bind_startup_hotkey(state: &mut AppState) {
    let configured = state.cfg.hotkey.trim().to_string();
    let outcome = state
        .hotkey
        .bind_initial(&configured, DEFAULT_HOTKEY, state.on_activate.clone());
    state.status = rebind_status(&configured, &outcome);
}

/// Panel messages for a rebind of `requested`: an error when nothing new was
/// bound, a warning for a leaked binding or a fallback shortcut.
fn rebind_status(requested: &str, outcome: &RebindOutcome) -> Status {
    let mut status = Status::default();
    if let Some(err) = &outcome.registration_error {
        status.error = Some(format!("Could not register \"{requested}\": {err}"));
    } else if let Some(err) = &outcome.unregistration_error {
        status.warning = Some(format!(
            "\"{requested}\" is active, but the previous hotkey could not be released: {err}"
        ));
    } else if let Some(active) = outcome.resulting_shortcut.as_deref()
        && active != requested
    {
        status.warning = Some(format!(
            "Hotkey \"{requested}\" is unavailable; using {active} for now"
        ));
    }
    status
}

fn restart_watcher(state: &mut AppState) {
    state._watcher = None;
    let proxy = state.proxy.clone();
    match state.library.watch(move || {
        let _ = proxy.send_event(UserEvent::PromptsChanged);
    }) {
        Ok(watcher) => state._watcher = Some(watcher),
        Err(err) => {
            tracing::warn!(event_type = "watch", error = %err, "prompt directory is not watched");
        }
    }
}

fn set_prompts_dir(state: &mut AppState, raw: &str) {
    let dir = raw.trim();
    if dir.is_empty() {
        state.status.error = Some("Prompts folder cannot be empty".to_string());
        return;
    }
    match state.library.set_root(dir) {
        Ok(()) => {
            state.cfg.prompts_dir = state.library.root().to_string_lossy().to_string();
            persist_config(state);
            restart_watcher(state);
            run_search(state);
        }
        Err(err) => {
            state.status.error = Some(format!("Cannot use {dir}: {err}"));
        }
    }
}

fn open_prompt(state: &mut AppState, path: &str, window: &Window) {
    let target = match state.library.resolve_prompt_path(path) {
        Ok(target) => target,
        Err(err) => {
            state.status.error = Some(err.to_string());
            return;
        }
    };
    match open::that(&target) {
        Ok(()) => {
            tracing::info!(event_type = "prompt_opened", path = %target.display(), "opened prompt");
            window.set_visible(false);
        }
        Err(err) => {
            tracing::warn!(event_type = "prompt_opened", path = %target.display(), error = %err, "failed to open prompt");
            state.status.error = Some(format!("Failed to open {}: {err}", target.display()));
        }
    }
}

fn show_panel(state: &mut AppState, window: &Window, webview: &WebView) {
    run_search(state);
    send_state(state, webview);
    window.set_visible(true);
    window.focus_window();
    let _ = webview.evaluate_script("window.__FOCUS_SEARCH__ && window.__FOCUS_SEARCH__();");
}

fn handle_ipc(state: &mut AppState, msg: IpcMessage, window: &Window, webview: &WebView) {
    match msg {
        IpcMessage::Ready => {
            let show = state.gate.set_ui_ready();
            if show {
                show_panel(state, window, webview);
                return;
            }
        }
        IpcMessage::Search {
            query,
            favorites_only,
        } => {
            state.query = query;
            state.favorites_only = favorites_only;
            run_search(state);
        }
        IpcMessage::Insert { id } => {
            insert_prompt(state, &id, window);
        }
        IpcMessage::Cancel => {
            window.set_visible(false);
            return;
        }
        IpcMessage::ToggleFavorite { id } => {
            state.cfg.toggle_favorite(&id);
            persist_config(state);
            run_search(state);
        }
        IpcMessage::ClearRecent => {
            state.cfg.clear_recent();
            persist_config(state);
        }
        IpcMessage::ToggleTag { tag } => {
            state.query = toggle_tag_filter(&state.query, &tag);
            run_search(state);
        }
        IpcMessage::ApplyTagSuggestion { tag } => {
            state.query = apply_tag_suggestion(&state.query, &tag);
            run_search(state);
        }
        IpcMessage::ClearTags => {
            state.query = clear_tag_filters(&state.query);
            run_search(state);
        }
        IpcMessage::SetHotkey { hotkey } => {
            set_hotkey(state, &hotkey);
        }
        IpcMessage::SetAutoPaste { value } => {
            state.cfg.auto_paste = value;
            persist_config(state);
        }
        IpcMessage::SetAppendClipboard { value } => {
            state.cfg.append_clipboard = value;
            persist_config(state);
        }
        IpcMessage::SetRecentEnabled { value } => {
            state.cfg.recent_enabled = value;
            persist_config(state);
        }
        IpcMessage::SetPreviewChars { value } => {
            let preview_chars = state.cfg.set_preview_chars(value);
            state.library.set_preview_chars(preview_chars as usize);
            persist_config(state);
            run_search(state);
        }
        IpcMessage::SetTopTagsLimit { value } => {
            state.cfg.set_top_tags_limit(value);
            persist_config(state);
        }
        IpcMessage::SetTopTagsScope { use_results } => {
            state.cfg.top_tags_use_results = use_results;
            persist_config(state);
        }
        IpcMessage::SetShowShortcutsHint { value } => {
            state.cfg.show_shortcuts_hint = value;
            persist_config(state);
        }
        IpcMessage::CreatePrompt { name } => match state.library.create_prompt_file(&name) {
            Ok(path) => {
                state.status.notice = Some(format!("Created {}", path.display()));
            }
            Err(err) => {
                state.status.error = Some(err.to_string());
            }
        },
        IpcMessage::DeletePrompts { paths } => match state.library.delete_prompt_files(&paths) {
            Ok(deleted) => {
                state.status.notice = Some(format!("Deleted {} prompt(s)", deleted.files));
                state.cfg.forget_prompts(&deleted.ids);
                persist_config(state);
                run_search(state);
            }
            Err(err) => {
                state.status.error = Some(err.to_string());
            }
        },
        IpcMessage::OpenPrompt { path } => {
            open_prompt(state, &path, window);
        }
        IpcMessage::SetPromptsDir { path } => {
            set_prompts_dir(state, &path);
        }
        IpcMessage::UpdateTags { paths, add, remove } => {
            match state.library.update_prompt_tags(&paths, &add, &remove) {
                Ok(()) => run_search(state),
                Err(err) => state.status.error = Some(err.to_string()),
            }
        }
    }
    send_state(state, webview);
}

fn set_hotkey(state: &mut AppState, raw: &str) {
    let next = match normalize_descriptor(raw) {
        Ok(next) => next,
        Err(err) => {
            state.status.error = Some(format!("Invalid hotkey: {err}"));
            return;
        }
    };

    let outcome = state.hotkey.rebind(&next, state.on_activate.clone());
    state.status = rebind_status(&next, &outcome);
    if state.cfg.apply_rebind(&outcome) {
        persist_config(state);
    }
}

fn insert_prompt(state: &mut AppState, id: &str, window: &Window) {
    let Some(body) = state.library.find(id).map(|prompt| prompt.body.clone()) else {
        state.status.error = Some("Prompt no longer exists".to_string());
        return;
    };

    let previous = if state.cfg.append_clipboard {
        state.clipboard.get_text().ok()
    } else {
        None
    };
    let text = compose_insert_text(&body, previous.as_deref());
    if let Err(e) = state.clipboard.set_text(text) {
        state.status.error = Some(format!("Failed to copy: {}", e));
        return;
    }

    window.set_visible(false);
    if state.cfg.auto_paste {
        std::thread::sleep(PASTE_FOCUS_DELAY);
        send_paste_chord();
    }

    if state.cfg.recent_enabled {
        state.cfg.push_recent(id, Utc::now().timestamp_millis());
        persist_config(state);
    }
    tracing::info!(event_type = "insert", id, auto_paste = state.cfg.auto_paste, "prompt inserted");
}

fn compose_insert_text(body: &str, previous: Option<&str>) -> String {
    match previous {
        Some(previous) if !previous.trim().is_empty() => format!("{body}\n\n{previous}"),
        _ => body.to_string(),
    }
}

fn send_paste_chord() {
    #[cfg(target_os = "macos")]
    let modifier = Key::Meta;
    #[cfg(not(target_os = "macos"))]
    let modifier = Key::Control;

    // enigo 0.1 doesn't report errors; short gaps keep the events ordered.
    let mut enigo = Enigo::new();
    enigo.key_down(modifier);
    std::thread::sleep(Duration::from_millis(10));
    enigo.key_click(Key::Layout('v'));
    std::thread::sleep(Duration::from_millis(10));
    enigo.key_up(modifier);
}

fn run_search(state: &mut AppState) {
    let favorites = state
        .favorites_only
        .then(|| state.cfg.favorites.as_slice());
    state.results = state.library.search(&state.query, SEARCH_LIMIT, favorites);
}

fn send_state(state: &mut AppState, webview: &WebView) {
    if !state.gate.is_ready() {
        return;
    }
    let status = std::mem::take(&mut state.status);
    let cfg = &state.cfg;
    let all_tags = state.library.all_tags();

    let recent = if cfg.recent_enabled && !has_any_filters(&state.query, state.favorites_only)
    {
        build_recent_list(state.library.prompts(), &cfg.recent_ids)
            .into_iter()
            .map(|item| ui_prompt(cfg, item.prompt))
            .collect()
    } else {
        Vec::new()
    };

    let tag_source: &[PromptEntry] = if cfg.top_tags_use_results {
        &state.results
    } else {
        state.library.prompts()
    };
    let top_tags = build_top_tags(tag_source, cfg.top_tags_limit as usize)
        .into_iter()
        .map(|entry| UiTag {
            active: is_tag_active(&state.query, &entry.tag),
            tag: entry.tag,
            count: entry.count,
        })
        .collect();

    let ui_state = UiState {
        query: &state.query,
        favorites_only: state.favorites_only,
        has_filters: has_any_filters(&state.query, state.favorites_only),
        has_tag_filters: has_tag_filters(&state.query),
        results: state.results.iter().map(|prompt| ui_prompt(cfg, prompt)).collect(),
        recent,
        top_tags,
        tag_suggestions: tag_suggestions(&state.query, &all_tags),
        all_tags: &all_tags,
        settings: UiSettings {
            hotkey: &cfg.hotkey,
            active_hotkey: state.hotkey.current(),
            prompts_dir: &cfg.prompts_dir,
            auto_paste: cfg.auto_paste,
            append_clipboard: cfg.append_clipboard,
            recent_enabled: cfg.recent_enabled,
            preview_chars: cfg.preview_chars,
            top_tags_limit: cfg.top_tags_limit,
            top_tags_use_results: cfg.top_tags_use_results,
            show_shortcuts_hint: cfg.show_shortcuts_hint,
        },
        status,
    };

    match serde_json::to_string(&ui_state) {
        Ok(payload) => {
            let script = format!("window.__SET_STATE__({});", payload);
            if let Err(err) = webview.evaluate_script(&script) {
                tracing::warn!(event_type = "ipc", error = %err, "failed to push panel state");
            }
        }
        Err(err) => {
            tracing::error!(event_type = "ipc", error = %err, "failed to serialize panel state");
        }
    }
}

fn ui_prompt<'a>(cfg: &AppConfig, prompt: &'a PromptEntry) -> UiPrompt<'a> {
    UiPrompt {
        prompt,
        favorite: cfg.is_favorite(&prompt.id),
    }
}

fn persist_config(state: &mut AppState) {
    if let Err(err) = config::save(&state.cfg) {
        tracing::error!(event_type = "config", error = %err, "failed to save config");
        state.status.error = Some(format!("Failed to save settings: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{RegistrationError, UnregistrationError};

    #[test]
    fn ipc_messages_use_snake_case_tags() {
        let msg: IpcMessage =
            serde_json::from_str(r#"{"type":"set_hotkey","hotkey":"Alt+P"}"#).unwrap();
        assert!(matches!(msg, IpcMessage::SetHotkey { hotkey } if hotkey == "Alt+P"));

        let msg: IpcMessage = serde_json::from_str(r##"{"type":"search","query":"#a"}"##).unwrap();
        assert!(matches!(
            msg,
            IpcMessage::Search { query, favorites_only: false } if query == "#a"
        ));

        let msg: IpcMessage =
            serde_json::from_str(r#"{"type":"update_tags","paths":["/p/a.txt"],"add":["x"]}"#)
                .unwrap();
        assert!(matches!(
            msg,
            IpcMessage::UpdateTags { paths, add, remove }
                if paths.len() == 1 && add == vec!["x".to_string()] && remove.is_empty()
        ));
    }

    #[test]
    fn folder_messages_carry_paths() {
        let msg: IpcMessage =
            serde_json::from_str(r#"{"type":"set_prompts_dir","path":"/tmp/prompts"}"#).unwrap();
        assert!(matches!(msg, IpcMessage::SetPromptsDir { path } if path == "/tmp/prompts"));

        let msg: IpcMessage =
            serde_json::from_str(r#"{"type":"open_prompt","path":"/p/a.txt"}"#).unwrap();
        assert!(matches!(msg, IpcMessage::OpenPrompt { path } if path == "/p/a.txt"));
    }

    fn outcome(resulting: Option<&str>) -> RebindOutcome {
        RebindOutcome {
            resulting_shortcut: resulting.map(str::to_string),
            registration_error: None,
            registered: true,
            unregistered: true,
            unregistration_error: None,
        }
    }

    #[test]
    fn rebind_status_is_quiet_on_success() {
        let status = rebind_status("Alt+P", &outcome(Some("Alt+P")));
        assert!(status.error.is_none());
        assert!(status.warning.is_none());
    }

    #[test]
    fn aborted_rebind_reports_error_and_keeps_current() {
        let mut aborted = outcome(Some("Alt+Space"));
        aborted.registered = false;
        aborted.unregistered = false;
        aborted.registration_error = Some(RegistrationError::Conflict("Alt+P".into()));

        let status = rebind_status("Alt+P", &aborted);
        let error = status.error.unwrap();
        assert!(error.contains("Could not register \"Alt+P\""));
        assert!(error.contains("already in use"));
        assert!(status.warning.is_none());
    }

    #[test]
    fn leaked_binding_reports_warning() {
        let mut leaked = outcome(Some("Alt+P"));
        leaked.unregistered = false;
        leaked.unregistration_error = Some(UnregistrationError::NotRegistered("Alt+Space".into()));

        let status = rebind_status("Alt+P", &leaked);
        assert!(status.error.is_none());
        let warning = status.warning.unwrap();
        assert!(warning.contains("\"Alt+P\" is active"));
        assert!(warning.contains("Alt+Space"));
    }

    #[test]
    fn startup_fallback_reports_active_hotkey() {
        let status = rebind_status("Ctrl+Shift+K", &outcome(Some(DEFAULT_HOTKEY)));
        assert!(status.error.is_none());
        assert_eq!(
            status.warning.as_deref(),
            Some("Hotkey \"Ctrl+Shift+K\" is unavailable; using Alt+Space for now")
        );
    }

    #[test]
    fn unknown_ipc_type_is_rejected() {
        assert!(serde_json::from_str::<IpcMessage>(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn insert_text_appends_previous_clipboard() {
        assert_eq!(compose_insert_text("body", None), "body");
        assert_eq!(compose_insert_text("body", Some("  ")), "body");
        assert_eq!(compose_insert_text("body", Some("clip")), "body\n\nclip");
    }

    #[test]
    fn tray_icon_is_a_disc() {
        let size = TRAY_ICON_SIZE;
        let rgba = tray_icon_rgba(size);
        assert_eq!(rgba.len(), (size * size * 4) as usize);

        let pixel = |x: u32, y: u32| {
            let i = ((y * size + x) * 4) as usize;
            [rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]]
        };
        assert_eq!(pixel(size / 2, size / 2), [255, 255, 255, 255]);
        assert_eq!(pixel(0, 0)[3], 0);
        assert_eq!(pixel(size / 2, 2)[3], 255);
    }

    #[test]
    fn prompt_serializes_flat_with_favorite_flag() {
        let prompt = PromptEntry {
            id: "/p/a.txt".to_string(),
            title: "a".to_string(),
            body: "b".to_string(),
            preview: "b".to_string(),
            tags: vec!["x".to_string()],
            path: "/p/a.txt".to_string(),
        };
        let value = serde_json::to_value(UiPrompt {
            prompt: &prompt,
            favorite: true,
        })
        .unwrap();
        assert_eq!(value["title"], "a");
        assert_eq!(value["favorite"], true);
        assert_eq!(value["tags"][0], "x");
    }
}
