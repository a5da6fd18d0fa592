//! The main chat event loop: draw, poll input, drain the transport and
//! animation channels. Everything async happens on spawned tasks; this loop
//! is the single owner of [`App`] state, so there is no lock to contend.

use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::commands::{process_input, CommandResult};
use crate::core::animator::{AnimationMessage, AnimationParams, AnimatorService};
use crate::core::app::App;
use crate::core::config::Config;
use crate::core::transport::{ChatTransport, TransportEvent, TransportOp, TransportService};
use crate::ui::renderer::{build_display_lines, max_scroll_offset, transcript_viewport_height, ui};
use crate::utils::logging::LoggingState;

pub struct ChatSetup {
    pub model: String,
    pub server_url: String,
    pub log_file: Option<String>,
    pub config: Config,
}

enum LoopAction {
    Continue,
    Quit,
}

pub async fn run_chat(setup: ChatSetup) -> Result<(), Box<dyn Error>> {
    let logging = LoggingState::new(setup.log_file)?;
    let mut app = App::new(setup.model, logging, setup.config.animation_options());
    let transport = ChatTransport::new(&setup.server_url);

    let (transport_service, mut transport_rx) = TransportService::new();
    let (animator_service, mut animation_rx) = AnimatorService::new();

    // Pick up any server-side history for this session before first draw.
    transport_service.spawn_history(
        transport.clone(),
        app.session.id().to_string(),
        app.current_request_id(),
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(
        &mut terminal,
        &mut app,
        &transport,
        &transport_service,
        &animator_service,
        &mut transport_rx,
        &mut animation_rx,
    )
    .await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

#[allow(clippy::too_many_arguments)]
async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    transport: &ChatTransport,
    transport_service: &TransportService,
    animator_service: &AnimatorService,
    transport_rx: &mut tokio::sync::mpsc::UnboundedReceiver<(TransportEvent, u64)>,
    animation_rx: &mut tokio::sync::mpsc::UnboundedReceiver<(AnimationMessage, u64)>,
) -> Result<(), Box<dyn Error>> {
    // Filename the next export should land in, captured at command time.
    let mut export_target: Option<String> = None;

    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Enter => {
                        let input = std::mem::take(&mut app.input);
                        if let LoopAction::Quit = dispatch_input(
                            app,
                            &input,
                            transport,
                            transport_service,
                            &mut export_target,
                        ) {
                            return Ok(());
                        }
                    }
                    KeyCode::Esc => {
                        if !app.cancel_current() {
                            app.input.clear();
                        }
                    }
                    KeyCode::Char(c) => {
                        app.input.push(c);
                    }
                    KeyCode::Backspace => {
                        app.input.pop();
                    }
                    KeyCode::Up => scroll_by(app, terminal, -1),
                    KeyCode::Down => scroll_by(app, terminal, 1),
                    KeyCode::PageUp => {
                        let page = viewport_height(terminal) as i32;
                        scroll_by(app, terminal, -page);
                    }
                    KeyCode::PageDown => {
                        let page = viewport_height(terminal) as i32;
                        scroll_by(app, terminal, page);
                    }
                    _ => {}
                },
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => scroll_by(app, terminal, -3),
                    MouseEventKind::ScrollDown => scroll_by(app, terminal, 3),
                    _ => {}
                },
                _ => {}
            }
        }

        while let Ok((message, animation_id)) = animation_rx.try_recv() {
            match message {
                AnimationMessage::Frame(content) => {
                    app.apply_animation_frame(animation_id, content)
                }
                AnimationMessage::Done => app.finish_animation(animation_id),
            }
        }

        while let Ok((transport_event, request_id)) = transport_rx.try_recv() {
            handle_transport_event(
                app,
                transport,
                transport_service,
                animator_service,
                transport_event,
                request_id,
                &mut export_target,
            );
        }
    }
}

fn dispatch_input(
    app: &mut App,
    input: &str,
    transport: &ChatTransport,
    transport_service: &TransportService,
    export_target: &mut Option<String>,
) -> LoopAction {
    match process_input(app, input) {
        CommandResult::Continue => {}
        CommandResult::Quit => return LoopAction::Quit,
        CommandResult::ProcessAsMessage(text) => {
            let text = text.trim().to_string();
            if !text.is_empty() {
                let start = app.begin_send(text.clone());
                transport_service.spawn_send(
                    transport.clone(),
                    app.session.id().to_string(),
                    app.model.clone(),
                    text,
                    start.cancel,
                    start.request_id,
                );
            }
        }
        CommandResult::Clear => {
            transport_service.spawn_clear(
                transport.clone(),
                app.session.id().to_string(),
                app.current_request_id(),
            );
        }
        CommandResult::Delete(index) => {
            transport_service.spawn_delete(
                transport.clone(),
                app.session.id().to_string(),
                index,
                app.current_request_id(),
            );
        }
        CommandResult::Export(target) => {
            *export_target = target;
            transport_service.spawn_export(
                transport.clone(),
                app.session.id().to_string(),
                app.current_request_id(),
            );
        }
        CommandResult::Import(path) => match read_import_document(&path) {
            Ok((document, id)) => {
                transport_service.spawn_import(
                    transport.clone(),
                    document,
                    id,
                    app.current_request_id(),
                );
            }
            Err(err) => app.add_app_error(format!("Failed to import chat: {err}")),
        },
        CommandResult::SetModel(model) => {
            app.set_status(format!("Model set to {model}"));
            app.model = model;
        }
        CommandResult::ListModels => {
            transport_service.spawn_models(transport.clone(), app.current_request_id());
        }
    }
    LoopAction::Continue
}

fn handle_transport_event(
    app: &mut App,
    transport: &ChatTransport,
    transport_service: &TransportService,
    animator_service: &AnimatorService,
    transport_event: TransportEvent,
    request_id: u64,
    export_target: &mut Option<String>,
) {
    match transport_event {
        TransportEvent::Reply(reply) => {
            if let Some(start) = app.accept_reply(request_id, reply) {
                animator_service.spawn_animation(AnimationParams {
                    raw: start.raw,
                    options: app.animation_options,
                    cancel: start.cancel,
                    animation_id: start.animation_id,
                });
            }
        }
        TransportEvent::Failed {
            op: TransportOp::Send,
            error,
        } => app.fail_send(request_id, &error),
        TransportEvent::Failed { op, error } => {
            if op == TransportOp::Import {
                app.add_app_error(format!("Failed to import chat: {error}"));
            } else {
                app.add_app_error(error.to_string());
            }
        }
        TransportEvent::Deleted { index, outcome } => {
            app.apply_delete(index, outcome);
            app.set_status(if outcome.pair_removed {
                "Message and its reply deleted".to_string()
            } else {
                "Message deleted".to_string()
            });
        }
        TransportEvent::Cleared => app.apply_clear(),
        TransportEvent::History(snapshot) => app.apply_history(snapshot),
        TransportEvent::Exported(document) => {
            let path = export_target.take().unwrap_or_else(default_export_name);
            match write_export(Path::new(&path), &document) {
                Ok(()) => app.set_status(format!("Exported to {path}")),
                Err(err) => app.add_app_error(format!("Export failed: {err}")),
            }
        }
        TransportEvent::Imported { id } => {
            app.adopt_import(id);
            app.messages.clear();
            transport_service.spawn_history(
                transport.clone(),
                app.session.id().to_string(),
                app.current_request_id(),
            );
            app.set_status("Chat imported");
        }
        TransportEvent::Models(models) => {
            let mut listing = String::from("Available models:");
            for model in &models {
                if *model == app.model {
                    listing.push_str(&format!("\n  * {model} (current)"));
                } else {
                    listing.push_str(&format!("\n    {model}"));
                }
            }
            app.add_app_info(listing);
        }
    }
}

fn scroll_by(app: &mut App, terminal: &Terminal<CrosstermBackend<io::Stdout>>, delta: i32) {
    let viewport = viewport_height(terminal);
    let max = max_scroll_offset(build_display_lines(app).len(), viewport);

    let current = if app.auto_scroll {
        max
    } else {
        app.scroll_offset.min(max)
    };
    let next = (current as i32 + delta).clamp(0, max as i32) as u16;

    app.scroll_offset = next;
    // Scrolling back to the bottom re-engages follow mode.
    app.auto_scroll = next >= max;
}

fn viewport_height(terminal: &Terminal<CrosstermBackend<io::Stdout>>) -> u16 {
    let height = terminal.size().map(|size| size.height).unwrap_or(0);
    // Status line and the input box sit below the transcript.
    transcript_viewport_height(height.saturating_sub(4))
}

fn default_export_name() -> String {
    format!("chat_export_{}.json", chrono::Utc::now().format("%Y-%m-%d"))
}

fn read_import_document(path: &str) -> Result<(Value, String), Box<dyn Error>> {
    let contents = std::fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&contents)?;
    let id = crate::api::exported_chat_id(&document)
        .ok_or("export document has no session id")?
        .to_string();
    if document.get("messages").is_none() {
        return Err("export document has no messages".into());
    }
    Ok((document, id))
}

fn write_export(path: &Path, document: &Value) -> Result<(), Box<dyn Error>> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp_file = match parent {
        Some(parent) => NamedTempFile::new_in(parent)?,
        None => NamedTempFile::new_in(".")?,
    };
    temp_file.write_all(serde_json::to_string_pretty(document)?.as_bytes())?;
    temp_file.flush()?;
    temp_file.persist(path)?;
    Ok(())
}
