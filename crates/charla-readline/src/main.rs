use std::borrow::Cow::{self, Borrowed, Owned};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::Editor;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use tokio::sync::mpsc;

use charla_core::config::ClientConfig;
use charla_core::notes::NoteSummary;
use charla_core::session::{Role, Turn};
use charla_interaction::{NoteOutcome, SendOutcome, SessionManager, UploadOutcome};

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: vec![
                "/rag".to_string(),
                "/wiki".to_string(),
                "/upload".to_string(),
                "/note".to_string(),
                "/notes".to_string(),
                "/historial".to_string(),
                "/status".to_string(),
                "/help".to_string(),
            ],
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

/// Events sent from background flows to the printer task.
enum UiEvent {
    Assistant {
        content: String,
        sources: Vec<String>,
    },
    UploadStatus(String),
    NoteSaved(NoteSummary),
    Notice(String),
    Error(String),
}

fn print_turn(turn: &Turn) {
    match turn.role {
        Role::System => println!("{}", format!("[system] {}", turn.content).bright_black()),
        Role::User => println!("{}", format!("> {}", turn.content).green()),
        Role::Assistant => {
            for line in turn.content.lines() {
                println!("{}", line.bright_blue());
            }
        }
    }
}

fn print_notes(notes: &[NoteSummary]) {
    if notes.is_empty() {
        println!("{}", "No hay notas todavía.".bright_black());
        return;
    }
    println!("{}", "Notas recientes:".bright_magenta());
    for note in notes {
        println!(
            "  {} {}",
            format!("- {}", note.title).yellow(),
            format!("({})", note.created_at).bright_black()
        );
    }
}

fn print_help() {
    println!("{}", "Comandos:".bright_magenta());
    println!("{}", "  /rag            activa o desactiva la búsqueda en documentos".bright_black());
    println!("{}", "  /wiki           activa o desactiva la búsqueda en Wikipedia".bright_black());
    println!("{}", "  /upload <ruta>  sube un archivo al índice de documentos".bright_black());
    println!("{}", "  /note           guarda una nota nueva".bright_black());
    println!("{}", "  /notes          muestra las notas recientes".bright_black());
    println!("{}", "  /historial      vuelve a mostrar la conversación".bright_black());
    println!("{}", "  /status         muestra el estado de la última subida".bright_black());
    println!("{}", "  quit            salir".bright_black());
}

/// The main entry point for the Charla readline REPL.
///
/// This async function sets up a rustyline-based REPL that:
/// 1. Resolves the backend endpoint and initializes the session manager
/// 2. Probes backend health and loads the initial note listing
/// 3. Provides command completion for the slash commands
/// 4. Dispatches chat, upload, and note-save flows without blocking input
/// 5. Displays colored output for user, assistant, and system messages
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ===== Backend Initialization =====
    let config = ClientConfig::from_env();
    let manager = Arc::new(SessionManager::new(&config));
    tracing::info!("Starting session against {}", config.api_url);

    println!("{}", "=== Charla ===".bright_magenta().bold());
    println!(
        "{}",
        format!("Backend: {}", config.api_url).bright_black()
    );

    if manager.check_backend().await {
        tracing::info!("Backend healthy at {}", config.api_url);
    } else {
        tracing::warn!("Backend at {} is not responding", config.api_url);
        println!(
            "{}",
            "Aviso: el backend no responde; los envíos fallarán hasta que vuelva.".yellow()
        );
    }

    // One-time notes fetch; a failure leaves the list empty.
    manager.load_notes().await;

    // Channel for receiving flow results from background tasks
    let (event_tx, mut event_rx) = mpsc::channel::<UiEvent>(32);

    // Spawn printer task for flow results
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                UiEvent::Assistant { content, sources } => {
                    for line in content.lines() {
                        println!("{}", line.bright_blue());
                    }
                    if !sources.is_empty() {
                        println!(
                            "{}",
                            format!("Fuentes: {}", sources.join(", ")).bright_black()
                        );
                    }
                    println!();
                }
                UiEvent::UploadStatus(status) => {
                    println!("{}", status.yellow());
                }
                UiEvent::NoteSaved(note) => {
                    println!(
                        "{}",
                        format!("Nota guardada: {} (id {})", note.title, note.id).green()
                    );
                }
                UiEvent::Notice(message) => {
                    println!("{}", message.bright_black());
                }
                UiEvent::Error(message) => {
                    eprintln!("{}", message.red());
                }
            }
        }
    });

    // ===== REPL Setup =====
    let helper = CliHelper::new();
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));

    let toggles = manager.toggles().await;
    println!(
        "{}",
        format!(
            "RAG: {}  Wikipedia: {}",
            if toggles.use_rag { "sí" } else { "no" },
            if toggles.use_wiki { "sí" } else { "no" }
        )
        .bright_black()
    );
    println!(
        "{}",
        "Escribe un mensaje, '/help' para ver los comandos, o 'quit' para salir.".bright_black()
    );
    println!();

    // ===== Main REPL Loop =====
    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed == "quit" || trimmed == "exit" {
                    println!("{}", "¡Hasta luego!".bright_green());
                    break;
                }

                // Empty input is a no-op, not an error
                if trimmed.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);

                match trimmed.split_whitespace().next().unwrap_or_default() {
                    "/help" => print_help(),
                    "/rag" => {
                        let current = manager.toggles().await;
                        let toggles = manager.set_use_rag(!current.use_rag).await;
                        println!(
                            "{}",
                            format!("RAG: {}", if toggles.use_rag { "activado" } else { "desactivado" })
                                .yellow()
                        );
                    }
                    "/wiki" => {
                        let current = manager.toggles().await;
                        let toggles = manager.set_use_wiki(!current.use_wiki).await;
                        println!(
                            "{}",
                            format!(
                                "Wikipedia: {}",
                                if toggles.use_wiki { "activado" } else { "desactivado" }
                            )
                            .yellow()
                        );
                    }
                    "/notes" => print_notes(&manager.notes().await),
                    "/historial" => {
                        for turn in manager.history().await {
                            print_turn(&turn);
                        }
                    }
                    "/status" => {
                        let status = manager.upload_status().await;
                        if status.is_empty() {
                            println!("{}", "Sin subidas en esta sesión.".bright_black());
                        } else {
                            println!("{}", status.yellow());
                        }
                    }
                    "/upload" => {
                        // No file selected is a no-op; the status stays as it was
                        let arg = trimmed.strip_prefix("/upload").unwrap_or_default().trim();
                        if arg.is_empty() {
                            println!("{}", "Uso: /upload <ruta>".bright_black());
                            continue;
                        }
                        let path = PathBuf::from(arg);
                        let tx = event_tx.clone();
                        let task_manager = Arc::clone(&manager);
                        tokio::spawn(async move {
                            let _ = tx.send(UiEvent::UploadStatus(
                                charla_interaction::UPLOAD_IN_PROGRESS.to_string(),
                            ))
                            .await;
                            let event = match task_manager.upload_path(&path).await {
                                Ok(UploadOutcome::Indexed { chunks }) => UiEvent::UploadStatus(
                                    format!("Indexado: {chunks} fragmentos"),
                                ),
                                Ok(UploadOutcome::Rejected) => {
                                    UiEvent::Notice("Ruta sin nombre de archivo.".to_string())
                                }
                                Err(err) => UiEvent::Error(format!("Error al subir: {err}")),
                            };
                            let _ = tx.send(event).await;
                        });
                    }
                    "/note" => {
                        // Collecting: both fields gathered before dispatch;
                        // an empty one aborts the flow silently
                        let title = rl.readline("Título: ").unwrap_or_default();
                        let body = rl.readline("Contenido: ").unwrap_or_default();
                        if title.trim().is_empty() || body.trim().is_empty() {
                            continue;
                        }
                        let tx = event_tx.clone();
                        let task_manager = Arc::clone(&manager);
                        tokio::spawn(async move {
                            let event = match task_manager.save_note(&title, &body).await {
                                Ok(NoteOutcome::Saved(note)) => UiEvent::NoteSaved(note),
                                Ok(NoteOutcome::Rejected) => {
                                    UiEvent::Notice("Nota vacía, descartada.".to_string())
                                }
                                Err(err) => {
                                    UiEvent::Error(format!("No se pudo guardar la nota: {err}"))
                                }
                            };
                            let _ = tx.send(event).await;
                        });
                    }
                    _ if trimmed.starts_with('/') => {
                        println!("{}", "Comando desconocido; prueba /help".bright_black());
                    }
                    _ => {
                        // Chat flow: one request in flight per send trigger
                        if manager.is_sending() {
                            println!(
                                "{}",
                                "Espera la respuesta anterior antes de enviar otro mensaje."
                                    .yellow()
                            );
                            continue;
                        }

                        println!("{}", format!("> {}", trimmed).green());

                        let tx = event_tx.clone();
                        let task_manager = Arc::clone(&manager);
                        let input = trimmed.to_string();
                        tokio::spawn(async move {
                            let event = match task_manager.send_message(&input).await {
                                Ok(SendOutcome::Answered { content, sources }) => {
                                    UiEvent::Assistant { content, sources }
                                }
                                Ok(SendOutcome::Rejected) => return,
                                Err(err) => UiEvent::Error(format!("Error en el chat: {err}")),
                            };
                            let _ = tx.send(event).await;
                        });
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detectado. Escribe 'quit' para salir.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detectado. Saliendo...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {err:?}").red());
                break;
            }
        }
    }

    // Drop the channel to signal shutdown
    drop(event_tx);
    let _ = printer.await;
    tracing::info!("Session ended");

    Ok(())
}
