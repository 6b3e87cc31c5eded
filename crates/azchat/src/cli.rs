//! CLI (Command Line Interface) mode
//!
//! Interactive terminal chat over the same conversation manager the HTTP
//! server uses, bound to a single local session.

use std::sync::Arc;

use azchat_core::{ChatBackend, ChatReply, ConversationManager, Role, RunResult};
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use tracing::info;

/// Session id used by the terminal user
const CLI_SESSION: &str = "cli";

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show this help"),
    ("/new", "Start a new conversation"),
    ("/history", "Show the conversation history"),
    ("/exit", "Quit"),
    ("/quit", "Quit"),
];

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Custom prompt with colored styling
struct ColoredPrompt {
    style: Style,
}

impl ColoredPrompt {
    fn new() -> Self {
        Self {
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for ColoredPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint("> ").to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// What the REPL should do after a line was handled as a command
#[derive(Debug, PartialEq, Eq)]
enum CommandOutcome {
    /// Not a command; send the line as a chat message
    Chat,
    /// Command handled, read the next line
    Handled,
    /// Leave the REPL
    Exit,
}

/// Run CLI interactive mode
pub async fn run_cli(conversations: Arc<ConversationManager>) -> anyhow::Result<()> {
    info!("Starting CLI mode");

    print_welcome();

    let mut keybindings = default_keybindings();

    // Trigger completion on '/' key
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let prompt = ColoredPrompt::new();

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                match handle_command(input, &conversations).await {
                    CommandOutcome::Exit => break,
                    CommandOutcome::Handled => continue,
                    CommandOutcome::Chat => {}
                }

                match conversations.send_message(CLI_SESSION, input, None).await {
                    Ok(reply) => print_reply(&reply),
                    Err(e) => eprintln!("\n{} {}\n", Color::Red.paint("Error:"), e),
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => break,
            Err(err) => {
                eprintln!("\n{} {}\n", Color::Red.paint("Error:"), err);
                break;
            }
        }
    }

    println!("\nBye!\n");
    Ok(())
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

/// Handle special commands (/new, /history, /help, /exit)
async fn handle_command(input: &str, conversations: &ConversationManager) -> CommandOutcome {
    let lower = input.to_lowercase();

    match lower.as_str() {
        "/exit" | "/quit" | "/q" => CommandOutcome::Exit,
        "/new" | "/clear" => {
            match conversations.new_conversation(CLI_SESSION).await {
                Ok(id) => println!("\nStarted conversation {}\n", id),
                Err(e) => eprintln!("\n{} {}\n", Color::Red.paint("Error:"), e),
            }
            CommandOutcome::Handled
        }
        "/help" | "/?" => {
            print_help();
            CommandOutcome::Handled
        }
        "/history" => {
            print_history(conversations).await;
            CommandOutcome::Handled
        }
        _ if lower.starts_with('/') => {
            eprintln!("\nUnknown command: {}. Type /help for the list of commands.\n", input);
            CommandOutcome::Handled
        }
        _ => CommandOutcome::Chat,
    }
}

fn print_reply(reply: &ChatReply) {
    match reply {
        ChatReply::Completion { response, .. } => println!("\n{}\n", response),
        ChatReply::Run(run) => match &run.result {
            RunResult::Answer(text) => println!("\n{}\n", text),
            RunResult::ActionRequired(text) => {
                println!("\n{}\n", Color::Yellow.paint(text.as_str()))
            }
            RunResult::Failed(error) => eprintln!(
                "\n{} run {} on thread {}: {}\n",
                Color::Red.paint("Error:"),
                run.status,
                run.thread_id,
                error
            ),
        },
    }
}

/// Print welcome message
fn print_welcome() {
    println!();
    println!("azchat CLI - type a message and press Enter");
    println!("Commands: /help, /new, /history, /exit  (type / for suggestions)");
    println!();
}

/// Print help message
fn print_help() {
    println!();
    println!("Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
}

/// Print conversation history
async fn print_history(conversations: &ConversationManager) {
    if let ChatBackend::Assistant { .. } = conversations.backend() {
        println!("\nHistory is kept in the remote thread in assistant mode.\n");
        return;
    }

    let messages = match conversations.history(CLI_SESSION).await {
        Ok(messages) => messages,
        Err(e) => {
            eprintln!("\n{} {}\n", Color::Red.paint("Error:"), e);
            return;
        }
    };

    println!();
    println!("History ({} messages):", messages.len());
    println!("{}", "-".repeat(50));

    for (i, msg) in messages.iter().enumerate() {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        let preview: String = msg.content.chars().take(100).collect();
        let ellipsis = if msg.content.chars().count() > 100 { "..." } else { "" };
        println!("{}. {}: {}{}", i + 1, role, preview.replace('\n', " "), ellipsis);
    }

    println!("{}", "-".repeat(50));
    println!();
}
