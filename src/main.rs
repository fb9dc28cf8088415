// Prompt Studio - command-line entry point

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use prompt_studio::commands;
use prompt_studio::models::{
    ExecutionStatus, HistoryEntry, HistoryFilter, PromptCreateRequest, PromptFilter,
    PromptTemplate, PromptUpdateRequest, SettingsUpdate,
};
use prompt_studio::services::composer;
use prompt_studio::{AppState, CommandResponse};
use prompt_studio_llm::CompletionOptions;
use prompt_studio_template::PlaceholderSpec;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prompt-studio")]
#[command(version)]
#[command(
    about = "Manage prompt templates and run them against LLM backends",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Data directory (defaults to ~/.prompt-studio)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List prompts in the library
    #[clap(visible_alias = "ls")]
    List {
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        tag: Option<String>,
        /// Only favorites
        #[arg(short, long)]
        favorites: bool,
    },
    /// Show one prompt
    Show {
        /// Prompt ID or name
        prompt: String,
    },
    /// Add a prompt to the library
    Add {
        #[arg(short, long)]
        name: String,
        /// Read the template from a file
        #[arg(short, long, conflicts_with = "content", required_unless_present = "content")]
        file: Option<PathBuf>,
        /// Template text
        #[arg(long)]
        content: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// JSON file with placeholder specs
        #[arg(long)]
        placeholders: Option<PathBuf>,
        #[arg(long)]
        favorite: bool,
    },
    /// Edit a prompt; the placeholder schema is re-inferred
    Edit {
        /// Prompt ID or name
        prompt: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,
        #[arg(long)]
        content: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        /// Replace all tags
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
        #[arg(long)]
        placeholders: Option<PathBuf>,
    },
    /// Delete a prompt
    #[clap(visible_alias = "rm")]
    Delete {
        prompt: String,
    },
    /// Toggle a prompt's favorite flag
    Favorite {
        prompt: String,
    },
    /// Show a prompt's placeholder schema
    Placeholders {
        prompt: String,
    },
    /// Render a prompt without sending it
    Render {
        prompt: String,
        /// Placeholder value as key=value
        #[arg(short, long = "set")]
        set: Vec<String>,
        /// JSON file with placeholder values
        #[arg(long)]
        values: Option<PathBuf>,
        /// Fill every placeholder with its default
        #[arg(long, conflicts_with_all = ["set", "values"])]
        defaults: bool,
    },
    /// Render a prompt and send it to a backend
    Run {
        prompt: String,
        #[arg(short, long)]
        backend: Option<String>,
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long = "set")]
        set: Vec<String>,
        #[arg(long)]
        values: Option<PathBuf>,
        /// System prompt
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Wait for the whole response instead of streaming
        #[arg(long)]
        no_stream: bool,
    },
    /// List configured backends
    Backends,
    /// List a backend's models
    Models {
        backend: String,
    },
    /// Check that a backend answers
    TestBackend {
        backend: String,
        /// Prompt to send instead of the built-in test prompt
        #[arg(short, long)]
        prompt: Option<String>,
    },
    /// Show execution history
    History {
        /// Prompt ID or name
        #[arg(short, long)]
        prompt: Option<String>,
        #[arg(short, long)]
        backend: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        limit: Option<u32>,
        /// Delete all history
        #[arg(long)]
        clear: bool,
    },
    /// Store a secret read from stdin (e.g. openai_api_key, proxy_password)
    SetKey {
        account: String,
        /// Remove the secret instead
        #[arg(long)]
        delete: bool,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Change one setting
    Set { key: String, value: String },
    /// Restore defaults
    Reset,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let state = AppState::new();
    respond(commands::init_app(&state, cli.data_dir.as_deref()).await)?;
    let json = cli.json;

    match cli.command {
        Commands::List {
            category,
            search,
            tag,
            favorites,
        } => {
            let filter = PromptFilter {
                category,
                search,
                tag,
                favorites_only: favorites,
            };
            let prompts = respond(commands::list_prompts(&state, filter).await)?;
            if json {
                print_json(&prompts)?;
            } else if prompts.is_empty() {
                println!("No prompts found");
            } else {
                for prompt in &prompts {
                    print_prompt_line(prompt);
                }
            }
        }
        Commands::Show { prompt } => {
            let prompt = respond(commands::get_prompt(&state, prompt).await)?;
            if json {
                print_json(&prompt)?;
            } else {
                print_prompt(&prompt);
            }
        }
        Commands::Add {
            name,
            file,
            content,
            description,
            category,
            tags,
            placeholders,
            favorite,
        } => {
            let content = read_content(file.as_deref(), content)?
                .context("Either --file or --content is required")?;
            let request = PromptCreateRequest {
                name,
                content,
                description,
                category,
                tags,
                placeholders: read_placeholders(placeholders.as_deref())?,
                is_favorite: favorite,
            };
            let prompt = respond(commands::create_prompt(&state, request).await)?;
            if json {
                print_json(&prompt)?;
            } else {
                println!("Added '{}' ({})", prompt.name, prompt.id);
                print_placeholders(&prompt.placeholders);
            }
        }
        Commands::Edit {
            prompt,
            name,
            file,
            content,
            description,
            category,
            tags,
            placeholders,
        } => {
            let request = PromptUpdateRequest {
                name,
                content: read_content(file.as_deref(), content)?,
                description,
                category,
                tags,
                placeholders: read_placeholders(placeholders.as_deref())?,
                is_favorite: None,
            };
            let prompt = respond(commands::update_prompt(&state, prompt, request).await)?;
            if json {
                print_json(&prompt)?;
            } else {
                println!("Updated '{}'", prompt.name);
                print_placeholders(&prompt.placeholders);
            }
        }
        Commands::Delete { prompt } => {
            respond(commands::delete_prompt(&state, prompt.clone()).await)?;
            println!("Deleted '{}'", prompt);
        }
        Commands::Favorite { prompt } => {
            let prompt = respond(commands::toggle_favorite(&state, prompt).await)?;
            let verb = if prompt.is_favorite { "Starred" } else { "Unstarred" };
            println!("{} '{}'", verb, prompt.name);
        }
        Commands::Placeholders { prompt } => {
            let specs = respond(commands::get_placeholders(&state, prompt).await)?;
            if json {
                print_json(&specs)?;
            } else {
                print_placeholders(&specs);
            }
        }
        Commands::Render {
            prompt,
            set,
            values,
            defaults,
        } => {
            let context = if defaults {
                let specs = respond(commands::get_placeholders(&state, prompt.clone()).await)?;
                prompt_studio_template::default_context(&specs)
            } else {
                composer::build_context(values.as_deref(), &set)?
            };
            let text = respond(commands::render_prompt(&state, prompt, context).await)?;
            if json {
                print_json(&text)?;
            } else {
                println!("{}", text);
            }
        }
        Commands::Run {
            prompt,
            backend,
            model,
            set,
            values,
            system,
            temperature,
            max_tokens,
            timeout,
            no_stream,
        } => {
            let request = commands::RunPromptRequest {
                prompt,
                context: composer::build_context(values.as_deref(), &set)?,
                backend,
                model,
                options: CompletionOptions {
                    system,
                    temperature,
                    max_tokens,
                    timeout_secs: timeout,
                },
                stream: !no_stream,
            };
            return run_prompt(&state, request, json).await;
        }
        Commands::Backends => {
            let backends = respond(commands::list_backends(&state).await)?;
            if json {
                print_json(&backends)?;
            } else {
                for backend in &backends {
                    let mut notes = Vec::new();
                    if backend.requires_credential() {
                        notes.push("credential");
                    }
                    if backend.supports_streaming {
                        notes.push("streaming");
                    }
                    println!(
                        "{:<12} {:<20} {}  [{}]",
                        backend.id,
                        backend.display_name,
                        backend.base_url,
                        notes.join(", ")
                    );
                }
            }
        }
        Commands::Models { backend } => {
            let models = respond(commands::list_models(&state, backend).await)?;
            if json {
                print_json(&models)?;
            } else {
                for model in &models {
                    println!("{}", model);
                }
            }
        }
        Commands::TestBackend { backend, prompt } => {
            let report = respond(commands::test_backend(&state, backend, prompt).await)?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "{}: {} ({}ms, {} models)",
                    report.backend,
                    if report.success { "ok" } else { "FAILED" },
                    report.duration_ms,
                    report.models.len()
                );
                if let Some(model) = &report.model {
                    println!("model: {}", model);
                }
                if let Some(response) = &report.response {
                    println!("response: {}", response.trim());
                }
                if let Some(error) = &report.error {
                    println!("error: {}", error);
                }
            }
            if !report.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::History {
            prompt,
            backend,
            search,
            limit,
            clear,
        } => {
            if clear {
                let removed = respond(commands::clear_history(&state).await)?;
                println!("Removed {} entries", removed);
                return Ok(ExitCode::SUCCESS);
            }
            let filter = HistoryFilter {
                prompt_id: prompt,
                backend,
                search,
                limit,
            };
            let entries = respond(commands::list_history(&state, filter).await)?;
            if json {
                print_json(&entries)?;
            } else {
                for entry in &entries {
                    print_history_line(entry);
                }
            }
        }
        Commands::SetKey { account, delete } => {
            if delete {
                respond(commands::delete_secret(&state, account.clone()).await)?;
                println!("Removed '{}'", account);
            } else {
                let secret = read_secret(&account)?;
                respond(commands::set_secret(&state, account.clone(), secret).await)?;
                println!("Stored '{}'", account);
            }
        }
        Commands::Config { action } => {
            let config = match action.unwrap_or(ConfigAction::Show) {
                ConfigAction::Show => respond(commands::get_settings(&state).await)?,
                ConfigAction::Set { key, value } => {
                    let update = SettingsUpdate::from_key_value(&key, &value)
                        .map_err(anyhow::Error::msg)?;
                    respond(commands::update_settings(&state, update).await)?
                }
                ConfigAction::Reset => respond(commands::reset_settings(&state).await)?,
            };
            print_json(&config)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_prompt(
    state: &AppState,
    request: commands::RunPromptRequest,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let streaming = request.stream && !json;
    let mut stdout = io::stdout();
    let entry = respond(
        commands::run_prompt(
            state,
            request,
            |fragment| {
                if streaming {
                    let _ = stdout.write_all(fragment.as_bytes());
                    let _ = stdout.flush();
                }
            },
            cancel,
        )
        .await,
    )?;

    if json {
        print_json(&entry)?;
    } else if streaming {
        println!();
    } else {
        println!("{}", entry.response_text);
    }

    match entry.status {
        ExecutionStatus::Completed => Ok(ExitCode::SUCCESS),
        ExecutionStatus::Cancelled => {
            eprintln!("[cancelled]");
            Ok(ExitCode::from(130))
        }
        ExecutionStatus::Failed => bail!(
            "{}",
            entry.error.unwrap_or_else(|| "execution failed".to_string())
        ),
    }
}

fn respond<T>(response: CommandResponse<T>) -> anyhow::Result<T> {
    response.into_result().map_err(anyhow::Error::msg)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_content(file: Option<&Path>, content: Option<String>) -> anyhow::Result<Option<String>> {
    match file {
        Some(path) => Ok(Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        )),
        None => Ok(content),
    }
}

fn read_placeholders(path: Option<&Path>) -> anyhow::Result<Option<Vec<PlaceholderSpec>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let specs = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a list of placeholder specs", path.display()))?;
    Ok(Some(specs))
}

fn read_secret(account: &str) -> anyhow::Result<String> {
    eprint!("Secret for '{}': ", account);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let secret = line.trim().to_string();
    if secret.is_empty() {
        bail!("No secret given on stdin");
    }
    Ok(secret)
}

fn print_prompt_line(prompt: &PromptTemplate) {
    println!(
        "{} {:<28} {:<12} {:>4} uses  {}",
        if prompt.is_favorite { "*" } else { " " },
        prompt.name,
        prompt.category.as_deref().unwrap_or("-"),
        prompt.use_count,
        prompt.id
    );
}

fn print_prompt(prompt: &PromptTemplate) {
    println!("{} ({})", prompt.name, prompt.id);
    if let Some(description) = &prompt.description {
        println!("{}", description);
    }
    if let Some(category) = &prompt.category {
        println!("category: {}", category);
    }
    if !prompt.tags.is_empty() {
        println!("tags: {}", prompt.tags.join(", "));
    }
    println!("used {} times", prompt.use_count);
    print_placeholders(&prompt.placeholders);
    println!("---");
    println!("{}", prompt.content);
}

fn print_placeholders(specs: &[PlaceholderSpec]) {
    if specs.is_empty() {
        println!("No placeholders");
        return;
    }
    for spec in specs {
        let mut line = format!(
            "  {} ({}{})",
            spec.name,
            spec.kind.as_str(),
            if spec.required { ", required" } else { "" }
        );
        if let Some(default) = &spec.default {
            line.push_str(&format!(" default={}", default));
        }
        if !spec.choices.is_empty() {
            line.push_str(&format!(" options=[{}]", spec.choices.join(", ")));
        }
        println!("{}", line);
    }
}

fn print_history_line(entry: &HistoryEntry) {
    let preview: String = entry
        .response_text
        .chars()
        .take(60)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    println!(
        "{}  {:<9} {}/{} {:>6}ms  {}",
        entry
            .created_at
            .as_deref()
            .map(local_timestamp)
            .unwrap_or_else(|| "-".to_string()),
        entry.status.to_string(),
        entry.backend,
        entry.model,
        entry.duration_ms,
        entry.error.as_deref().unwrap_or(&preview)
    );
}

/// SQLite stores UTC `YYYY-MM-DD HH:MM:SS`; show it in local time
fn local_timestamp(stored: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(stored, "%Y-%m-%d %H:%M:%S")
        .map(|utc| {
            utc.and_utc()
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|_| stored.to_string())
}
