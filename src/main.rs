use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Result, anyhow};
use clap::Parser;
use text_extract_rust::{AppEvent, Config, DesktopApp, View};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Parser, Debug)]
#[command(
    name = "text-extract-rust",
    version,
    about = "Extract text from images with a generative AI model"
)]
struct Cli {
    /// Image file to extract text from (JPG, PNG, WEBP, ... up to 5MB)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Mime type for --data (auto, image/*, png, jpg, webp, ...)
    #[arg(short = 'M', long = "data-mime")]
    data_mime: Option<String>,

    /// API key (overrides GEMINI_API_KEY/GOOGLE_API_KEY/API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Model name (default from settings: gemini-2.5-flash)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show the credit balance and exit
    #[arg(long = "show-credits")]
    show_credits: bool,

    /// Show the pricing tiers and exit
    #[arg(long = "show-tiers")]
    show_tiers: bool,

    /// Show extraction histories and exit
    #[arg(long = "show-histories")]
    show_histories: bool,

    /// Buy a pricing tier (simulated purchase: starter, pro, enterprise)
    #[arg(long = "buy")]
    buy: Option<String>,

    /// Copy the extracted text to the clipboard
    #[arg(long = "copy")]
    copy: bool,

    /// Save the extracted text as extracted-text.txt in this directory
    #[arg(long = "download")]
    download: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Interactive mode
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            data: self.data.clone(),
            data_mime: self.data_mime.clone(),
            key: self.key.clone(),
            model: self.model.clone(),
            settings_path: self.read_settings.clone(),
            show_credits: self.show_credits,
            show_tiers: self.show_tiers,
            show_histories: self.show_histories,
            buy: self.buy.clone(),
            copy: self.copy,
            download: self.download.clone(),
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    text_extract_rust::logging::init(cli.verbose)?;
    if cli.interactive {
        return run_interactive(cli).await;
    }

    let output = text_extract_rust::run(cli.config()).await?;
    println!("{}", output);
    Ok(())
}

enum Flow {
    Continue,
    Exit,
}

async fn run_interactive(cli: Cli) -> Result<()> {
    let config = cli.config();
    let settings = text_extract_rust::load_settings(&config)?;
    let mut app = text_extract_rust::build_app(&config, &settings);
    if let Some(data) = config.data.as_deref() {
        app.select_path(&PathBuf::from(data), config.data_mime.as_deref())?;
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<AppEvent>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Interactive mode. Use /quit or /exit to finish.");
    println!("Type /help to see available commands.");
    println!();
    println!("{}", app.render(Instant::now()));
    prompt()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = line.trim();
                if input.is_empty() {
                    prompt()?;
                    continue;
                }
                match handle_interactive_command(input, &mut app, &events_tx) {
                    Ok(Flow::Exit) => break,
                    Ok(Flow::Continue) => {}
                    Err(err) => eprintln!("error: {:#}", err),
                }
                print_notice(&mut app);
                prompt()?;
            }
            Some(event) = events_rx.recv() => {
                println!();
                if let Err(err) = app.apply(event) {
                    eprintln!("error: {:#}", err);
                }
                print_notice(&mut app);
                println!("{}", app.render(Instant::now()));
                prompt()?;
            }
        }
    }
    Ok(())
}

fn handle_interactive_command(
    input: &str,
    app: &mut DesktopApp,
    events: &UnboundedSender<AppEvent>,
) -> Result<Flow> {
    let (command, arg) = match input.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (input, ""),
    };

    match command {
        "/quit" | "/exit" => return Ok(Flow::Exit),
        "/help" => print_interactive_help(),
        "/show" => println!("{}", app.render(Instant::now())),
        "/credits" => println!("credits: {}", app.credits()),
        "/history" => match arg {
            "" => println!(
                "{}",
                text_extract_rust::history::format_histories(&app.histories()?)
            ),
            "clear" => app.clear_histories()?,
            _ => return Err(anyhow!("usage: /history [clear]")),
        },
        "/workspace" => {
            app.navigate(View::Workspace);
            println!("{}", app.render(Instant::now()));
        }
        "/pricing" => {
            app.navigate(View::Pricing);
            println!("{}", app.render(Instant::now()));
        }
        "/select" | "/drop" => {
            if arg.is_empty() {
                return Err(anyhow!("usage: {} <path>", command));
            }
            app.navigate(View::Workspace);
            app.select_path(&PathBuf::from(arg), None)?;
            println!("{}", app.render(Instant::now()));
        }
        "/clear" => {
            app.clear();
            println!("{}", app.render(Instant::now()));
        }
        "/extract" => {
            if let Some(task) = app.start_extract()? {
                spawn_task(task, events);
            }
            println!("{}", app.render(Instant::now()));
        }
        "/buy" => {
            if arg.is_empty() {
                return Err(anyhow!("usage: /buy <starter|pro|enterprise>"));
            }
            let task = app.start_purchase(arg)?;
            spawn_task(task, events);
            println!("{}", app.render(Instant::now()));
        }
        "/copy" => {
            let mut clipboard = text_extract_rust::clipboard::SystemClipboard;
            if app.copy(&mut clipboard, Instant::now())? {
                println!("Copied");
            } else {
                println!("nothing to copy");
            }
        }
        "/download" => {
            let dir = if arg.is_empty() {
                PathBuf::from(".")
            } else {
                PathBuf::from(arg)
            };
            match app.download(&dir)? {
                Some(path) => println!("saved {}", path.display()),
                None => println!("nothing to download"),
            }
        }
        _ => eprintln!("unknown command: {}", input),
    }
    Ok(Flow::Continue)
}

fn spawn_task(task: text_extract_rust::AppTask, events: &UnboundedSender<AppEvent>) {
    let events = events.clone();
    tokio::spawn(async move {
        let event = task.await;
        let _ = events.send(event);
    });
}

fn print_notice(app: &mut DesktopApp) {
    if let Some(notice) = app.take_notice() {
        println!("{}", notice);
    }
}

fn prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush()?;
    Ok(())
}

fn print_interactive_help() {
    println!("Commands:");
    println!("  /quit, /exit                 Exit interactive mode");
    println!("  /show                        Redraw the current view");
    println!("  /workspace                   Switch to the workspace");
    println!("  /pricing                     Switch to pricing");
    println!("  /select <path>               Select an image");
    println!("  /drop <path>                 Same as /select");
    println!("  /extract                     Extract text (spends 1 credit)");
    println!("  /clear                       Discard image, result and error");
    println!("  /copy                        Copy the result to the clipboard");
    println!("  /download [dir]              Save the result as extracted-text.txt");
    println!("  /buy <tier>                  Simulated purchase (starter, pro, enterprise)");
    println!("  /credits                     Show the credit balance");
    println!("  /history                     Show extraction histories");
    println!("  /history clear               Forget extraction histories");
}
