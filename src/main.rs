use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    io::{self, stdin},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use croquis::{
    app::{App, Control},
    app_dirs::AppDirs,
    classifier::{MistralClient, API_KEY_VAR},
    config::{Config, ConfigStore, FileConfigStore},
    error::GameError,
    runtime::{CrosstermEventSource, FixedTicker, Runner},
    vocabulary::Vocabulary,
};

/// draw the word, let a vision model guess it before the clock runs out
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A sketch-guessing terminal game. Draw the target word with the mouse; a vision model looks at the canvas after every stroke and scores a point when it names the word. Set MISTRAL_API_KEY to enable guessing."
)]
pub struct Cli {
    /// number of seconds per session
    #[clap(short = 's', long)]
    secs: Option<u64>,

    /// number of jokers (word skips) per session
    #[clap(short = 'j', long)]
    jokers: Option<u32>,

    /// built-in word list to draw from
    #[clap(short = 'l', long)]
    vocabulary: Option<String>,

    /// comma-separated words to draw instead of a built-in list
    #[clap(short = 'w', long, value_delimiter = ',')]
    words: Option<Vec<String>>,

    /// vision model asked to guess the drawing
    #[clap(short = 'm', long)]
    model: Option<String>,

    /// write the effective settings to the config file
    #[clap(long)]
    save_config: bool,
}

impl Cli {
    /// Command-line flags win over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(secs) = self.secs {
            config.session_secs = secs;
        }
        if let Some(jokers) = self.jokers {
            config.jokers = jokers;
        }
        if let Some(name) = &self.vocabulary {
            config.vocabulary = name.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
    }

    fn vocabulary(&self, config: &Config) -> Result<Vocabulary, GameError> {
        let base = Vocabulary::builtin(&config.vocabulary)?;
        Ok(match &self.words {
            Some(words) => Vocabulary::from_words(&base, words),
            None => base,
        })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    init_logging();

    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply(&mut config);
    if cli.save_config {
        store.save(&config)?;
        info!(path = %store.path().display(), "config saved");
    }

    let vocabulary = match cli.vocabulary(&config) {
        Ok(v) => v,
        Err(GameError::UnknownVocabulary(name)) => {
            let mut cmd = Cli::command();
            cmd.error(
                ErrorKind::InvalidValue,
                format!(
                    "unknown vocabulary '{}' (available: {})",
                    name,
                    Vocabulary::available().join(", ")
                ),
            )
            .exit();
        }
        Err(e) => return Err(e.into()),
    };

    let client = MistralClient::from_config(&config);
    if !client.has_api_key() {
        warn!("{} is not set, every guess will come back empty", API_KEY_VAR);
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let size = terminal.size()?;
    let mut app = App::new(config, vocabulary, Arc::new(client), (size.width, size.height));
    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        if app.handle_event(runner.step(), Instant::now()) == Control::Quit {
            return Ok(());
        }
    }
}

/// Create `path` and its directory for appending. Failures are reported on
/// stderr, which is still the plain terminal at this point.
fn open_log(path: PathBuf) -> Option<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("croquis: cannot create {}: {e}", dir.display());
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("croquis: cannot open {}: {e}", path.display());
            None
        }
    }
}

/// Logs go to a file: the terminal belongs to the TUI.
fn init_logging() {
    let Some(file) = open_log(AppDirs::log_path()).or_else(|| open_log(PathBuf::from("croquis.log")))
    else {
        eprintln!("croquis: logging disabled, no writable log file");
        return;
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("croquis=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .init();
}
