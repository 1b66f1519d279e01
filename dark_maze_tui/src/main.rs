use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dark_maze_core::{
    Direction, ItemKind, Position,
    command::Actionable,
    config::LevelConfig,
    error::PersistenceError,
    generation::StrategyKind,
    level::{Level, LevelEvent, LevelState},
    mode::mode_by_name,
    persistence::{JsonFileStore, LevelKey, LevelStore},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON level configuration; flags below override it
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<i32>,

    #[arg(long)]
    height: Option<i32>,

    /// Seed for maze generation and ghost movement
    #[arg(long)]
    seed: Option<u64>,

    /// Generation strategy: branched-dfs, dfs or wavefront
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Game mode: escape, key-hunt or oil-run
    #[arg(short, long, default_value = "escape")]
    mode: String,

    /// Level number to start at
    #[arg(short, long, default_value_t = 1)]
    level: u32,

    /// Directory for saved levels
    #[arg(long, value_name = "DIR", default_value = "levels")]
    levels_dir: PathBuf,

    /// Log file; the terminal is taken by the UI
    #[arg(long, value_name = "LOG_FILE", default_value = "dark_maze.log")]
    log_file: PathBuf,
}

impl Args {
    fn level_config(&self) -> Result<LevelConfig> {
        let mut config = match &self.config {
            Some(path) => LevelConfig::load(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => LevelConfig::default(),
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        config.validate()?;
        Ok(config)
    }
}

struct App {
    /// The running level session.
    level: Level,
    /// Where levels are saved and looked up.
    store: JsonFileStore,
    config: LevelConfig,
    mode: String,
    level_number: u32,
    /// Direction requested since the last tick.
    input: Option<Direction>,
    /// Last notable thing that happened, shown in the status bar.
    message: String,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(
        config: LevelConfig,
        mode: String,
        level_number: u32,
        mut store: JsonFileStore,
    ) -> Result<Self> {
        let level = load_level(&mut store, &config, &mode, level_number)?;
        Ok(App {
            level,
            store,
            config,
            mode,
            level_number,
            input: None,
            message: format!("Level {level_number}"),
            should_quit: false,
        })
    }

    /// Handles one step of the level.
    fn tick(&mut self, dt: f32) -> Result<()> {
        let input = self.input.take();
        match self.level.update(dt, input) {
            LevelEvent::None => {}
            LevelEvent::Completed => {
                self.message = "Escaped! 'r' to watch the replay, 'n' for the next level".into();
            }
            LevelEvent::Failed => {
                self.message = "The light went out. 'r' to watch, 'x' to retry".into();
            }
            LevelEvent::ReplayFinished => self.message = "Replay finished".into(),
            LevelEvent::AdvanceLevel => self.advance()?,
        }
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<()> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Up | KeyCode::Char('w') => self.input = Some(Direction::Up),
            KeyCode::Down | KeyCode::Char('s') => self.input = Some(Direction::Down),
            KeyCode::Left | KeyCode::Char('a') => self.input = Some(Direction::Left),
            KeyCode::Right | KeyCode::Char('d') => self.input = Some(Direction::Right),
            KeyCode::Char('r') => {
                if self.level.watch_replay(|| info!("replay watched to the end")) {
                    self.message = "Replaying... space to skip".into();
                }
            }
            KeyCode::Char('n') => {
                if self.level.level_is(LevelState::FAILED) {
                    self.message = "Only a completed level leads on".into();
                } else if self.level.load_current_level() {
                    self.message = "Rewinding... space to skip".into();
                }
            }
            KeyCode::Char(' ') => {
                if self.level.skip() == LevelEvent::AdvanceLevel {
                    self.advance()?;
                }
            }
            KeyCode::Char('x') => {
                self.level.restart();
                self.message = format!("Level {} restarted", self.level_number);
            }
            _ => {}
        }
        Ok(())
    }

    /// Loads the level after the current one.
    fn advance(&mut self) -> Result<()> {
        self.level_number += 1;
        self.config = self.config.next_level();
        self.level = load_level(&mut self.store, &self.config, &self.mode, self.level_number)?;
        self.message = format!("Level {}", self.level_number);
        Ok(())
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Loads a saved level, or generates and saves it when none exists yet.
fn load_level(
    store: &mut JsonFileStore,
    config: &LevelConfig,
    mode: &str,
    number: u32,
) -> Result<Level> {
    let key = LevelKey::new(mode, config.width, config.height, number);
    match store.load(&key) {
        Ok(record) => {
            info!(%key, "loaded saved level");
            Level::from_record(&record, config.clone())
                .with_context(|| format!("Saved level {key} is unusable"))
        }
        Err(PersistenceError::NotFound(_)) => {
            let game_mode = mode_by_name(mode).ok_or_else(|| anyhow!("Unknown game mode: {mode}"))?;
            let level = Level::new(config.clone(), game_mode)?;
            if let Err(err) = store.save(&level.record(), &key) {
                warn!(%key, error = %err, "could not save level");
            }
            Ok(level)
        }
        Err(err) => Err(err).with_context(|| format!("Failed to load level {key}")),
    }
}

fn init_tracing(log_file: &Path) -> Result<()> {
    let file = File::create(log_file)
        .with_context(|| format!("Failed to create log file {}", log_file.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_tracing(&args.log_file)?;

    let config = args.level_config()?;
    if mode_by_name(&args.mode).is_none() {
        return Err(anyhow!("Unknown game mode: {}", args.mode));
    }
    let store = JsonFileStore::new(&args.levels_dir);
    let mut app = App::new(config, args.mode.clone(), args.level, store)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop, restoring the terminal even on error
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;

    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code)?;
                }
            }
        }

        let elapsed = last_tick.elapsed();
        if elapsed >= tick_rate {
            app.tick(elapsed.as_secs_f32())?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let [maze_area, light_area, status_area, help_area] = Layout::vertical([
        Constraint::Min(5),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(2),
    ])
    .areas(frame.area());

    render_maze(frame, maze_area, app);
    render_light(frame, light_area, &app.level);
    render_status(frame, status_area, app);

    let help_text = Paragraph::new(
        "Arrows/WASD move  r replay  n next level  space skip  x restart  q quit",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, help_area);
}

/// Renders the maze with `y` growing upward, so the top row is `height - 1`.
fn render_maze(frame: &mut Frame, area: Rect, app: &App) {
    let level = &app.level;
    let maze = level.maze();
    let player = level.player().position();
    let wall = Style::default().fg(Color::DarkGray);

    let wall_span = |exists: bool, open: &'static str, closed: &'static str| {
        if exists {
            Span::styled(closed, wall)
        } else {
            Span::raw(open)
        }
    };
    let has_wall = |position: Position, direction: Direction| {
        maze.wall_exists(position, direction).unwrap_or(true)
    };

    let mut lines: Vec<Line> = Vec::with_capacity(2 * maze.height() as usize + 1);
    for y in (0..maze.height()).rev() {
        let mut top: Vec<Span> = Vec::new();
        let mut row: Vec<Span> = Vec::new();
        for x in 0..maze.width() {
            let position = Position::new(x, y);
            top.push(Span::styled("+", wall));
            top.push(wall_span(has_wall(position, Direction::Up), "   ", "---"));
            row.push(wall_span(has_wall(position, Direction::Left), " ", "|"));
            row.push(cell_span(app, position, player));
        }
        top.push(Span::styled("+", wall));
        let last = Position::new(maze.width() - 1, y);
        row.push(wall_span(has_wall(last, Direction::Right), " ", "|"));
        lines.push(Line::from(top));
        lines.push(Line::from(row));
    }
    let mut bottom: Vec<Span> = Vec::new();
    for x in 0..maze.width() {
        bottom.push(Span::styled("+", wall));
        bottom.push(wall_span(has_wall(Position::new(x, 0), Direction::Down), "   ", "---"));
    }
    bottom.push(Span::styled("+", wall));
    lines.push(Line::from(bottom));

    let title = format!(
        "Dark Maze - {} - level {}",
        level.mode().name(),
        app.level_number
    );
    let maze_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(maze_paragraph, area);
}

/// The three characters drawn inside one cell.
fn cell_span(app: &App, position: Position, player: Position) -> Span<'static> {
    let level = &app.level;
    if position == player {
        return Span::styled(" @ ", Style::default().fg(Color::Yellow).bold());
    }
    if level.ghosts().iter().any(|ghost| ghost.position() == position) {
        return Span::styled(" G ", Style::default().fg(Color::Magenta));
    }
    match level.maze().item_at(position) {
        Ok(ItemKind::Key) => return Span::styled(" k ", Style::default().fg(Color::Cyan)),
        Ok(ItemKind::Oil) => return Span::styled(" o ", Style::default().fg(Color::Blue)),
        _ => {}
    }
    if position == level.maze().end() {
        Span::styled(" E ", Style::default().fg(Color::Green))
    } else if position == level.maze().start() {
        Span::styled(" S ", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw("   ")
    }
}

/// Renders the remaining light as a gauge.
fn render_light(frame: &mut Frame, area: Rect, level: &Level) {
    let fraction = f64::from(level.light_fraction().clamp(0.0, 1.0));
    let label = format!(
        "{:.1}s  light {:.0}°",
        level.time_left().max(0.0),
        level.player().light_angle()
    );
    let gauge = Gauge::default()
        .block(Block::default().title("Light").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Yellow))
        .ratio(fraction)
        .label(label);
    frame.render_widget(gauge, area);
}

/// Renders the level state, inventory and last message.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let player = app.level.player();
    let status = Line::from(vec![
        Span::styled(app.level.state().to_string(), Style::default().bold()),
        Span::raw(format!(
            "  keys {}  oil {}  history {}  ",
            player.count(ItemKind::Key),
            player.count(ItemKind::Oil),
            app.level.history().len()
        )),
        Span::raw(app.message.clone()),
    ]);
    let status_widget =
        Paragraph::new(status).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status_widget, area);
}
