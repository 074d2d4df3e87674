//! Trackdeck CLI - Terminal playlist player

mod cli;
mod input;
mod settings;
mod view;

use std::fs::{ self, OpenOptions };
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::Mutex;
use std::time::{ Duration, Instant };

use anyhow::{ Context, Result };
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEventKind, MouseButton, MouseEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{ Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap },
};
use tracing_subscriber::EnvFilter;

use cli::Args;
use input::{ InputBuffer, InputMode };
use settings::Settings;
use view::ViewMode;

use trackdeck_core::{
    command,
    Command, DeviceBackend, LibraryScanner, PlaybackState, Player, PlayerError, PlayerEvent,
    PlayerOptions, PlayerSnapshot, PlaylistStore, Progress, SqliteStore, UserId, PROGRESS_RANGE,
};


const LOG_FILENAME: &str = "trackdeck.log";

const DEFAULT_LOG_FILTER: &str = "trackdeck=info";

const SEEK_STEP_MICROS: i64 = 5_000_000;

const VOLUME_STEP: u8 = 5;

const STATUS_TIMEOUT: Duration = Duration::from_secs( 3 );

const DOUBLE_CLICK: Duration = Duration::from_millis( 400 );


/// Application state.
struct App {
    player: Player,
    events: Receiver<PlayerEvent>,
    snapshot: PlayerSnapshot,
    /// Latest sample from the progress reporter
    progress: Option<Progress>,
    should_quit: bool,

    // View state
    view_mode: ViewMode,
    playlist_state: ListState,
    help_scroll: u16,

    // Input state
    input_mode: InputMode,
    input_buffer: InputBuffer,

    // Areas from the last draw, for mouse hit detection
    playlist_area: Option<Rect>,
    gauge_area: Option<Rect>,

    // Mouse click tracking for double-click detection
    last_click_time: Option<Instant>,
    last_click_row: Option<u16>,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,

    settings: Settings,
}


impl App {
    /// Starts the player and applies the command line.
    fn new( args: &Args, settings: Settings ) -> Result<Self> {
        let mut startup_status = None;

        let store: Option<Box<dyn PlaylistStore + Send>> = match args.db.clone()
            .or_else( || settings.database.clone() )
            .or_else( SqliteStore::default_path )
        {
            Some( path ) => match SqliteStore::open( &path ) {
                Ok( store ) => Some( Box::new( store ) as Box<dyn PlaylistStore + Send> ),
                Err( e ) => {
                    tracing::warn!( "Playlist database unavailable: {}", e );
                    startup_status = Some( format!( "Saving disabled: {}", e ) );
                    None
                }
            },
            None => {
                tracing::warn!( "No data directory; saving disabled" );
                None
            }
        };

        let options = PlayerOptions {
            initial_volume: args.volume.unwrap_or( settings.volume ),
            repeat: settings.repeat,
            ..PlayerOptions::default()
        };
        let mut player = Player::spawn( DeviceBackend::new(), store, UserId( args.user ), options )?;
        let events = player.take_events().context( "player events already taken" )?;
        let snapshot = player.snapshot()?;

        let mut app = Self {
            player,
            events,
            snapshot,
            progress: None,
            should_quit: false,
            view_mode: ViewMode::Playlist,
            playlist_state: ListState::default(),
            help_scroll: 0,
            input_mode: InputMode::Normal,
            input_buffer: InputBuffer::new(),
            playlist_area: None,
            gauge_area: None,
            last_click_time: None,
            last_click_row: None,
            status_message: None,
            status_clear_at: None,
            settings,
        };

        if args.load {
            app.load_playlist();
        }
        for path in &args.files {
            app.add_path( path.clone() );
        }
        if let Some( msg ) = startup_status {
            app.set_status( msg );
        }
        app.refresh();

        Ok( app )
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + STATUS_TIMEOUT );
    }


    /// Shows a failed request in the status bar.
    fn report<T>( &mut self, result: Result<T, PlayerError> ) -> Option<T> {
        match result {
            Ok( value ) => Some( value ),
            Err( e ) => {
                self.set_status( format!( "Error: {}", e ) );
                None
            }
        }
    }


    /// Pulls a fresh snapshot and keeps the selection in range.
    fn refresh( &mut self ) {
        match self.player.snapshot() {
            Ok( snapshot ) => self.snapshot = snapshot,
            Err( e ) => {
                self.set_status( format!( "Error: {}", e ) );
                return;
            }
        }

        let len = self.snapshot.tracks.len();
        let selected = match self.playlist_state.selected() {
            _ if len == 0 => None,
            Some( i ) => Some( i.min( len - 1 ) ),
            None => Some( 0 ),
        };
        self.playlist_state.select( selected );
    }


    /// Updates app state (clears expired messages, applies player events).
    fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }

        while let Ok( event ) = self.events.try_recv() {
            match event {
                PlayerEvent::TrackStarted { index, track } => {
                    tracing::debug!( "Now playing #{} {}", index, track.display_name() );
                }
                PlayerEvent::StateChanged { state } => {
                    if matches!( state, PlaybackState::Idle | PlaybackState::Stopped ) {
                        self.progress = None;
                    }
                }
                PlayerEvent::Progress( progress ) => {
                    self.progress = Some( progress );
                }
                PlayerEvent::PlaylistChanged => {}
                PlayerEvent::Error { message } => {
                    self.set_status( format!( "Error: {}", message ) );
                }
            }
        }

        self.refresh();
    }


    /// Progress to display: the reporter's sample while a track is active,
    /// the engine's position otherwise.
    fn display_progress( &self ) -> Progress {
        match ( self.snapshot.state, &self.progress ) {
            ( PlaybackState::Playing | PlaybackState::Paused, Some( progress ) ) => progress.clone(),
            _ => self.snapshot.progress.clone(),
        }
    }


    /// Handles a key event.
    fn handle_key( &mut self, code: KeyCode ) {
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key( code ),
            InputMode::Command => self.handle_command_key( code ),
            InputMode::Filter => self.handle_filter_key( code ),
        }
    }


    fn handle_normal_key( &mut self, code: KeyCode ) {
        if self.view_mode == ViewMode::Help {
            self.handle_help_key( code );
            return;
        }

        match code {
            KeyCode::Char( '/' ) => {
                self.input_mode = InputMode::Command;
                self.input_buffer.clear();
            }
            KeyCode::Char( 'f' ) => {
                self.input_mode = InputMode::Filter;
                self.input_buffer.clear();
            }
            KeyCode::Char( '?' ) => {
                self.view_mode = self.view_mode.toggle_help();
            }
            KeyCode::Char( 'q' ) => {
                self.should_quit = true;
            }
            KeyCode::Esc => {
                if self.report( self.player.reset() ).is_some() {
                    self.set_status( "Showing all tracks" );
                }
            }

            // Navigation
            KeyCode::Up | KeyCode::Char( 'k' ) => self.select_previous(),
            KeyCode::Down | KeyCode::Char( 'j' ) => self.select_next(),
            KeyCode::Home => self.playlist_state.select_first(),
            KeyCode::End => {
                let last = self.snapshot.tracks.len().checked_sub( 1 );
                self.playlist_state.select( last );
            }

            // Playback
            KeyCode::Enter => self.play_selected(),
            KeyCode::Char( ' ' ) => {
                let result = self.player.toggle_pause();
                self.report( result );
            }
            KeyCode::Char( 's' ) => {
                let result = self.player.stop();
                self.report( result );
            }
            KeyCode::Char( 'n' ) => {
                let result = self.player.next();
                self.report( result );
            }
            KeyCode::Char( 'p' ) => {
                let result = self.player.previous();
                self.report( result );
            }
            KeyCode::Char( 'z' ) => {
                let result = self.player.shuffle();
                self.report( result );
            }
            KeyCode::Char( 'r' ) => self.toggle_repeat(),
            KeyCode::Left => self.seek_by( -SEEK_STEP_MICROS ),
            KeyCode::Right => self.seek_by( SEEK_STEP_MICROS ),
            KeyCode::Char( '+' ) | KeyCode::Char( '=' ) => {
                self.set_volume( self.snapshot.volume.saturating_add( VOLUME_STEP ) );
            }
            KeyCode::Char( '-' ) => {
                self.set_volume( self.snapshot.volume.saturating_sub( VOLUME_STEP ) );
            }

            // Editing
            KeyCode::Char( 'd' ) | KeyCode::Delete => self.remove_selected(),
            _ => {}
        }
    }


    fn handle_help_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Char( '?' ) | KeyCode::Esc | KeyCode::Char( 'q' ) => {
                self.view_mode = ViewMode::Playlist;
                self.help_scroll = 0;
            }
            KeyCode::Up | KeyCode::Char( 'k' ) => {
                self.help_scroll = self.help_scroll.saturating_sub( 1 );
            }
            KeyCode::Down | KeyCode::Char( 'j' ) => {
                self.help_scroll = self.help_scroll.saturating_add( 1 );
            }
            _ => {}
        }
    }


    fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                let input = self.input_buffer.take();
                self.input_mode = InputMode::Normal;
                self.execute_command( &input );
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Backspace => {
                if self.input_buffer.is_empty() {
                    self.input_mode = InputMode::Normal;
                } else {
                    self.input_buffer.backspace();
                }
            }
            KeyCode::Delete => self.input_buffer.delete(),
            KeyCode::Left => self.input_buffer.move_left(),
            KeyCode::Right => self.input_buffer.move_right(),
            KeyCode::Home => self.input_buffer.move_home(),
            KeyCode::End => self.input_buffer.move_end(),
            KeyCode::Char( c ) => self.input_buffer.insert( c ),
            _ => {}
        }
    }


    /// Filter mode narrows the playlist as the user types.
    fn handle_filter_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
                let result = self.player.reset();
                self.report( result );
            }
            KeyCode::Backspace => {
                self.input_buffer.backspace();
                self.apply_filter();
            }
            KeyCode::Char( c ) => {
                self.input_buffer.insert( c );
                self.apply_filter();
            }
            _ => {}
        }
    }


    fn apply_filter( &mut self ) {
        let result = self.player.filter( self.input_buffer.content() );
        if let Some( 0 ) = self.report( result ) {
            self.set_status( "No matching songs found" );
        }
        self.playlist_state.select( Some( 0 ) );
    }


    /// Handles mouse events.
    fn handle_mouse( &mut self, column: u16, row: u16, kind: MouseEventKind ) {
        match kind {
            MouseEventKind::Down( MouseButton::Left ) | MouseEventKind::Drag( MouseButton::Left ) => {
                if let Some( area ) = self.gauge_area.filter( |a| a.contains( Position::new( column, row ) ) ) {
                    self.scrub_to( column, area );
                } else if matches!( kind, MouseEventKind::Down( _ ) ) {
                    self.click_playlist( row, column );
                }
            }
            MouseEventKind::ScrollUp => self.select_previous(),
            MouseEventKind::ScrollDown => self.select_next(),
            _ => {}
        }
    }


    /// Seeks to the point on the gauge under the pointer.
    fn scrub_to( &mut self, column: u16, area: Rect ) {
        if self.snapshot.loaded.is_none() {
            return;
        }
        let span = area.width.saturating_sub( 1 ).max( 1 ) as u32;
        let value = ( column - area.x ) as u32 * PROGRESS_RANGE / span;
        if let Some( progress ) = self.report( self.player.scrub( value ) ) {
            self.progress = Some( progress );
        }
    }


    fn click_playlist( &mut self, row: u16, column: u16 ) {
        let Some( area ) = self.playlist_area else { return };

        // Inside the borders only
        if column <= area.x || column >= area.x + area.width - 1 || row <= area.y || row >= area.y + area.height - 1 {
            return;
        }

        let clicked = self.playlist_state.offset() + ( row - area.y - 1 ) as usize;
        if clicked >= self.snapshot.tracks.len() {
            return;
        }

        let now = Instant::now();
        let is_double_click = self.last_click_time
            .map( |t| now.duration_since( t ) < DOUBLE_CLICK )
            .unwrap_or( false )
            && self.last_click_row == Some( row );

        self.playlist_state.select( Some( clicked ) );
        if is_double_click {
            self.play_selected();
            self.last_click_time = None;
            self.last_click_row = None;
        } else {
            self.last_click_time = Some( now );
            self.last_click_row = Some( row );
        }
    }


    fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( cmd ) => self.run_command( cmd ),
            Err( e ) => self.set_status( format!( "{}", e ) ),
        }
    }


    fn run_command( &mut self, cmd: Command ) {
        match cmd {
            Command::Add { path } => self.add_path( path ),
            Command::Remove => self.remove_selected(),
            Command::Save => self.save_playlist(),
            Command::Load => self.load_playlist(),
            Command::Search { term } => {
                if let Some( found ) = self.report( self.player.search( term ) ) {
                    if found == 0 {
                        self.set_status( "No matching songs found" );
                    } else {
                        self.set_status( format!( "Found {} songs", found ) );
                    }
                    self.playlist_state.select( Some( 0 ) );
                }
            }
            Command::Reset => {
                let result = self.player.reset();
                self.report( result );
            }
            Command::Shuffle => {
                let result = self.player.shuffle();
                self.report( result );
            }
            Command::Repeat => self.toggle_repeat(),
            Command::Play { index } => {
                let result = self.player.play( index );
                self.report( result );
            }
            Command::Pause => {
                let result = self.player.toggle_pause();
                self.report( result );
            }
            Command::Stop => {
                let result = self.player.stop();
                self.report( result );
            }
            Command::Next => {
                let result = self.player.next();
                self.report( result );
            }
            Command::Prev => {
                let result = self.player.previous();
                self.report( result );
            }
            Command::Seek { position } => {
                let micros = i64::try_from( position.as_micros() ).unwrap_or( i64::MAX );
                let result = self.player.seek( micros );
                self.report( result );
            }
            Command::Volume { level: Some( level ) } => self.set_volume( level ),
            Command::Volume { level: None } => {
                self.set_status( format!( "Volume: {}%", self.snapshot.volume ) );
            }
            Command::Help => self.view_mode = ViewMode::Help,
            Command::Quit => self.should_quit = true,
        }
        self.refresh();
    }


    fn select_next( &mut self ) {
        let len = self.snapshot.tracks.len();
        if len == 0 {
            return;
        }
        let next = self.playlist_state.selected().map( |i| ( i + 1 ).min( len - 1 ) ).unwrap_or( 0 );
        self.playlist_state.select( Some( next ) );
    }


    fn select_previous( &mut self ) {
        let previous = self.playlist_state.selected().map( |i| i.saturating_sub( 1 ) ).unwrap_or( 0 );
        self.playlist_state.select( Some( previous ) );
    }


    fn play_selected( &mut self ) {
        let result = self.player.play( self.playlist_state.selected() );
        self.report( result );
    }


    fn remove_selected( &mut self ) {
        let Some( index ) = self.playlist_state.selected() else { return };
        if let Some( removed ) = self.report( self.player.remove( vec![ index ] ) ) {
            if let Some( track ) = removed.first() {
                self.set_status( format!( "Removed {}", track.display_name() ) );
            }
        }
    }


    fn toggle_repeat( &mut self ) {
        if let Some( repeat ) = self.report( self.player.toggle_repeat() ) {
            self.set_status( if repeat { "Repeat on" } else { "Repeat off" } );
        }
    }


    fn seek_by( &mut self, delta_micros: i64 ) {
        let result = self.player.seek_by( delta_micros );
        self.report( result );
    }


    fn set_volume( &mut self, percent: u8 ) {
        let percent = percent.min( 100 );
        if self.report( self.player.set_volume( percent ) ).is_some() {
            self.snapshot.volume = percent;
        }
    }


    fn add_path( &mut self, path: std::path::PathBuf ) {
        let mut scanner = LibraryScanner::new();
        scanner.add_path( path );
        match scanner.scan() {
            Ok( tracks ) => {
                let count = tracks.len();
                if self.report( self.player.add( tracks ) ).is_some() {
                    self.set_status( format!( "Added {} tracks", count ) );
                }
            }
            Err( e ) => self.set_status( format!( "Error: {}", e ) ),
        }
    }


    fn save_playlist( &mut self ) {
        match self.player.save() {
            Ok( _ ) => self.set_status( "Playlist saved" ),
            Err( PlayerError::EmptyPlaylist ) => self.set_status( "Playlist is empty" ),
            Err( e ) => self.set_status( format!( "Error: {}", e ) ),
        }
    }


    fn load_playlist( &mut self ) {
        if let Some( report ) = self.report( self.player.load() ) {
            if report.skipped_missing {
                self.set_status( "Some files were missing and could not be loaded" );
            } else {
                self.set_status( "Playlist loaded" );
            }
            self.playlist_state.select( Some( 0 ) );
        }
    }


    /// Writes volume and repeat back to the settings file.
    fn save_settings( &mut self ) {
        self.settings.volume = self.snapshot.volume;
        self.settings.repeat = self.snapshot.repeat;
        self.settings.save();
    }
}


/// Logs to a file in the data directory; the terminal belongs to the UI.
fn init_logging( settings: &Settings ) -> Result<()> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else( std::env::temp_dir )
        .join( "trackdeck" );
    fs::create_dir_all( &dir )?;

    let file = OpenOptions::new()
        .create( true )
        .append( true )
        .open( dir.join( LOG_FILENAME ) )?;

    let filter = EnvFilter::try_from_default_env()
        .or_else( |_| EnvFilter::try_new( settings.log_filter.as_deref().unwrap_or( DEFAULT_LOG_FILTER ) ) )
        .unwrap_or_else( |_| EnvFilter::new( DEFAULT_LOG_FILTER ) );

    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .init();

    Ok(())
}


fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load();

    if let Err( e ) = init_logging( &settings ) {
        eprintln!( "Logging disabled: {}", e );
    }
    tracing::info!( "Starting trackdeck for user {}", args.user );

    let mut app = App::new( &args, settings )?;

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    io::stdout().execute( crossterm::event::EnableMouseCapture )?;

    let result = Terminal::new( CrosstermBackend::new( io::stdout() ) )
        .map_err( anyhow::Error::from )
        .and_then( |mut terminal| run( &mut terminal, &mut app ) );

    // Cleanup, even if the loop failed
    io::stdout().execute( crossterm::event::DisableMouseCapture )?;
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    app.save_settings();
    tracing::info!( "Exiting" );
    result
}


fn run( terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App ) -> Result<()> {
    loop {
        app.tick();

        terminal.draw( |frame| draw_ui( frame, app ) )?;

        if event::poll( Duration::from_millis( 100 ) )? {
            match event::read()? {
                Event::Key( key ) if key.kind == KeyEventKind::Press => {
                    app.handle_key( key.code );
                }
                Event::Mouse( mouse ) => {
                    app.handle_mouse( mouse.column, mouse.row, mouse.kind );
                }
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &mut App ) {
    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Main content
            Constraint::Length( 5 ),  // Now playing
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( frame.area() );

    let header = Paragraph::new( format!( "  TRACKDECK - {}", app.view_mode.title() ) )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[ 0 ] );

    match app.view_mode {
        ViewMode::Playlist => draw_playlist( frame, app, chunks[ 1 ] ),
        ViewMode::Help => draw_help( frame, app, chunks[ 1 ] ),
    }

    draw_now_playing( frame, app, chunks[ 2 ] );
    draw_status_bar( frame, app, chunks[ 3 ] );
}


fn draw_playlist( frame: &mut Frame, app: &mut App, area: Rect ) {
    app.playlist_area = Some( area );

    let current = app.snapshot.current_index;
    let items: Vec<ListItem> = app.snapshot.tracks
        .iter()
        .enumerate()
        .map( |( i, track )| {
            let text = format!( "{:>3}. {}", i + 1, track.display_name() );
            if Some( i ) == current {
                ListItem::new( format!( "> {}", text ) ).style( Style::default().fg( Color::Cyan ).bold() )
            } else {
                ListItem::new( format!( "  {}", text ) )
            }
        })
        .collect();

    let title = format!( " Playlist ({}) ", app.snapshot.tracks.len() );
    let list = List::new( items )
        .block( Block::default().title( title ).borders( Borders::ALL ) )
        .highlight_style( Style::default().add_modifier( Modifier::REVERSED ) );

    frame.render_stateful_widget( list, area, &mut app.playlist_state );
}


fn draw_help( frame: &mut Frame, app: &App, area: Rect ) {
    let help = Paragraph::new( command::help_text() )
        .block( Block::default().title( " Help " ).borders( Borders::ALL ) )
        .wrap( Wrap { trim: false } )
        .scroll(( app.help_scroll, 0 ));
    frame.render_widget( help, area );
}


fn draw_now_playing( frame: &mut Frame, app: &mut App, area: Rect ) {
    let block = Block::default().title( " Now Playing " ).borders( Borders::ALL );
    let inner = block.inner( area );
    frame.render_widget( block, area );

    let rows = Layout::default()
        .direction( Direction::Vertical )
        .constraints([ Constraint::Length( 1 ), Constraint::Length( 1 ), Constraint::Length( 1 ) ])
        .split( inner );

    let name = app.snapshot.loaded
        .as_ref()
        .map( |t| t.display_name().to_string() )
        .unwrap_or_default();
    let title = match app.snapshot.state {
        PlaybackState::Playing => format!( "Playing: {}", name ),
        PlaybackState::Paused => format!( "Paused: {}", name ),
        PlaybackState::Stopped => "Stopped".to_string(),
        PlaybackState::Idle => "No track".to_string(),
    };
    frame.render_widget( Paragraph::new( title ).style( Style::default().bold() ), rows[ 0 ] );

    let info = format!(
        "Vol {}%  Repeat {}",
        app.snapshot.volume,
        if app.snapshot.repeat { "on" } else { "off" }
    );
    frame.render_widget( Paragraph::new( info ).style( Style::default().fg( Color::Gray ) ), rows[ 1 ] );

    let progress = app.display_progress();
    let gauge = Gauge::default()
        .gauge_style( Style::default().fg( Color::Cyan ).bg( Color::DarkGray ) )
        .ratio( progress.value as f64 / PROGRESS_RANGE as f64 )
        .label( progress.label() );
    frame.render_widget( gauge, rows[ 2 ] );
    app.gauge_area = Some( rows[ 2 ] );
}


fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    let ( text, style ) = match app.input_mode {
        InputMode::Command | InputMode::Filter => (
            format!( "{}{}", app.input_mode.prompt(), app.input_buffer.content() ),
            Style::default().fg( Color::Yellow ),
        ),
        InputMode::Normal => match app.status_message {
            Some( ref msg ) => ( msg.clone(), Style::default().fg( Color::Green ) ),
            None => {
                let hint = match app.view_mode {
                    ViewMode::Playlist => " [/]Cmd [Enter]Play [Space]Pause [n/p]Skip [f]Filter [?]Help [q]Quit ",
                    ViewMode::Help => " [?]Close [Esc]Close ",
                };
                ( hint.to_string(), Style::default().fg( Color::DarkGray ) )
            }
        },
    };

    frame.render_widget( Paragraph::new( text ).style( style ), area );

    if app.input_mode != InputMode::Normal {
        let cursor_x = area.x + ( app.input_mode.prompt().len() + app.input_buffer.cursor() ) as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}
