//! Player thread
//!
//! All playback state lives on one controller thread. Requests from the
//! front end and stop notices from audio lines arrive on the same channel
//! and are handled one at a time, so an auto-advance can never interleave
//! with a user command. Progress ticks are scheduled by the same loop.

use std::sync::mpsc::{ self, Receiver, RecvTimeoutError, Sender };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use crate::controller::PlaylistController;
use crate::engine::{ NoticeSink, PlaybackEngine, PlaybackState, StopNotice, COMPLETION_TOLERANCE, DEFAULT_VOLUME };
use crate::error::PlayerError;
use crate::line::LineBackend;
use crate::persistence::{ PlaylistStore, UserId };
use crate::progress::{ Progress, ProgressReporter, TICK_INTERVAL };
use crate::track::Track;


/// Events published for the front end.
#[derive( Debug, Clone, PartialEq )]
pub enum PlayerEvent {
    TrackStarted { index: usize, track: Track },
    StateChanged { state: PlaybackState },
    Progress( Progress ),
    PlaylistChanged,
    /// A failure with no caller to report to, e.g. during auto-advance.
    Error { message: String },
}


/// Startup options for the player thread.
#[derive( Debug, Clone )]
pub struct PlayerOptions {
    pub initial_volume: u8,
    pub repeat: bool,
    pub completion_tolerance: Duration,
    pub tick_interval: Duration,
}


impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            initial_volume: DEFAULT_VOLUME,
            repeat: false,
            completion_tolerance: COMPLETION_TOLERANCE,
            tick_interval: TICK_INTERVAL,
        }
    }
}


/// Point-in-time view of the player for rendering.
#[derive( Debug, Clone, PartialEq )]
pub struct PlayerSnapshot {
    pub tracks: Vec<Track>,
    pub current_index: Option<usize>,
    pub state: PlaybackState,
    /// Track held by the engine, which may differ from the cursor's
    pub loaded: Option<Track>,
    pub repeat: bool,
    pub volume: u8,
    pub progress: Progress,
}


/// Outcome of loading the saved playlist.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct LoadReport {
    pub count: usize,
    pub skipped_missing: bool,
}


type Backend = Box<dyn LineBackend + Send>;

type Operation = Box<dyn FnOnce( &mut Session ) + Send>;


enum Message {
    Call( Operation ),
    LineStopped( StopNotice ),
    Shutdown,
}


/// State owned by the controller thread.
struct Session {
    controller: PlaylistController<Backend>,
    reporter: ProgressReporter,
    store: Option<Box<dyn PlaylistStore + Send>>,
    user: UserId,
    events: Sender<PlayerEvent>,
    last_state: PlaybackState,
}


impl Session {
    fn run( mut self, rx: Receiver<Message> ) {
        tracing::debug!( "Player thread started" );

        loop {
            let message = match self.reporter.time_until_tick( Instant::now() ) {
                Some( wait ) => match rx.recv_timeout( wait ) {
                    Ok( message ) => Some( message ),
                    Err( RecvTimeoutError::Timeout ) => None,
                    Err( RecvTimeoutError::Disconnected ) => break,
                },
                None => match rx.recv() {
                    Ok( message ) => Some( message ),
                    Err( _ ) => break,
                },
            };

            match message {
                Some( Message::Call( operation ) ) => operation( &mut self ),
                Some( Message::LineStopped( notice ) ) => self.handle_stop( notice ),
                Some( Message::Shutdown ) => break,
                None => {}
            }

            self.settle( Instant::now() );
        }

        self.controller.shutdown();
        tracing::debug!( "Player thread exiting" );
    }


    fn handle_stop( &mut self, notice: StopNotice ) {
        tracing::debug!( "Line {} stopped at {} ms", notice.generation, notice.position_micros / 1000 );
        if let Err( e ) = self.controller.handle_stop( notice ) {
            tracing::warn!( "Auto-advance failed: {}", e );
            self.publish( PlayerEvent::Error { message: e.to_string() } );
        }
    }


    /// Publishes whatever changed while handling the last message.
    fn settle( &mut self, now: Instant ) {
        for event in self.controller.drain_events() {
            self.publish( event );
        }

        let state = self.controller.engine().state();
        if state != self.last_state {
            self.last_state = state;
            self.publish( PlayerEvent::StateChanged { state } );
        }

        let started = self.reporter.sync( self.controller.engine(), now );
        let ticked = self.reporter.tick( self.controller.engine(), now );
        if let Some( progress ) = ticked.or( started ) {
            self.publish( PlayerEvent::Progress( progress ) );
        }
    }


    fn publish( &self, event: PlayerEvent ) {
        // The front end may have gone away; playback carries on regardless
        let _ = self.events.send( event );
    }


    fn store( &mut self ) -> Result<&mut Box<dyn PlaylistStore + Send>, PlayerError> {
        self.store
            .as_mut()
            .ok_or_else( || PlayerError::PersistenceFailure( "no playlist store configured".into() ) )
    }


    fn save( &mut self ) -> Result<usize, PlayerError> {
        let tracks = self.controller.playlist().pristine().to_vec();
        if tracks.is_empty() {
            return Err( PlayerError::EmptyPlaylist );
        }

        let user = self.user;
        self.store()?.save( user, &tracks )?;
        Ok( tracks.len() )
    }


    fn load( &mut self ) -> Result<LoadReport, PlayerError> {
        let user = self.user;
        let loaded = self.store()?.load( user )?;

        let report = LoadReport {
            count: loaded.tracks.len(),
            skipped_missing: loaded.skipped_missing,
        };
        self.controller.replace_all( loaded.tracks );
        Ok( report )
    }


    fn search( &mut self, keyword: &str ) -> Result<usize, PlayerError> {
        if keyword.trim().is_empty() {
            self.controller.reset();
            return Ok( self.controller.playlist().len() );
        }

        let user = self.user;
        let found = self.store()?.search( user, keyword )?;
        Ok( self.controller.show_results( found ) )
    }


    fn remove( &mut self, indices: &[usize] ) -> Result<Vec<Track>, PlayerError> {
        let playlist = self.controller.playlist();
        let doomed: Vec<Track> = indices.iter()
            .filter_map( |&i| playlist.get( i ).cloned() )
            .collect();

        // Storage first, so a failed delete leaves the playlist untouched
        if let Some( store ) = self.store.as_mut() {
            store.remove( self.user, &doomed )?;
        }
        Ok( self.controller.remove( indices ) )
    }


    fn scrub( &mut self, value: u32 ) -> Result<Progress, PlayerError> {
        let progress = self.reporter.scrub( self.controller.engine_mut(), value )?;
        self.publish( PlayerEvent::Progress( progress.clone() ) );
        Ok( progress )
    }


    fn seek( &mut self, target_micros: i64 ) -> Result<u64, PlayerError> {
        let position = self.controller.engine_mut().seek( target_micros )?;
        self.publish( PlayerEvent::Progress( Progress::of( self.controller.engine() ) ) );
        Ok( position )
    }


    fn snapshot( &self ) -> PlayerSnapshot {
        let playlist = self.controller.playlist();
        let engine = self.controller.engine();
        PlayerSnapshot {
            tracks: playlist.tracks().to_vec(),
            current_index: playlist.current_index(),
            state: engine.state(),
            loaded: engine.track().cloned(),
            repeat: playlist.repeat(),
            volume: engine.volume(),
            progress: Progress::of( engine ),
        }
    }
}


/// Handle to the player thread.
///
/// Every method queues a request and waits for its result, so errors come
/// back to the caller. Dropping the handle stops the thread and releases
/// the audio line.
pub struct Player {
    tx: Sender<Message>,
    events: Option<Receiver<PlayerEvent>>,
    thread: Option<thread::JoinHandle<()>>,
}


impl Player {
    /// Starts the player thread.
    ///
    /// @param backend - Opens audio lines; moved onto the player thread
    /// @param store - Saved playlists, if persistence is wanted
    /// @param user - Scopes every store call
    pub fn spawn<B>(
        backend: B,
        store: Option<Box<dyn PlaylistStore + Send>>,
        user: UserId,
        options: PlayerOptions,
    ) -> Result<Self, PlayerError>
    where
        B: LineBackend + Send + 'static,
    {
        let ( tx, rx ) = mpsc::channel();
        let ( events_tx, events_rx ) = mpsc::channel();

        // Audio callbacks only post here; the loop does the handling
        let notice_tx = tx.clone();
        let notices: NoticeSink = Arc::new( move |notice| {
            let _ = notice_tx.send( Message::LineStopped( notice ) );
        });

        let thread = thread::Builder::new()
            .name( "trackdeck-player".into() )
            .spawn( move || {
                let backend: Backend = Box::new( backend );
                let mut engine = PlaybackEngine::new( backend, notices );
                engine.set_completion_tolerance( options.completion_tolerance );
                engine.set_volume( options.initial_volume );

                let mut controller = PlaylistController::new( engine );
                controller.set_repeat( options.repeat );

                let session = Session {
                    controller,
                    reporter: ProgressReporter::new( options.tick_interval ),
                    store,
                    user,
                    events: events_tx,
                    last_state: PlaybackState::Idle,
                };
                session.run( rx );
            })
            .map_err( |e| PlayerError::ResourceUnavailable( format!( "player thread: {}", e ) ) )?;

        Ok( Self {
            tx,
            events: Some( events_rx ),
            thread: Some( thread ),
        })
    }


    /// Takes the event stream. Only the first call gets it.
    pub fn take_events( &mut self ) -> Option<Receiver<PlayerEvent>> {
        self.events.take()
    }


    fn call<T, F>( &self, operation: F ) -> Result<T, PlayerError>
    where
        F: FnOnce( &mut Session ) -> Result<T, PlayerError> + Send + 'static,
        T: Send + 'static,
    {
        let ( reply_tx, reply_rx ) = mpsc::channel();
        self.tx
            .send( Message::Call( Box::new( move |session: &mut Session| {
                let _ = reply_tx.send( operation( session ) );
            })))
            .map_err( |_| PlayerError::Disconnected )?;

        reply_rx.recv().map_err( |_| PlayerError::Disconnected )?
    }


    /// Plays the track at `index`.
    pub fn play_at( &self, index: usize ) -> Result<(), PlayerError> {
        self.call( move |s| s.controller.play_at( index ) )
    }


    /// Resumes a paused track or plays `selection`, the current track or
    /// the first track.
    pub fn play( &self, selection: Option<usize> ) -> Result<(), PlayerError> {
        self.call( move |s| s.controller.play_or_resume( selection ) )
    }


    /// Pauses or resumes.
    pub fn toggle_pause( &self ) -> Result<(), PlayerError> {
        self.call( |s| s.controller.toggle_pause() )
    }


    pub fn pause( &self ) -> Result<(), PlayerError> {
        self.call( |s| {
            s.controller.engine_mut().pause();
            Ok(())
        })
    }


    pub fn resume( &self ) -> Result<(), PlayerError> {
        self.call( |s| s.controller.engine_mut().play() )
    }


    pub fn stop( &self ) -> Result<(), PlayerError> {
        self.call( |s| {
            s.controller.engine_mut().stop();
            Ok(())
        })
    }


    pub fn next( &self ) -> Result<(), PlayerError> {
        self.call( |s| s.controller.next() )
    }


    pub fn previous( &self ) -> Result<(), PlayerError> {
        self.call( |s| s.controller.previous() )
    }


    /// Plays a random track.
    pub fn shuffle( &self ) -> Result<(), PlayerError> {
        self.call( |s| s.controller.shuffle() )
    }


    /// Flips repeat mode and returns the new value.
    pub fn toggle_repeat( &self ) -> Result<bool, PlayerError> {
        self.call( |s| Ok( s.controller.toggle_repeat() ) )
    }


    /// Seeks to an absolute position, clamped to the track.
    pub fn seek( &self, target_micros: i64 ) -> Result<u64, PlayerError> {
        self.call( move |s| s.seek( target_micros ) )
    }


    /// Seeks relative to the current position.
    pub fn seek_by( &self, delta_micros: i64 ) -> Result<u64, PlayerError> {
        self.call( move |s| {
            let position = s.controller.engine().position_micros() as i64;
            s.seek( position.saturating_add( delta_micros ) )
        })
    }


    /// Seeks to a progress gauge value.
    pub fn scrub( &self, value: u32 ) -> Result<Progress, PlayerError> {
        self.call( move |s| s.scrub( value ) )
    }


    /// Sets the volume percentage.
    pub fn set_volume( &self, percent: u8 ) -> Result<(), PlayerError> {
        self.call( move |s| {
            s.controller.engine_mut().set_volume( percent );
            Ok(())
        })
    }


    /// Appends tracks.
    pub fn add( &self, tracks: Vec<Track> ) -> Result<(), PlayerError> {
        self.call( move |s| {
            s.controller.add( tracks );
            Ok(())
        })
    }


    /// Removes tracks by index, from the saved playlist as well when a
    /// store is configured.
    pub fn remove( &self, indices: Vec<usize> ) -> Result<Vec<Track>, PlayerError> {
        self.call( move |s| s.remove( &indices ) )
    }


    /// Restores the unfiltered playlist.
    pub fn reset( &self ) -> Result<(), PlayerError> {
        self.call( |s| {
            s.controller.reset();
            Ok(())
        })
    }


    /// Filters the visible playlist by name.
    pub fn filter( &self, query: impl Into<String> ) -> Result<usize, PlayerError> {
        let query = query.into();
        self.call( move |s| Ok( s.controller.filter( &query ) ) )
    }


    /// Saves the full playlist for the user.
    pub fn save( &self ) -> Result<usize, PlayerError> {
        self.call( |s| s.save() )
    }


    /// Replaces the playlist with the user's saved one.
    pub fn load( &self ) -> Result<LoadReport, PlayerError> {
        self.call( |s| s.load() )
    }


    /// Shows saved tracks matching `keyword`.
    pub fn search( &self, keyword: impl Into<String> ) -> Result<usize, PlayerError> {
        let keyword = keyword.into();
        self.call( move |s| s.search( &keyword ) )
    }


    /// Gets a view of the current state.
    pub fn snapshot( &self ) -> Result<PlayerSnapshot, PlayerError> {
        self.call( |s| Ok( s.snapshot() ) )
    }
}


impl Drop for Player {
    fn drop( &mut self ) {
        let _ = self.tx.send( Message::Shutdown );
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::persistence::SqliteStore;
    use crate::testing::{ tracks, ScriptedBackend, TRACK_MICROS };
    use tempfile::TempDir;


    const WAIT: Duration = Duration::from_secs( 5 );


    fn spawn( backend: &ScriptedBackend, store: Option<Box<dyn PlaylistStore + Send>> ) -> ( Player, Receiver<PlayerEvent> ) {
        let options = PlayerOptions {
            tick_interval: Duration::from_millis( 20 ),
            ..PlayerOptions::default()
        };
        let mut player = Player::spawn( backend.clone(), store, UserId( 1 ), options ).unwrap();
        let events = player.take_events().unwrap();
        ( player, events )
    }


    fn wait_for( events: &Receiver<PlayerEvent>, wanted: impl Fn( &PlayerEvent ) -> bool ) -> PlayerEvent {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since( Instant::now() );
            let event = events.recv_timeout( left ).expect( "event not published in time" );
            if wanted( &event ) {
                return event;
            }
        }
    }


    #[test]
    fn test_errors_reach_the_caller() {
        let backend = ScriptedBackend::new();
        let ( player, _events ) = spawn( &backend, None );

        assert!( matches!( player.play_at( 0 ), Err( PlayerError::EmptyPlaylist ) ) );
        player.add( tracks( &[ "a" ] ) ).unwrap();
        assert!( matches!( player.play_at( 4 ), Err( PlayerError::IndexOutOfRange { index: 4, len: 1 } ) ) );
        assert!( matches!( player.save(), Err( PlayerError::PersistenceFailure( _ ) ) ) );
        assert!( matches!( player.seek( 5 ), Err( PlayerError::NoTrackLoaded ) ) );
    }


    #[test]
    fn test_end_of_stream_advances_on_player_thread() {
        let backend = ScriptedBackend::new();
        let ( player, events ) = spawn( &backend, None );
        player.add( tracks( &[ "A", "B", "C" ] ) ).unwrap();
        player.play_at( 2 ).unwrap();

        backend.finish();
        let started = wait_for( &events, |e| matches!( e, PlayerEvent::TrackStarted { index: 0, .. } ) );
        if let PlayerEvent::TrackStarted { track, .. } = started {
            assert_eq!( track.display_name(), "A" );
        }

        let snapshot = player.snapshot().unwrap();
        assert_eq!( snapshot.current_index, Some( 0 ) );
        assert_eq!( snapshot.state, PlaybackState::Playing );
        assert_eq!( backend.opened(), vec![ "C", "A" ] );
    }


    #[test]
    fn test_notice_is_handled_before_later_requests() {
        let backend = ScriptedBackend::new();
        let ( player, _events ) = spawn( &backend, None );
        player.add( tracks( &[ "A", "B" ] ) ).unwrap();
        player.toggle_repeat().unwrap();
        player.play_at( 1 ).unwrap();

        backend.finish();
        let snapshot = player.snapshot().unwrap();
        assert_eq!( snapshot.current_index, Some( 1 ) );
        assert_eq!( backend.opened(), vec![ "B", "B" ] );
    }


    #[test]
    fn test_failed_auto_advance_is_published() {
        let backend = ScriptedBackend::new();
        let ( player, events ) = spawn( &backend, None );
        player.add( tracks( &[ "a", "broken" ] ) ).unwrap();
        player.play_at( 0 ).unwrap();

        backend.finish();
        wait_for( &events, |e| matches!( e, PlayerEvent::Error { .. } ) );
        assert_eq!( player.snapshot().unwrap().state, PlaybackState::Idle );
    }


    #[test]
    fn test_progress_ticks_while_playing() {
        let backend = ScriptedBackend::new();
        let ( player, events ) = spawn( &backend, None );
        player.add( tracks( &[ "a" ] ) ).unwrap();
        player.play_at( 0 ).unwrap();
        backend.advance( TRACK_MICROS / 2 );

        let event = wait_for( &events, |e| matches!( e, PlayerEvent::Progress( p ) if p.value == 500 ) );
        if let PlayerEvent::Progress( progress ) = event {
            assert_eq!( progress.elapsed, "01:30" );
            assert_eq!( progress.total, "03:00" );
        }
    }


    #[test]
    fn test_scrub_and_seek_by() {
        let backend = ScriptedBackend::new();
        let ( player, _events ) = spawn( &backend, None );
        player.add( tracks( &[ "a" ] ) ).unwrap();
        player.play_at( 0 ).unwrap();

        let progress = player.scrub( 100 ).unwrap();
        assert_eq!( progress.position_micros, 18_000_000 );
        assert_eq!( player.seek_by( -20_000_000 ).unwrap(), 0 );
        assert_eq!( player.seek_by( 5_000_000 ).unwrap(), 5_000_000 );
        assert_eq!( player.snapshot().unwrap().state, PlaybackState::Playing );
    }


    #[test]
    fn test_volume_and_snapshot() {
        let backend = ScriptedBackend::new();
        let ( player, _events ) = spawn( &backend, None );
        player.add( tracks( &[ "a", "b" ] ) ).unwrap();
        player.play_at( 1 ).unwrap();
        player.set_volume( 35 ).unwrap();

        let snapshot = player.snapshot().unwrap();
        assert_eq!( snapshot.volume, 35 );
        assert_eq!( snapshot.tracks.len(), 2 );
        assert_eq!( snapshot.loaded.unwrap().display_name(), "b" );
    }


    #[test]
    fn test_save_load_search_round_trip() {
        let dir = TempDir::new().unwrap();
        let files: Vec<Track> = [ "Abba - Song.wav", "Crab Walk.wav", "Tune.wav" ]
            .iter()
            .map( |n| {
                let path = dir.path().join( n );
                std::fs::write( &path, b"" ).unwrap();
                Track::from_path( path )
            })
            .collect();

        let backend = ScriptedBackend::new();
        let store = SqliteStore::open( &dir.path().join( "trackdeck.db" ) ).unwrap();
        let ( player, _events ) = spawn( &backend, Some( Box::new( store ) ) );

        assert!( matches!( player.save(), Err( PlayerError::EmptyPlaylist ) ) );
        player.add( files.clone() ).unwrap();
        assert_eq!( player.save().unwrap(), 3 );

        player.remove( vec![ 2 ] ).unwrap();
        let report = player.load().unwrap();
        assert_eq!( report, LoadReport { count: 2, skipped_missing: false } );

        assert_eq!( player.search( "crab" ).unwrap(), 1 );
        assert_eq!( player.snapshot().unwrap().tracks[ 0 ].display_name(), "Crab Walk.wav" );
        player.reset().unwrap();
        assert_eq!( player.snapshot().unwrap().tracks.len(), 2 );
    }


    #[test]
    fn test_drop_releases_line() {
        let backend = ScriptedBackend::new();
        let ( player, _events ) = spawn( &backend, None );
        player.add( tracks( &[ "a" ] ) ).unwrap();
        player.play_at( 0 ).unwrap();
        assert_eq!( backend.open_lines(), 1 );

        drop( player );
        assert_eq!( backend.open_lines(), 0 );
    }
}
