//! Scripted line backend used by the unit tests.
//!
//! Lines never render audio; tests move the play head by hand and
//! trigger end of stream explicitly.

use std::path::Path;
use std::sync::{ Arc, Mutex };

use crate::engine::{ NoticeSink, StopNotice };
use crate::line::{ AudioLine, GainRange, LineBackend, LineError, LineStopped, StopListener };
use crate::track::Track;


pub const TRACK_MICROS: u64 = 180_000_000;

pub const GAIN: GainRange = GainRange { min_db: -80.0, max_db: 6.0 };


struct LineState {
    name: String,
    position: u64,
    duration: u64,
    running: bool,
    gain_db: Option<f32>,
    closed: bool,
    listener: StopListener,
}


#[derive( Default )]
struct Script {
    lines: Vec<Arc<Mutex<LineState>>>,
}


/// Backend handing out scripted lines. Clones share the same script.
///
/// Files whose name contains `broken` fail as unsupported, `missing` as
/// unavailable.
#[derive( Clone, Default )]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}


impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }


    fn current( &self ) -> Option<Arc<Mutex<LineState>>> {
        self.script.lock().unwrap().lines.last().cloned()
    }


    /// Names of every track opened so far, in order.
    pub fn opened( &self ) -> Vec<String> {
        self.script.lock().unwrap()
            .lines
            .iter()
            .map( |l| l.lock().unwrap().name.clone() )
            .collect()
    }


    /// Number of lines that have not been closed.
    pub fn open_lines( &self ) -> usize {
        self.script.lock().unwrap()
            .lines
            .iter()
            .filter( |l| !l.lock().unwrap().closed )
            .count()
    }


    /// Moves the newest line's play head forward if it is running.
    pub fn advance( &self, micros: u64 ) {
        if let Some( line ) = self.current() {
            let mut state = line.lock().unwrap();
            if state.running {
                state.position = ( state.position + micros ).min( state.duration );
            }
        }
    }


    /// Plays the newest line to its end and fires the stop listener.
    pub fn finish( &self ) {
        self.stop_at( None );
    }


    /// Stops the newest line at `position` as if the device went away.
    pub fn interrupt( &self, position: u64 ) {
        self.stop_at( Some( position ) );
    }


    fn stop_at( &self, position: Option<u64> ) {
        let Some( line ) = self.current() else { return };
        let ( listener, stopped ) = {
            let mut state = line.lock().unwrap();
            state.position = position.unwrap_or( state.duration );
            state.running = false;
            ( Arc::clone( &state.listener ), LineStopped { position_micros: state.position } )
        };
        listener( stopped );
    }


    pub fn is_running( &self ) -> bool {
        self.current().map( |l| l.lock().unwrap().running ).unwrap_or( false )
    }


    pub fn line_position( &self ) -> u64 {
        self.current().map( |l| l.lock().unwrap().position ).unwrap_or( 0 )
    }


    pub fn gain_db( &self ) -> Option<f32> {
        self.current().and_then( |l| l.lock().unwrap().gain_db )
    }
}


impl LineBackend for ScriptedBackend {
    fn open( &mut self, track: &Track, on_stop: StopListener ) -> Result<Box<dyn AudioLine>, LineError> {
        let name = track.display_name().to_string();
        if name.contains( "broken" ) {
            return Err( LineError::UnsupportedFormat( name ) );
        }
        if name.contains( "missing" ) {
            return Err( LineError::Unavailable( name ) );
        }

        let state = Arc::new( Mutex::new( LineState {
            name,
            position: 0,
            duration: TRACK_MICROS,
            running: false,
            gain_db: None,
            closed: false,
            listener: on_stop,
        }));
        self.script.lock().unwrap().lines.push( Arc::clone( &state ) );

        Ok( Box::new( ScriptedLine { state } ) )
    }
}


struct ScriptedLine {
    state: Arc<Mutex<LineState>>,
}


impl AudioLine for ScriptedLine {
    fn start( &mut self ) {
        self.state.lock().unwrap().running = true;
    }


    fn stop( &mut self ) {
        let notify = {
            let mut state = self.state.lock().unwrap();
            let was_running = state.running;
            state.running = false;
            was_running.then( || ( Arc::clone( &state.listener ), LineStopped { position_micros: state.position } ) )
        };
        if let Some(( listener, stopped )) = notify {
            listener( stopped );
        }
    }


    fn is_running( &self ) -> bool {
        self.state.lock().unwrap().running
    }


    fn position_micros( &self ) -> u64 {
        self.state.lock().unwrap().position
    }


    fn set_position_micros( &mut self, micros: u64 ) {
        let mut state = self.state.lock().unwrap();
        state.position = micros.min( state.duration );
    }


    fn duration_micros( &self ) -> u64 {
        self.state.lock().unwrap().duration
    }


    fn gain_range( &self ) -> Option<GainRange> {
        Some( GAIN )
    }


    fn set_gain_db( &mut self, gain_db: f32 ) {
        self.state.lock().unwrap().gain_db = Some( gain_db );
    }
}


impl Drop for ScriptedLine {
    fn drop( &mut self ) {
        self.state.lock().unwrap().closed = true;
    }
}


/// Collects stop notices the way the controller thread's queue would.
#[derive( Clone, Default )]
pub struct NoticeLog {
    notices: Arc<Mutex<Vec<StopNotice>>>,
}


impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn sink( &self ) -> NoticeSink {
        let notices = Arc::clone( &self.notices );
        Arc::new( move |notice| notices.lock().unwrap().push( notice ) )
    }


    pub fn drain( &self ) -> Vec<StopNotice> {
        std::mem::take( &mut *self.notices.lock().unwrap() )
    }
}


/// Builds tracks named after the given strings.
pub fn tracks( names: &[&str] ) -> Vec<Track> {
    names.iter()
        .map( |n| Track::with_name( format!( "/music/{}", n ), *n ) )
        .collect()
}


/// Writes a 16-bit PCM WAV file of alternating +/-0.25 samples.
pub fn write_wav( path: &Path, sample_rate: u32, channels: u16, frames: usize ) {
    let data_len = ( frames * channels as usize * 2 ) as u32;
    let mut bytes = Vec::new();
    bytes.extend_from_slice( b"RIFF" );
    bytes.extend_from_slice( &( 36 + data_len ).to_le_bytes() );
    bytes.extend_from_slice( b"WAVEfmt " );
    bytes.extend_from_slice( &16u32.to_le_bytes() );
    bytes.extend_from_slice( &1u16.to_le_bytes() );
    bytes.extend_from_slice( &channels.to_le_bytes() );
    bytes.extend_from_slice( &sample_rate.to_le_bytes() );
    bytes.extend_from_slice( &( sample_rate * channels as u32 * 2 ).to_le_bytes() );
    bytes.extend_from_slice( &( channels * 2 ).to_le_bytes() );
    bytes.extend_from_slice( &16u16.to_le_bytes() );
    bytes.extend_from_slice( b"data" );
    bytes.extend_from_slice( &data_len.to_le_bytes() );
    for i in 0..frames * channels as usize {
        let sample = if i % 2 == 0 { 8192i16 } else { -8192i16 };
        bytes.extend_from_slice( &sample.to_le_bytes() );
    }
    std::fs::write( path, bytes ).unwrap();
}
