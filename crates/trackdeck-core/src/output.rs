//! Audio output via cpal
//!
//! Device-backed audio lines. Each line runs a decode thread that streams
//! packets into a bounded sample ring, and a cpal stream whose callback
//! drains it. The player thread pauses, repositions and attenuates the line
//! through shared state; a seek is forwarded to the decode thread, which
//! moves the format reader and refills the ring.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, AtomicU64, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::thread::{ self, JoinHandle };
use std::time::Duration;

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };

use crate::decoder::{ micros_at_frame, Decoder, StreamResampler };
use crate::line::{ AudioLine, GainRange, LineBackend, LineError, LineStopped, StopListener };
use crate::track::Track;


/// Gain control exposed by device lines.
pub const GAIN_RANGE: GainRange = GainRange { min_db: -80.0, max_db: 6.0 };

/// Ring length as a fraction of a second of output.
const RING_DIVISOR: usize = 4;

/// How long the decode thread naps when it has nothing to do.
const FEED_WAIT: Duration = Duration::from_millis( 5 );


/// Converts decibels to a linear factor. The bottom of the range mutes.
pub fn db_to_linear( gain_db: f32 ) -> f32 {
    if gain_db <= GAIN_RANGE.min_db {
        return 0.0;
    }
    10f32.powf( gain_db / 20.0 )
}


/// Buffered samples plus the play head they belong to.
struct Ring {
    /// Interleaved samples at the output rate, source channel layout
    samples: VecDeque<f32>,
    /// Bumped by every seek; pushes from an older epoch are dropped
    epoch: u64,
    /// Position the current epoch starts at
    base_micros: u64,
    /// Seek the decode thread has not picked up yet
    seek_to: Option<u64>,
    /// Frames handed to the device since `base_micros`
    played: u64,
    /// The decoder reached the end for this epoch
    exhausted: bool,
}


/// State shared by a line, its decode thread and its stream callback.
pub struct StreamState {
    ring: Mutex<Ring>,
    capacity: usize,
    running: AtomicBool,
    closed: AtomicBool,
    /// Linear gain stored as f32 bits
    gain: AtomicU32,
    rate: u32,
    source_channels: usize,
    output_channels: usize,
    /// Zero until known
    duration_micros: AtomicU64,
    on_stop: StopListener,
}


impl StreamState {
    /// @param rate - Output sample rate; ring frames are counted at it
    /// @param duration_micros - Length from the file header, if any. It is
    /// replaced by the real length once the decoder reaches the end.
    pub fn new(
        rate: u32,
        source_channels: usize,
        output_channels: usize,
        duration_micros: Option<u64>,
        on_stop: StopListener,
    ) -> Self {
        let source_channels = source_channels.max( 1 );
        let capacity = ( rate as usize / RING_DIVISOR ).max( 64 ) * source_channels;

        Self {
            ring: Mutex::new( Ring {
                samples: VecDeque::with_capacity( capacity ),
                epoch: 0,
                base_micros: 0,
                seek_to: None,
                played: 0,
                exhausted: false,
            }),
            capacity,
            running: AtomicBool::new( false ),
            closed: AtomicBool::new( false ),
            gain: AtomicU32::new( 1.0_f32.to_bits() ),
            rate: rate.max( 1 ),
            source_channels,
            output_channels: output_channels.max( 1 ),
            duration_micros: AtomicU64::new( duration_micros.unwrap_or( 0 ) ),
            on_stop,
        }
    }


    fn ring( &self ) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Fills `output` with the next interleaved frames, or silence while
    /// not running. An underrun plays silence and keeps the line running;
    /// draining the ring after the decoder finished stops it.
    pub fn render( &self, output: &mut [f32] ) {
        if !self.running.load( Ordering::Acquire ) {
            output.fill( 0.0 );
            return;
        }

        let src_ch = self.source_channels;
        let out_ch = self.output_channels;
        let gain = f32::from_bits( self.gain.load( Ordering::Relaxed ) );

        let finished = {
            let mut ring = self.ring();
            let frames = ( output.len() / out_ch ).min( ring.samples.len() / src_ch );
            let taken = frames * src_ch;

            let source = ring.samples.make_contiguous();
            for ( src, dst ) in source[ ..taken ].chunks_exact( src_ch ).zip( output.chunks_exact_mut( out_ch ) ) {
                remix_frame( src, dst, gain );
            }
            ring.samples.drain( ..taken );
            ring.played += frames as u64;

            output[ frames * out_ch.. ].fill( 0.0 );
            ring.exhausted && ring.samples.is_empty()
        };

        if finished {
            self.halt();
        }
    }


    /// Marks the line stopped. Notifies the listener only if it was
    /// running, so each stop is reported once.
    pub fn halt( &self ) {
        if self.running.swap( false, Ordering::AcqRel ) {
            ( self.on_stop )( LineStopped { position_micros: self.position_micros() } );
        }
    }


    pub fn resume( &self ) {
        self.running.store( true, Ordering::Release );
    }


    pub fn is_running( &self ) -> bool {
        self.running.load( Ordering::Acquire )
    }


    fn position_of( &self, ring: &Ring ) -> u64 {
        let position = ring.base_micros + micros_at_frame( ring.played, self.rate );
        match self.duration_micros() {
            0 => position,
            duration => position.min( duration ),
        }
    }


    pub fn position_micros( &self ) -> u64 {
        self.position_of( &self.ring() )
    }


    /// Moves the play head. The buffered samples are dropped and the
    /// decode thread is asked to seek; moving to where the head already
    /// is does nothing.
    pub fn set_position_micros( &self, micros: u64 ) {
        let mut ring = self.ring();
        let micros = match self.duration_micros() {
            0 => micros,
            duration => micros.min( duration ),
        };
        if micros == self.position_of( &ring ) {
            return;
        }

        ring.samples.clear();
        ring.epoch += 1;
        ring.base_micros = micros;
        ring.seek_to = Some( micros );
        ring.played = 0;
        ring.exhausted = false;
    }


    pub fn duration_micros( &self ) -> u64 {
        self.duration_micros.load( Ordering::Acquire )
    }


    pub fn set_gain_db( &self, gain_db: f32 ) {
        self.gain.store( db_to_linear( gain_db ).to_bits(), Ordering::Relaxed );
    }


    /// Returns the seek target if a seek happened since `epoch`, and
    /// moves `epoch` forward.
    pub fn take_seek( &self, epoch: &mut u64 ) -> Option<u64> {
        let mut ring = self.ring();
        if ring.epoch == *epoch {
            return None;
        }
        *epoch = ring.epoch;
        Some( ring.seek_to.take().unwrap_or( ring.base_micros ) )
    }


    /// Buffers as many whole frames of `samples` as fit.
    ///
    /// @returns The number of samples taken, or None if `epoch` is stale
    pub fn push( &self, epoch: u64, samples: &[f32] ) -> Option<usize> {
        let mut ring = self.ring();
        if ring.epoch != epoch {
            return None;
        }

        let room = self.capacity.saturating_sub( ring.samples.len() );
        let count = samples.len().min( room );
        let count = count - count % self.source_channels;
        ring.samples.extend( &samples[ ..count ] );
        Some( count )
    }


    /// Records that the decoder ran out after producing `frames` frames in
    /// `epoch`. The line's length becomes where that leaves the head.
    pub fn finish( &self, epoch: u64, frames: u64 ) {
        let mut ring = self.ring();
        if ring.epoch != epoch {
            return;
        }
        ring.exhausted = true;
        let end = ring.base_micros + micros_at_frame( frames, self.rate );
        self.duration_micros.store( end, Ordering::Release );
    }


    /// Drops the line without reporting a stop and ends the decode thread.
    pub fn close( &self ) {
        self.closed.store( true, Ordering::Release );
        self.running.store( false, Ordering::Release );
    }


    pub fn is_closed( &self ) -> bool {
        self.closed.load( Ordering::Acquire )
    }
}


/// Decode thread body: streams `decoder` into `state` until the line closes.
///
/// After the end of the file (or a decode failure) the thread idles,
/// waiting for a seek to start it again.
pub fn feed( mut decoder: Decoder, mut resampler: Option<StreamResampler>, state: Arc<StreamState> ) {
    let channels = decoder.channels();
    let mut epoch = 0;
    let mut produced: u64 = 0;
    let mut pending: Vec<f32> = Vec::new();
    let mut at_end = false;
    let mut finished = false;

    while !state.is_closed() {
        if let Some( target ) = state.take_seek( &mut epoch ) {
            pending.clear();
            produced = 0;
            at_end = false;
            finished = false;

            if let Some( resampler ) = resampler.as_mut() {
                if let Err( e ) = resampler.reset() {
                    tracing::error!( "Resampler reset failed: {}", e );
                    at_end = true;
                }
            }
            if let Err( e ) = decoder.seek( target ) {
                tracing::debug!( "Seek to {} ms ends the stream: {}", target / 1000, e );
                at_end = true;
            }
            continue;
        }

        if finished {
            thread::sleep( FEED_WAIT );
            continue;
        }

        if !pending.is_empty() {
            match state.push( epoch, &pending ) {
                Some( 0 ) => thread::sleep( FEED_WAIT ),
                Some( taken ) => {
                    pending.drain( ..taken );
                }
                // A seek is waiting; the next pass picks it up
                None => {}
            }
            continue;
        }

        if at_end {
            state.finish( epoch, produced );
            finished = true;
            continue;
        }

        let decoded = match decoder.decode_next() {
            Ok( Some( samples ) ) => match resampler.as_mut() {
                Some( resampler ) => resampler.process( &samples ),
                None => Ok( samples ),
            },
            Ok( None ) => {
                at_end = true;
                match resampler.as_mut() {
                    Some( resampler ) => resampler.finish(),
                    None => Ok( Vec::new() ),
                }
            }
            Err( e ) => Err( e ),
        };

        match decoded {
            Ok( samples ) => {
                produced += ( samples.len() / channels ) as u64;
                pending = samples;
            }
            Err( e ) => {
                tracing::error!( "Decoding stopped: {}", e );
                at_end = true;
            }
        }
    }

    tracing::debug!( "Decode thread exiting" );
}


/// Copies one frame between channel layouts, applying gain.
fn remix_frame( src: &[f32], dst: &mut [f32], gain: f32 ) {
    let src_ch = src.len();
    let out_ch = dst.len();

    if src_ch == out_ch {
        for ( d, s ) in dst.iter_mut().zip( src ) {
            *d = s * gain;
        }
    } else if out_ch == 1 {
        // Mix down
        dst[ 0 ] = src.iter().sum::<f32>() / src_ch as f32 * gain;
    } else {
        // Spread, repeating the last source channel
        for ( ch, d ) in dst.iter_mut().enumerate() {
            *d = src[ ch.min( src_ch - 1 ) ] * gain;
        }
    }
}


/// A track streaming to the default output device.
///
/// Not Send on every platform because of the cpal stream; keep it on the
/// thread that opened it.
pub struct DeviceLine {
    stream: cpal::Stream,
    state: Arc<StreamState>,
    feeder: Option<JoinHandle<()>>,
}


impl AudioLine for DeviceLine {
    fn start( &mut self ) {
        self.state.resume();
        if let Err( e ) = self.stream.play() {
            tracing::warn!( "Failed to start output stream: {}", e );
        }
    }


    fn stop( &mut self ) {
        self.state.halt();
        if let Err( e ) = self.stream.pause() {
            tracing::debug!( "Failed to pause output stream: {}", e );
        }
    }


    fn is_running( &self ) -> bool {
        self.state.is_running()
    }


    fn position_micros( &self ) -> u64 {
        self.state.position_micros()
    }


    fn set_position_micros( &mut self, micros: u64 ) {
        self.state.set_position_micros( micros );
    }


    fn duration_micros( &self ) -> u64 {
        self.state.duration_micros()
    }


    fn gain_range( &self ) -> Option<GainRange> {
        Some( GAIN_RANGE )
    }


    fn set_gain_db( &mut self, gain_db: f32 ) {
        self.state.set_gain_db( gain_db );
    }
}


impl Drop for DeviceLine {
    fn drop( &mut self ) {
        self.state.close();
        let _ = self.stream.pause();
        if let Some( feeder ) = self.feeder.take() {
            let _ = feeder.join();
        }
    }
}


/// Opens lines on the default output device.
///
/// Holds no device handle, so it can be moved to the player thread; the
/// host and device are looked up on every open.
#[derive( Debug, Default, Clone )]
pub struct DeviceBackend;


impl DeviceBackend {
    pub fn new() -> Self {
        Self
    }
}


impl LineBackend for DeviceBackend {
    /// Probes the file and starts its decode thread. Decoding happens on
    /// that thread, so opening returns as soon as the header is read.
    fn open( &mut self, track: &Track, on_stop: StopListener ) -> Result<Box<dyn AudioLine>, LineError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else( || LineError::Unavailable( "no output device available".into() ) )?;

        let decoder = Decoder::open( track.path() )?;
        let config = select_config( &device, decoder.sample_rate(), decoder.channels() as u16 )?;
        let rate = config.sample_rate.0;

        let resampler = if rate != decoder.sample_rate() {
            Some( StreamResampler::new( decoder.sample_rate(), rate, decoder.channels() )? )
        } else {
            None
        };

        let state = Arc::new( StreamState::new(
            rate,
            decoder.channels(),
            config.channels as usize,
            decoder.duration_micros(),
            on_stop,
        ));
        let callback_state = Arc::clone( &state );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_state.render( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| LineError::Unavailable( format!( "failed to build output stream: {}", e ) ) )?;

        let feeder_state = Arc::clone( &state );
        let feeder = thread::Builder::new()
            .name( "trackdeck-decode".into() )
            .spawn( move || feed( decoder, resampler, feeder_state ) )
            .map_err( |e| LineError::Unavailable( format!( "decode thread: {}", e ) ) )?;

        Ok( Box::new( DeviceLine { stream, state, feeder: Some( feeder ) } ) )
    }
}


/// Picks an output config for a track.
///
/// Prefers the track's own rate and channel count, then its rate with any
/// channel count, then the device default (the track gets resampled).
fn select_config( device: &cpal::Device, sample_rate: u32, channels: u16 ) -> Result<cpal::StreamConfig, LineError> {
    tracing::debug!( "Using output device: {:?}", device.name() );

    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err( |e| LineError::Unavailable( e.to_string() ) )?
        .collect();

    let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
        c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate
    };

    let config = if let Some( range ) = supported.iter().find( |c| c.channels() == channels && supports_rate( c ) ) {
        range.clone().with_sample_rate( cpal::SampleRate( sample_rate ) ).config()
    } else if let Some( range ) = supported.iter().find( |c| supports_rate( c ) ) {
        tracing::debug!( "Remixing {} channels to {}", channels, range.channels() );
        range.clone().with_sample_rate( cpal::SampleRate( sample_rate ) ).config()
    } else {
        let default = device
            .default_output_config()
            .map_err( |e| LineError::Unavailable( e.to_string() ) )?;
        tracing::info!( "Resampling {} Hz to device rate {} Hz", sample_rate, default.sample_rate().0 );
        default.config()
    };

    Ok( config )
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::write_wav;
    use std::time::Instant;
    use tempfile::TempDir;


    type Stops = Arc<Mutex<Vec<LineStopped>>>;


    /// A 1 kHz mono state, so one frame is one millisecond.
    fn state( duration_micros: Option<u64> ) -> ( StreamState, Stops ) {
        let stops = Arc::new( Mutex::new( Vec::new() ) );
        let log = Arc::clone( &stops );
        let listener: StopListener = Arc::new( move |s| log.lock().unwrap().push( s ) );
        ( StreamState::new( 1000, 1, 1, duration_micros, listener ), stops )
    }


    #[test]
    fn test_db_to_linear() {
        assert_eq!( db_to_linear( 0.0 ), 1.0 );
        assert_eq!( db_to_linear( -80.0 ), 0.0 );
        assert!( ( db_to_linear( -20.0 ) - 0.1 ).abs() < 1e-6 );
        assert!( db_to_linear( 6.0 ) > 1.99 );
    }


    #[test]
    fn test_silent_until_resumed() {
        let ( line, _ ) = state( None );
        line.push( 0, &[ 0.5; 8 ] );

        let mut out = [ 1.0; 4 ];
        line.render( &mut out );
        assert_eq!( out, [ 0.0; 4 ] );
        assert_eq!( line.position_micros(), 0 );
    }


    #[test]
    fn test_render_advances_and_applies_gain() {
        let ( line, stops ) = state( Some( 8000 ) );
        line.push( 0, &[ 0.5; 8 ] );
        line.set_gain_db( -20.0 );
        line.resume();

        let mut out = [ 0.0; 4 ];
        line.render( &mut out );
        assert!( out.iter().all( |s| ( s - 0.05 ).abs() < 1e-6 ) );
        assert_eq!( line.position_micros(), 4000 );
        assert!( line.is_running() );
        assert!( stops.lock().unwrap().is_empty() );
    }


    #[test]
    fn test_ring_is_bounded() {
        let ( line, _ ) = state( None );
        let taken = line.push( 0, &vec![ 0.1; 10_000 ] ).unwrap();
        assert_eq!( taken, 250 );
        assert_eq!( line.push( 0, &[ 0.1; 4 ] ), Some( 0 ) );
    }


    #[test]
    fn test_underrun_keeps_running() {
        let ( line, stops ) = state( None );
        line.push( 0, &[ 0.5; 2 ] );
        line.resume();

        let mut out = [ 1.0; 4 ];
        line.render( &mut out );
        assert_eq!( out, [ 0.5, 0.5, 0.0, 0.0 ] );
        assert!( line.is_running() );
        assert_eq!( line.position_micros(), 2000 );
        assert!( stops.lock().unwrap().is_empty() );
    }


    #[test]
    fn test_end_of_stream_stops_once_at_its_length() {
        let ( line, stops ) = state( Some( 9000 ) );
        line.push( 0, &[ 0.5; 6 ] );
        line.finish( 0, 6 );
        assert_eq!( line.duration_micros(), 6000 );
        line.resume();

        let mut out = [ 1.0; 8 ];
        line.render( &mut out );
        assert_eq!( &out[ 6.. ], &[ 0.0, 0.0 ] );
        assert!( !line.is_running() );

        line.render( &mut out );
        line.halt();
        assert_eq!( *stops.lock().unwrap(), vec![ LineStopped { position_micros: 6000 } ] );
    }


    #[test]
    fn test_seek_drops_buffer_and_stale_pushes() {
        let ( line, _ ) = state( Some( 10_000 ) );
        let mut epoch = 0;
        line.push( 0, &[ 0.5; 4 ] );

        line.set_position_micros( 7000 );
        assert_eq!( line.position_micros(), 7000 );
        assert_eq!( line.push( 0, &[ 0.5; 4 ] ), None );
        assert_eq!( line.take_seek( &mut epoch ), Some( 7000 ) );
        assert_eq!( line.take_seek( &mut epoch ), None );

        // Nothing from before the seek is left to play
        line.resume();
        let mut out = [ 1.0; 4 ];
        line.render( &mut out );
        assert_eq!( out, [ 0.0; 4 ] );

        line.set_position_micros( 99_000 );
        assert_eq!( line.position_micros(), 10_000 );
    }


    #[test]
    fn test_seek_to_current_position_is_ignored() {
        let ( line, _ ) = state( Some( 10_000 ) );
        let mut epoch = 0;
        line.push( 0, &[ 0.5; 4 ] );
        line.set_position_micros( 0 );
        assert_eq!( line.take_seek( &mut epoch ), None );
        assert_eq!( line.push( 0, &[ 0.5; 4 ] ), Some( 4 ) );
    }


    #[test]
    fn test_stale_finish_is_ignored() {
        let ( line, _ ) = state( Some( 10_000 ) );
        line.set_position_micros( 5000 );
        line.finish( 0, 3 );
        assert_eq!( line.duration_micros(), 10_000 );
    }


    #[test]
    fn test_halt_notifies_only_when_running() {
        let ( line, stops ) = state( None );
        line.halt();
        assert!( stops.lock().unwrap().is_empty() );

        line.resume();
        line.halt();
        line.halt();
        assert_eq!( stops.lock().unwrap().len(), 1 );
    }


    #[test]
    fn test_close_is_silent() {
        let ( line, stops ) = state( None );
        line.resume();
        line.close();
        assert!( !line.is_running() );
        assert!( line.is_closed() );
        assert!( stops.lock().unwrap().is_empty() );
    }


    #[test]
    fn test_remix() {
        let mut stereo = [ 0.0; 2 ];
        remix_frame( &[ 0.4 ], &mut stereo, 1.0 );
        assert_eq!( stereo, [ 0.4, 0.4 ] );

        let mut mono = [ 0.0 ];
        remix_frame( &[ 0.2, 0.6 ], &mut mono, 0.5 );
        assert!( ( mono[ 0 ] - 0.2 ).abs() < 1e-6 );

        let mut surround = [ 0.0; 4 ];
        remix_frame( &[ 0.1, 0.2 ], &mut surround, 1.0 );
        assert_eq!( surround, [ 0.1, 0.2, 0.2, 0.2 ] );
    }


    /// Plays `state` like a device would until it stops.
    ///
    /// @returns The number of non-silent frames rendered
    fn drain( state: &StreamState ) -> usize {
        let deadline = Instant::now() + Duration::from_secs( 5 );
        let mut out = [ 0.0; 256 ];
        let mut heard = 0;

        state.resume();
        while state.is_running() {
            assert!( Instant::now() < deadline, "line never finished" );
            state.render( &mut out );
            heard += out.iter().filter( |s| **s != 0.0 ).count();
            thread::sleep( Duration::from_millis( 1 ) );
        }
        heard
    }


    fn streaming( path: &std::path::Path ) -> ( Arc<StreamState>, Stops, JoinHandle<()> ) {
        let decoder = Decoder::open( path ).unwrap();
        let stops = Arc::new( Mutex::new( Vec::new() ) );
        let log = Arc::clone( &stops );
        let listener: StopListener = Arc::new( move |s| log.lock().unwrap().push( s ) );

        let state = Arc::new( StreamState::new(
            decoder.sample_rate(),
            decoder.channels(),
            decoder.channels(),
            decoder.duration_micros(),
            listener,
        ));
        let feeder_state = Arc::clone( &state );
        let feeder = thread::spawn( move || feed( decoder, None, feeder_state ) );
        ( state, stops, feeder )
    }


    #[test]
    fn test_feed_streams_file_to_the_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 8000, 1, 2000 );

        let ( state, stops, feeder ) = streaming( &path );
        assert_eq!( state.duration_micros(), 250_000 );

        let heard = drain( &state );
        assert_eq!( heard, 2000 );
        assert_eq!( *stops.lock().unwrap(), vec![ LineStopped { position_micros: 250_000 } ] );
        assert_eq!( state.duration_micros(), 250_000 );

        state.close();
        feeder.join().unwrap();
    }


    #[test]
    fn test_feed_follows_seek() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 8000, 1, 2000 );

        let ( state, stops, feeder ) = streaming( &path );
        state.set_position_micros( 125_000 );

        let heard = drain( &state );
        assert!( heard.abs_diff( 1000 ) <= 8, "{} frames after seek", heard );
        assert_eq!( stops.lock().unwrap().last().unwrap().position_micros, state.duration_micros() );

        // Replaying after the end rewinds the decoder
        state.set_position_micros( 0 );
        assert!( drain( &state ).abs_diff( 2000 ) <= 8 );

        state.close();
        feeder.join().unwrap();
    }
}
