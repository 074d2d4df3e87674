//! Audio decoding via Symphonia
//!
//! Packet-by-packet decoding of audio files into interleaved f32 samples,
//! plus a streaming resampler for devices that run at another rate.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use rubato::{ FastFixedIn, PolynomialDegree, Resampler };
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{ FormatOptions, FormatReader, SeekMode, SeekTo };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{ Time, TimeBase };
use thiserror::Error;

use crate::line::LineError;


const RESAMPLE_CHUNK: usize = 1024;


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Seek error: {0}" )]
    Seek( String ),

    #[error( "Resample error: {0}" )]
    Resample( String ),
}


impl From<DecoderError> for LineError {
    fn from( e: DecoderError ) -> Self {
        match e {
            DecoderError::FileOpen( _ ) | DecoderError::Resample( _ ) => LineError::Unavailable( e.to_string() ),
            DecoderError::UnsupportedFormat
            | DecoderError::NoAudioTrack
            | DecoderError::DecoderCreation( _ )
            | DecoderError::Decode( _ )
            | DecoderError::Seek( _ ) => LineError::UnsupportedFormat( e.to_string() ),
        }
    }
}


/// Converts a frame count to microseconds.
pub fn micros_at_frame( frame: u64, sample_rate: u32 ) -> u64 {
    ( frame as u128 * 1_000_000 / sample_rate.max( 1 ) as u128 ) as u64
}


/// Streaming decoder for the first audio track of a file.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    total_frames: Option<u64>,
    time_base: Option<TimeBase>,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Frames to drop after an inexact seek
    skip_frames: u64,
}


impl Decoder {
    /// Probes the file at `path` and prepares a decoder. Nothing is
    /// decoded yet.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions::default() );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;
        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 ).max( 1 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 ).max( 1 );
        let total_frames = codec_params.n_frames;
        let time_base = codec_params.time_base;

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        tracing::info!(
            "Opened {:?}: {} Hz, {} channels, {:?} frames",
            path,
            sample_rate,
            channels,
            total_frames
        );

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            total_frames,
            time_base,
            sample_buf: None,
            skip_frames: 0,
        })
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Length from the container header, if it declares one.
    pub fn duration_micros( &self ) -> Option<u64> {
        self.total_frames.map( |frames| micros_at_frame( frames, self.sample_rate ) )
    }


    /// Decodes the next packet into interleaved samples.
    ///
    /// Corrupt packets are skipped. Returns None at the end of the file.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( SymphoniaError::IoError( ref e ) ) if e.kind() == ErrorKind::UnexpectedEof => return Ok( None ),
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( SymphoniaError::DecodeError( e ) ) => {
                    tracing::debug!( "Skipping bad packet: {}", e );
                    continue;
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            if self.sample_buf.as_ref().map_or( true, |b| b.capacity() < decoded.capacity() ) {
                self.sample_buf = Some( SampleBuffer::new( decoded.capacity() as u64, spec ) );
            }
            let Some( buf ) = self.sample_buf.as_mut() else { continue };
            buf.copy_interleaved_ref( decoded );

            let samples = buf.samples();
            let skip = ( self.skip_frames as usize * self.channels ).min( samples.len() );
            self.skip_frames -= ( skip / self.channels ) as u64;
            if skip == samples.len() {
                continue;
            }
            return Ok( Some( samples[ skip.. ].to_vec() ) );
        }
    }


    /// Seeks to `micros`. The next decoded samples start there.
    pub fn seek( &mut self, micros: u64 ) -> Result<(), DecoderError> {
        let seek_to = SeekTo::Time {
            time: Time::from( micros as f64 / 1_000_000.0 ),
            track_id: Some( self.track_id ),
        };

        let seeked = self.format_reader
            .seek( SeekMode::Accurate, seek_to )
            .map_err( |e| DecoderError::Seek( e.to_string() ) )?;
        self.decoder.reset();

        // The reader may land on the packet before the target
        let behind = seeked.required_ts.saturating_sub( seeked.actual_ts );
        self.skip_frames = match self.time_base {
            Some( time_base ) => {
                let time = time_base.calc_time( behind );
                ( ( time.seconds as f64 + time.frac ) * self.sample_rate as f64 ).round() as u64
            }
            None => behind,
        };
        Ok(())
    }
}


/// Rate converter fed one decoded packet at a time.
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    /// Planar input not yet handed to the filter
    pending: Vec<Vec<f32>>,
    /// Output frames still owed to the filter delay
    delay_left: usize,
    consumed: u64,
    emitted: u64,
}


impl StreamResampler {
    pub fn new( from_rate: u32, to_rate: u32, channels: usize ) -> Result<Self, DecoderError> {
        let channels = channels.max( 1 );
        let inner = Self::build( from_rate, to_rate, channels )?;
        let delay_left = inner.output_delay();
        tracing::debug!( "Resampling {} Hz -> {} Hz", from_rate, to_rate );

        Ok( Self {
            inner,
            from_rate,
            to_rate,
            channels,
            pending: vec![ Vec::new(); channels ],
            delay_left,
            consumed: 0,
            emitted: 0,
        })
    }


    fn build( from_rate: u32, to_rate: u32, channels: usize ) -> Result<FastFixedIn<f32>, DecoderError> {
        FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate.max( 1 ) as f64,
            2.0,
            PolynomialDegree::Cubic,
            RESAMPLE_CHUNK,
            channels,
        )
        .map_err( |e| DecoderError::Resample( e.to_string() ) )
    }


    /// Converts interleaved input, returning whatever output is ready.
    pub fn process( &mut self, samples: &[f32] ) -> Result<Vec<f32>, DecoderError> {
        for frame in samples.chunks_exact( self.channels ) {
            for ( channel, sample ) in self.pending.iter_mut().zip( frame ) {
                channel.push( *sample );
            }
        }
        self.consumed += ( samples.len() / self.channels ) as u64;

        let mut output = Vec::new();
        while self.pending[ 0 ].len() >= self.inner.input_frames_next() {
            let needed = self.inner.input_frames_next();
            let chunk: Vec<&[f32]> = self.pending.iter().map( |c| &c[ ..needed ] ).collect();
            let planar = self.inner
                .process( &chunk, None )
                .map_err( |e| DecoderError::Resample( e.to_string() ) )?;

            for channel in self.pending.iter_mut() {
                channel.drain( ..needed );
            }
            self.emit( planar, &mut output );
        }
        Ok( output )
    }


    /// Flushes the filter at the end of the input.
    pub fn finish( &mut self ) -> Result<Vec<f32>, DecoderError> {
        let mut output = Vec::new();

        if !self.pending[ 0 ].is_empty() {
            let chunk: Vec<&[f32]> = self.pending.iter().map( |c| c.as_slice() ).collect();
            let planar = self.inner
                .process_partial( Some( chunk.as_slice() ), None )
                .map_err( |e| DecoderError::Resample( e.to_string() ) )?;
            self.pending.iter_mut().for_each( Vec::clear );
            self.emit( planar, &mut output );
        }

        let tail = self.inner
            .process_partial::<&[f32]>( None, None )
            .map_err( |e| DecoderError::Resample( e.to_string() ) )?;
        self.emit( tail, &mut output );

        // Padding the filter pushed out is not part of the track
        let expected = ( self.consumed as f64 * self.to_rate as f64 / self.from_rate as f64 ).round() as u64;
        let excess = self.emitted.saturating_sub( expected ) as usize;
        let keep = output.len().saturating_sub( excess * self.channels );
        output.truncate( keep );
        self.emitted = self.emitted.min( expected );

        Ok( output )
    }


    /// Starts over, e.g. after a seek.
    pub fn reset( &mut self ) -> Result<(), DecoderError> {
        self.inner = Self::build( self.from_rate, self.to_rate, self.channels )?;
        self.delay_left = self.inner.output_delay();
        self.pending.iter_mut().for_each( Vec::clear );
        self.consumed = 0;
        self.emitted = 0;
        Ok(())
    }


    fn emit( &mut self, planar: Vec<Vec<f32>>, output: &mut Vec<f32> ) {
        let frames = planar.iter().map( |c| c.len() ).min().unwrap_or( 0 );
        let skip = self.delay_left.min( frames );
        self.delay_left -= skip;

        for i in skip..frames {
            for channel in &planar {
                output.push( channel[ i ] );
            }
        }
        self.emitted += ( frames - skip ) as u64;
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::write_wav;
    use tempfile::TempDir;


    fn decode_all( decoder: &mut Decoder ) -> Vec<f32> {
        let mut samples = Vec::new();
        while let Some( packet ) = decoder.decode_next().unwrap() {
            samples.extend( packet );
        }
        samples
    }


    #[test]
    fn test_open_reads_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 8000, 2, 4000 );

        let decoder = Decoder::open( &path ).unwrap();
        assert_eq!( decoder.sample_rate(), 8000 );
        assert_eq!( decoder.channels(), 2 );
        assert_eq!( decoder.duration_micros(), Some( 500_000 ) );
    }


    #[test]
    fn test_decode_streams_every_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 8000, 2, 4000 );

        let mut decoder = Decoder::open( &path ).unwrap();
        let samples = decode_all( &mut decoder );
        assert_eq!( samples.len(), 8000 );
        assert!( ( samples[ 0 ] - 0.25 ).abs() < 1e-3 );
        assert!( decoder.decode_next().unwrap().is_none() );
    }


    #[test]
    fn test_seek_lands_on_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 8000, 1, 4000 );

        let mut decoder = Decoder::open( &path ).unwrap();
        decoder.decode_next().unwrap();
        decoder.seek( 250_000 ).unwrap();

        let rest = decode_all( &mut decoder );
        assert!( rest.len().abs_diff( 2000 ) <= 8, "{} frames after seek", rest.len() );
    }


    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = Decoder::open( &dir.path().join( "nope.wav" ) ).err().unwrap();
        assert!( matches!( LineError::from( err ), LineError::Unavailable( _ ) ) );
    }


    #[test]
    fn test_garbage_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "notes.txt" );
        std::fs::write( &path, b"definitely not audio" ).unwrap();

        let err = Decoder::open( &path ).err().unwrap();
        assert!( matches!( LineError::from( err ), LineError::UnsupportedFormat( _ ) ) );
    }


    #[test]
    fn test_frame_conversions() {
        assert_eq!( micros_at_frame( 44100, 44100 ), 1_000_000 );
        assert_eq!( micros_at_frame( 441, 44100 ), 10_000 );
        assert_eq!( micros_at_frame( 7, 0 ), 7_000_000 );
    }


    #[test]
    fn test_streaming_resample_keeps_duration() {
        let mut resampler = StreamResampler::new( 22050, 44100, 2 ).unwrap();
        let packet = vec![ 0.5; 1000 * 2 ];

        let mut frames = 0;
        for _ in 0..22 {
            frames += resampler.process( &packet ).unwrap().len() / 2;
        }
        frames += resampler.finish().unwrap().len() / 2;

        assert!( frames.abs_diff( 44000 ) <= 2, "{} frames", frames );
    }


    #[test]
    fn test_resampler_reset_forgets_input() {
        let mut resampler = StreamResampler::new( 48000, 44100, 1 ).unwrap();
        resampler.process( &vec![ 0.1; 700 ] ).unwrap();
        resampler.reset().unwrap();

        let frames = resampler.process( &vec![ 0.1; 4800 ] ).unwrap().len()
            + resampler.finish().unwrap().len();
        assert!( frames.abs_diff( 4410 ) <= 2, "{} frames", frames );
    }
}
